pub mod corpus;
pub mod filter;

pub use corpus::{CorpusIndex, ManifestMeta};
pub use filter::{normalize_key, Filter};
