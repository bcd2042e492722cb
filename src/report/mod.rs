pub mod bundle;
pub mod document;
pub mod emitter;
pub mod escape;
pub mod summary;

pub use bundle::write_bundles;
pub use document::{Report, RunContext, ManifestRecord, SelectionRecord, HARNESS_VERSION};
pub use emitter::{atomic_write, emit, render};
pub use escape::{escape_bytes, excerpt};
pub use summary::render_summary;
