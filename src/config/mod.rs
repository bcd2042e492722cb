pub mod env;
pub mod types;

pub use env::EnvOverrides;
pub use types::*;
