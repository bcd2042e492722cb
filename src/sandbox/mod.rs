pub mod capture;
pub mod env;
pub mod executor;
pub mod limits;
pub mod scratch;

pub use executor::SandboxExecutor;
pub use scratch::{sweep_orphans, ScratchDir};
