pub mod orchestrator;
pub mod state;

pub use orchestrator::{validate_manifest, HarnessOrchestrator, RunOutcome};
pub use state::exit_code;
