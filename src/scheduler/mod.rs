pub mod events;
pub mod pool;
pub mod reorder;
pub mod runner;
pub mod slots;

pub use events::RunEvent;
pub use pool::{Scheduler, WORKER_PANICKED};
pub use runner::ExampleRunner;
