pub mod types;
pub mod classification;
pub mod retry;

pub use types::{ExecutorError, HarnessError};
pub use classification::ErrorClassification;
pub use retry::{RetryConfig, with_retry};
