use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::errors::ExecutorError;
use crate::models::{Example, ExecutionOutcome};

/// Executes one example. The sandbox is the production implementation.
#[async_trait]
pub trait ExampleRunner: Send + Sync {
    /// Must return `ExecutorError::Cancelled` promptly once `cancel` fires,
    /// after releasing every resource it acquired.
    async fn run(
        &self,
        example: Arc<Example>,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, ExecutorError>;
}
