use crate::models::Classification;

/// Messages sent from the scheduler for real-time display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// The run is about to submit this many examples
    Queued {
        total: usize,
    },
    /// A worker picked the example up
    Started {
        index: usize,
        id: String,
    },
    /// A verdict exists for the example (including cancelled ones that never started)
    Finished {
        index: usize,
        id: String,
        classification: Classification,
        elapsed_ms: Option<u64>,
    },
}
