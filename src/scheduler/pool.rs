use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::RunEvent;
use super::reorder::ReorderBuffer;
use super::runner::ExampleRunner;
use super::slots::WorkerSlots;
use crate::models::{Example, Verdict};
use crate::oracle::decide;

pub const WORKER_PANICKED: &str = "worker panicked";

/// Runs examples under a concurrency cap and hands verdicts on in submission order.
pub struct Scheduler {
    runner: Arc<dyn ExampleRunner>,
    parallelism: usize,
    cancel_token: CancellationToken,
    event_tx: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn ExampleRunner>, parallelism: usize) -> Self {
        Self {
            runner,
            parallelism: parallelism.max(1),
            cancel_token: CancellationToken::new(),
            event_tx: None,
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    fn emit(&self, event: RunEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Execute every example and send exactly one verdict per example to `out`,
    /// in the order given. Returns once all workers have finished, so every
    /// child process and scratch directory has been released.
    pub async fn run(&self, examples: Vec<Arc<Example>>, out: mpsc::Sender<Verdict>) -> usize {
        let total = examples.len();
        self.emit(RunEvent::Queued { total });
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(usize, Verdict)>();

        let collector = tokio::spawn(async move {
            let mut buffer = ReorderBuffer::new();
            let mut receiver_gone = false;
            while let Some((index, verdict)) = done_rx.recv().await {
                for ready in buffer.push(index, verdict) {
                    if !receiver_gone && out.send(ready).await.is_err() {
                        warn!("Verdict receiver dropped, discarding remaining verdicts");
                        receiver_gone = true;
                    }
                }
            }
            if buffer.pending() > 0 {
                error!(pending = buffer.pending(), "Verdicts stuck behind a missing index");
            }
            buffer.released()
        });

        let slots = WorkerSlots::new(self.parallelism);
        let mut workers: Vec<(usize, Arc<Example>, JoinHandle<()>)> = Vec::with_capacity(total);
        let mut submitted = 0;

        for (index, example) in examples.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => None,
                permit = slots.acquire() => permit,
            };
            let Some(permit) = permit else { break };
            if self.cancel_token.is_cancelled() {
                break;
            }
            submitted = index + 1;

            let runner = self.runner.clone();
            let cancel = self.cancel_token.clone();
            let event_tx = self.event_tx.clone();
            let done = done_tx.clone();
            let task_example = example.clone();
            debug!(example = %example.id, index, in_flight = slots.in_flight(), "Submitting");

            let handle = tokio::spawn(async move {
                let example = task_example;
                let _permit = permit;
                if let Some(ref tx) = event_tx {
                    let _ = tx.send(RunEvent::Started { index, id: example.id.clone() });
                }

                let attempt = AssertUnwindSafe(async {
                    runner
                        .run(example.clone(), cancel)
                        .await
                        .map(|outcome| decide(example.clone(), outcome))
                })
                .catch_unwind()
                .await;

                let verdict = match attempt {
                    Ok(Ok(verdict)) => verdict,
                    Ok(Err(e)) if e.is_cancelled() => Verdict::cancelled(example.clone()),
                    Ok(Err(e)) => {
                        warn!(example = %example.id, error = %e, "Executor fault");
                        Verdict::harness_error(example.clone(), e.reason())
                    }
                    Err(_) => {
                        error!(example = %example.id, "Worker panicked");
                        Verdict::harness_error(example.clone(), WORKER_PANICKED)
                    }
                };

                if let Some(ref tx) = event_tx {
                    let _ = tx.send(finished_event(index, &verdict));
                }
                let _ = done.send((index, verdict));
            });
            workers.push((index, example.clone(), handle));
        }

        if submitted < total {
            info!(
                skipped = total - submitted,
                "Run cancelled, remaining examples will not start"
            );
        }
        for (index, example) in examples.iter().enumerate().skip(submitted) {
            let verdict = Verdict::cancelled(example.clone());
            self.emit(finished_event(index, &verdict));
            let _ = done_tx.send((index, verdict));
        }

        for (index, example, handle) in workers {
            if let Err(e) = handle.await {
                // Only reachable if the task died outside the guarded section.
                error!(example = %example.id, error = %e, "Worker task failed");
                let verdict = Verdict::harness_error(example, WORKER_PANICKED);
                self.emit(finished_event(index, &verdict));
                let _ = done_tx.send((index, verdict));
            }
        }
        drop(done_tx);

        match collector.await {
            Ok(released) => released,
            Err(e) => {
                error!(error = %e, "Verdict collector failed");
                0
            }
        }
    }
}

fn finished_event(index: usize, verdict: &Verdict) -> RunEvent {
    RunEvent::Finished {
        index,
        id: verdict.id().to_string(),
        classification: verdict.classification,
        elapsed_ms: verdict.outcome.as_ref().map(|o| o.elapsed_ms),
    }
}
