use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::exit_code;
use crate::errors::classification::EXIT_HARNESS_ERROR;
use crate::config::HarnessConfig;
use crate::errors::HarnessError;
use crate::index::CorpusIndex;
use crate::manifest::load_manifest;
use crate::models::Verdict;
use crate::report::{self, ManifestRecord, Report, RunContext, SelectionRecord};
use crate::sandbox::{sweep_orphans, SandboxExecutor};
use crate::scheduler::{ExampleRunner, RunEvent, Scheduler};

/// A finished run: the report as emitted plus the process exit code it implies.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: Report,
    pub exit_code: i32,
}

/// Drives one run: load and validate the manifest, select, execute, classify, report.
pub struct HarnessOrchestrator {
    config: HarnessConfig,
    cancel_token: CancellationToken,
    runner: Option<Arc<dyn ExampleRunner>>,
    event_tx: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl HarnessOrchestrator {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            cancel_token: CancellationToken::new(),
            runner: None,
            event_tx: None,
        }
    }

    /// Replace the run's cancel token with an external one (e.g. wired to Ctrl-C).
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Execute examples with `runner` instead of the sandbox.
    pub fn with_runner(mut self, runner: Arc<dyn ExampleRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub async fn run(&self) -> Result<RunOutcome, HarnessError> {
        let started_at = Utc::now();

        // Manifest errors abort before anything executes.
        let index = load_manifest(&self.config.manifest).await?;
        let selected = index.select(&self.config.filter);
        info!(
            manifest = %index.meta().id,
            total = index.len(),
            selected = selected.len(),
            "Manifest loaded"
        );
        if selected.is_empty() {
            warn!("No examples match the selection filter");
        }

        let root = self.config.scratch_root.clone();
        match tokio::task::spawn_blocking(move || sweep_orphans(&root)).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Removed orphaned scratch directories"),
            Err(e) => warn!(error = %e, "Orphan sweep did not complete"),
        }

        let verdicts = self.execute(selected.clone()).await?;

        let report = Report::build(self.context(&index, selected.len(), started_at), &verdicts, Utc::now());
        report::emit(&report, &self.config.output).await?;

        // The report is already out; a bundle failure only degrades the exit code.
        let mut exit_code = exit_code(&report.summary, self.config.strict);
        if let Some(dir) = &self.config.artifacts_dir {
            match report::write_bundles(dir, &verdicts).await {
                Ok(written) => info!(dir = %dir.display(), bundles = written, "Artifact bundles written"),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to write artifact bundles");
                    exit_code = EXIT_HARNESS_ERROR;
                }
            }
        }
        info!(exit_code, cancelled = self.cancel_token.is_cancelled(), "Run finished");
        Ok(RunOutcome { report, exit_code })
    }

    /// Run every selected example and collect verdicts in manifest order. Returns
    /// only after the scheduler has released every child and scratch directory.
    async fn execute(&self, examples: Vec<Arc<crate::models::Example>>) -> Result<Vec<Verdict>, HarnessError> {
        let runner: Arc<dyn ExampleRunner> = match &self.runner {
            Some(runner) => runner.clone(),
            None => Arc::new(SandboxExecutor::from_config(&self.config)),
        };
        let mut scheduler =
            Scheduler::new(runner, self.config.parallelism).with_cancel_token(self.cancel_token.clone());
        if let Some(tx) = &self.event_tx {
            scheduler = scheduler.with_event_channel(tx.clone());
        }

        let expected = examples.len();
        let (tx, mut rx) = mpsc::channel::<Verdict>(self.config.parallelism.max(1) * 2);
        let collector = tokio::spawn(async move {
            let mut verdicts = Vec::with_capacity(expected);
            while let Some(verdict) = rx.recv().await {
                debug!(example = %verdict.id(), classification = %verdict.classification, "Verdict");
                verdicts.push(verdict);
            }
            verdicts
        });

        scheduler.run(examples, tx).await;
        let verdicts = collector
            .await
            .map_err(|e| HarnessError::Internal(format!("verdict collector failed: {}", e)))?;
        if verdicts.len() != expected {
            return Err(HarnessError::Internal(format!(
                "expected {} verdicts, collected {}",
                expected,
                verdicts.len()
            )));
        }
        Ok(verdicts)
    }

    fn context(&self, index: &CorpusIndex, selected: usize, started_at: chrono::DateTime<Utc>) -> RunContext {
        RunContext {
            manifest: ManifestRecord::from(index.meta()),
            caps: self.config.caps.record(),
            selection: SelectionRecord::new(&self.config.filter, index.len(), selected),
            excerpt_bytes: self.config.excerpt_bytes,
            started_at,
        }
    }
}

/// Load and validate without executing anything.
pub async fn validate_manifest(config: &HarnessConfig) -> Result<CorpusIndex, HarnessError> {
    Ok(load_manifest(&config.manifest).await?)
}
