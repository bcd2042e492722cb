//! Per-example artifact bundles: raw streams plus the outcome and trace as JSON.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::HarnessError;
use crate::models::{CapKind, Classification, Verdict};

pub const STDOUT_FILE: &str = "stdout.bin";
pub const STDERR_FILE: &str = "stderr.bin";
pub const OUTCOME_FILE: &str = "outcome.json";
pub const TRACE_FILE: &str = "trace.json";

#[derive(Debug, Serialize)]
struct OutcomeFile<'a> {
    id: &'a str,
    classification: Classification,
    exit_status: Option<i32>,
    signal: Option<&'a str>,
    elapsed_ms: u64,
    build_elapsed_ms: u64,
    peak_rss_bytes: Option<u64>,
    cap_hit: Option<CapKind>,
    output_truncated: bool,
    build_failed: bool,
    stdout_bytes: usize,
    stderr_bytes: usize,
    reason: Option<&'a str>,
}

/// `<nnn>-<id>`, with `position` 1-based and characters unsafe in file names replaced.
pub fn bundle_name(position: usize, id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    format!("{:03}-{}", position, safe)
}

pub async fn write_bundle(dir: &Path, position: usize, verdict: &Verdict) -> Result<PathBuf, HarnessError> {
    let target = dir.join(bundle_name(position, verdict.id()));
    tokio::fs::create_dir_all(&target).await?;

    let outcome = verdict.outcome.as_ref();
    let stdout = outcome.map_or(&[][..], |o| &o.stdout);
    let stderr = outcome.map_or(&[][..], |o| &o.stderr);
    tokio::fs::write(target.join(STDOUT_FILE), stdout).await?;
    tokio::fs::write(target.join(STDERR_FILE), stderr).await?;

    let record = OutcomeFile {
        id: verdict.id(),
        classification: verdict.classification,
        exit_status: outcome.and_then(|o| o.exit_status),
        signal: outcome.and_then(|o| o.signal.as_deref()),
        elapsed_ms: outcome.map_or(0, |o| o.elapsed_ms),
        build_elapsed_ms: outcome.map_or(0, |o| o.build_elapsed_ms),
        peak_rss_bytes: outcome.and_then(|o| o.peak_rss_bytes),
        cap_hit: outcome.and_then(|o| o.cap_hit),
        output_truncated: outcome.map_or(false, |o| o.output_truncated),
        build_failed: outcome.map_or(false, |o| o.build_failed),
        stdout_bytes: stdout.len(),
        stderr_bytes: stderr.len(),
        reason: verdict.reason.as_deref(),
    };
    let mut json = serde_json::to_string_pretty(&record)?;
    json.push('\n');
    tokio::fs::write(target.join(OUTCOME_FILE), json).await?;

    let mut trace = serde_json::to_string_pretty(&verdict.trace)?;
    trace.push('\n');
    tokio::fs::write(target.join(TRACE_FILE), trace).await?;

    debug!(example = %verdict.id(), path = %target.display(), "Artifact bundle written");
    Ok(target)
}

/// One bundle per verdict, numbered in report order.
pub async fn write_bundles(dir: &Path, verdicts: &[Verdict]) -> Result<usize, HarnessError> {
    tokio::fs::create_dir_all(dir).await?;
    for (i, verdict) in verdicts.iter().enumerate() {
        write_bundle(dir, i + 1, verdict).await?;
    }
    Ok(verdicts.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Example, ExecutionOutcome, Intent};
    use crate::oracle::{decide, parse_clause, Oracle};
    use std::sync::Arc;

    #[test]
    fn test_bundle_name() {
        assert_eq!(bundle_name(1, "cwe121-stack"), "001-cwe121-stack");
        assert_eq!(bundle_name(42, "a/b c"), "042-a_b_c");
        assert_eq!(bundle_name(1234, "x"), "1234-x");
    }

    #[tokio::test]
    async fn test_write_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let example = Arc::new(Example::fixture(
            "ok",
            Intent::IntendedMitigated,
            Oracle::Single(parse_clause("exit-status: zero").unwrap()),
        ));
        let ran = decide(
            example.clone(),
            ExecutionOutcome {
                exit_status: Some(0),
                stdout: vec![0xde, 0xad],
                ..Default::default()
            },
        );
        let cancelled = Verdict::cancelled(example);

        let written = write_bundles(dir.path(), &[ran, cancelled]).await.unwrap();
        assert_eq!(written, 2);

        let first = dir.path().join("001-ok");
        assert_eq!(std::fs::read(first.join(STDOUT_FILE)).unwrap(), vec![0xde, 0xad]);
        let outcome: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(first.join(OUTCOME_FILE)).unwrap()).unwrap();
        assert_eq!(outcome["classification"], "confirmed-mitigated");
        assert_eq!(outcome["stdout_bytes"], 2);
        let trace: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(first.join(TRACE_FILE)).unwrap()).unwrap();
        assert_eq!(trace["matched"], true);

        let second = dir.path().join("002-ok");
        let trace = std::fs::read_to_string(second.join(TRACE_FILE)).unwrap();
        assert_eq!(trace.trim(), "null");
    }
}
