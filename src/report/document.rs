use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::escape::excerpt;
use crate::config::CapsRecord;
use crate::index::{Filter, ManifestMeta};
use crate::models::{CapKind, Classification, Intent, Verdict};
use crate::oracle::OracleTrace;

pub const HARNESS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Elapsed-time granularity used for cross-run comparisons.
pub const ELAPSED_BUCKET_MS: u64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ManifestRecord {
    pub id: String,
    pub path: String,
    pub declared_harness_version: Option<String>,
}

impl From<&ManifestMeta> for ManifestRecord {
    fn from(meta: &ManifestMeta) -> Self {
        Self {
            id: meta.id.clone(),
            path: meta.path.display().to_string(),
            declared_harness_version: meta.declared_harness_version.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostRecord {
    pub os_family: String,
    pub os: String,
    pub arch: String,
    pub word_size: u32,
}

impl HostRecord {
    pub fn current() -> Self {
        Self {
            os_family: std::env::consts::FAMILY.to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            word_size: usize::BITS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionRecord {
    pub filters_cwe: Vec<String>,
    pub filters_tag: Vec<String>,
    pub total: usize,
    pub selected: usize,
}

impl SelectionRecord {
    pub fn new(filter: &Filter, total: usize, selected: usize) -> Self {
        Self {
            filters_cwe: filter.cwes.clone(),
            filters_tag: filter.tags.clone(),
            total,
            selected,
        }
    }
}

/// Counts per classification. Every classification is always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryRecord {
    pub total: usize,
    pub counts: BTreeMap<Classification, usize>,
}

impl SummaryRecord {
    pub fn tally(verdicts: &[Verdict]) -> Self {
        let mut counts: BTreeMap<Classification, usize> =
            Classification::ALL.iter().map(|c| (*c, 0)).collect();
        for verdict in verdicts {
            *counts.entry(verdict.classification).or_default() += 1;
        }
        Self { total: verdicts.len(), counts }
    }

    pub fn count(&self, classification: Classification) -> usize {
        self.counts.get(&classification).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerdictRecord {
    pub id: String,
    pub cwe: String,
    pub intent: Intent,
    pub classification: Classification,
    pub exit_status: Option<i32>,
    pub signal: Option<String>,
    pub elapsed_ms: u64,
    pub elapsed_bucket_ms: u64,
    pub cap_hit: Option<CapKind>,
    pub output_truncated: bool,
    pub build_failed: bool,
    pub peak_rss_bytes: Option<u64>,
    pub reason: Option<String>,
    pub stdout_excerpt: String,
    pub stdout_excerpt_truncated: bool,
    pub stderr_excerpt: String,
    pub stderr_excerpt_truncated: bool,
    pub trace: Option<OracleTrace>,
}

impl VerdictRecord {
    pub fn from_verdict(verdict: &Verdict, excerpt_bytes: usize) -> Self {
        let example = &verdict.example;
        let outcome = verdict.outcome.as_ref();
        let elapsed_ms = outcome.map_or(0, |o| o.elapsed_ms);
        let (stdout_excerpt, stdout_excerpt_truncated) =
            excerpt(outcome.map_or(&[][..], |o| &o.stdout), excerpt_bytes);
        let (stderr_excerpt, stderr_excerpt_truncated) =
            excerpt(outcome.map_or(&[][..], |o| &o.stderr), excerpt_bytes);

        Self {
            id: example.id.clone(),
            cwe: example.cwe.clone(),
            intent: example.intent,
            classification: verdict.classification,
            exit_status: outcome.and_then(|o| o.exit_status),
            signal: outcome.and_then(|o| o.signal.clone()),
            elapsed_ms,
            elapsed_bucket_ms: bucket(elapsed_ms),
            cap_hit: outcome.and_then(|o| o.cap_hit),
            output_truncated: outcome.map_or(false, |o| o.output_truncated),
            build_failed: outcome.map_or(false, |o| o.build_failed),
            peak_rss_bytes: outcome.and_then(|o| o.peak_rss_bytes),
            reason: verdict.reason.clone(),
            stdout_excerpt,
            stdout_excerpt_truncated,
            stderr_excerpt,
            stderr_excerpt_truncated,
            trace: verdict.trace.clone(),
        }
    }
}

pub fn bucket(elapsed_ms: u64) -> u64 {
    elapsed_ms - elapsed_ms % ELAPSED_BUCKET_MS
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The run report. Field order here is the order in the emitted JSON.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub manifest: ManifestRecord,
    pub harness_version: String,
    pub harness_build: Option<String>,
    pub host: HostRecord,
    pub started_at: String,
    pub finished_at: String,
    pub caps: CapsRecord,
    pub selection: SelectionRecord,
    pub summary: SummaryRecord,
    pub verdicts: Vec<VerdictRecord>,
}

/// Everything about a run except its verdicts.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub manifest: ManifestRecord,
    pub caps: CapsRecord,
    pub selection: SelectionRecord,
    pub excerpt_bytes: usize,
    pub started_at: DateTime<Utc>,
}

impl Report {
    pub fn build(context: RunContext, verdicts: &[Verdict], finished_at: DateTime<Utc>) -> Self {
        let records = verdicts
            .iter()
            .map(|v| VerdictRecord::from_verdict(v, context.excerpt_bytes))
            .collect();
        Self {
            manifest: context.manifest,
            harness_version: HARNESS_VERSION.to_string(),
            harness_build: option_env!("GIT_HASH").map(str::to_string),
            host: HostRecord::current(),
            started_at: timestamp(context.started_at),
            finished_at: timestamp(finished_at),
            caps: context.caps,
            selection: context.selection,
            summary: SummaryRecord::tally(verdicts),
            verdicts: records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceCaps;
    use crate::models::{Example, ExecutionOutcome};
    use crate::oracle::{decide, parse_clause, Oracle};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn context() -> RunContext {
        RunContext {
            manifest: ManifestRecord {
                id: "corpus".into(),
                path: "/corpus/harness.yaml".into(),
                declared_harness_version: Some("1".into()),
            },
            caps: ResourceCaps::default().record(),
            selection: SelectionRecord::new(&Filter::default(), 2, 2),
            excerpt_bytes: 4,
            started_at: Utc::now(),
        }
    }

    fn crash_verdict() -> Verdict {
        let example = Arc::new(Example::fixture(
            "overflow",
            Intent::IntendedVulnerable,
            Oracle::Single(parse_clause("terminated-by-signal: crash").unwrap()),
        ));
        decide(
            example,
            ExecutionOutcome {
                signal: Some("SIGSEGV".into()),
                stderr: b"boom\n\xff".to_vec(),
                elapsed_ms: 137,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_bucket_floors_to_ten() {
        assert_eq!(bucket(0), 0);
        assert_eq!(bucket(9), 0);
        assert_eq!(bucket(137), 130);
        assert_eq!(bucket(140), 140);
    }

    #[test]
    fn test_verdict_record_fields() {
        let record = VerdictRecord::from_verdict(&crash_verdict(), 4);
        assert_eq!(record.classification, Classification::ConfirmedVulnerable);
        assert_eq!(record.signal.as_deref(), Some("SIGSEGV"));
        assert_eq!(record.exit_status, None);
        assert_eq!(record.elapsed_bucket_ms, 130);
        assert_eq!(record.stderr_excerpt, "boom");
        assert!(record.stderr_excerpt_truncated);
        assert!(!record.stdout_excerpt_truncated);
        assert!(record.reason.is_none());
    }

    #[test]
    fn test_harness_error_record() {
        let example = Arc::new(Example::fixture(
            "late",
            Intent::IntendedMitigated,
            Oracle::Single(parse_clause("exit-status: zero").unwrap()),
        ));
        let record = VerdictRecord::from_verdict(&Verdict::cancelled(example), 16);
        assert_eq!(record.classification, Classification::HarnessError);
        assert_eq!(record.reason.as_deref(), Some("cancelled"));
        assert!(record.trace.is_none());
        assert_eq!(record.elapsed_ms, 0);
    }

    #[test]
    fn test_summary_has_every_classification() {
        let summary = SummaryRecord::tally(&[crash_verdict()]);
        assert_eq!(summary.total, 1);
        assert_eq!(summary.counts.len(), Classification::ALL.len());
        assert_eq!(summary.count(Classification::ConfirmedVulnerable), 1);
        assert_eq!(summary.count(Classification::Inconclusive), 0);
    }

    #[test]
    fn test_report_top_level_order() {
        let report = Report::build(context(), &[crash_verdict()], Utc::now());
        let json = serde_json::to_string(&report).unwrap();
        let keys = [
            "\"manifest\"",
            "\"harness_version\"",
            "\"harness_build\"",
            "\"host\"",
            "\"started_at\"",
            "\"finished_at\"",
            "\"caps\"",
            "\"selection\"",
            "\"summary\"",
            "\"verdicts\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|k| json.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(report.host.word_size, usize::BITS);
        assert!(report.started_at.ends_with('Z'));
    }

    #[test]
    fn test_manifest_record_from_meta() {
        let meta = ManifestMeta {
            id: "posix".into(),
            path: PathBuf::from("/c/posix.yaml"),
            declared_harness_version: None,
            base_dir: PathBuf::from("/c"),
        };
        let record = ManifestRecord::from(&meta);
        assert_eq!(record.path, "/c/posix.yaml");
        assert!(record.declared_harness_version.is_none());
    }
}
