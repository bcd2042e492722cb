use console::{style, StyledObject};

use super::document::{Report, VerdictRecord};
use crate::models::Classification;
use crate::utils::{clip, format_duration};

const ID_WIDTH: usize = 36;

/// The table goes to stderr, so colour follows stderr's terminal.
fn paint<D>(value: D) -> StyledObject<D> {
    style(value).for_stderr()
}

fn styled(classification: Classification) -> String {
    let text = format!("{:<22}", classification.as_str());
    match classification {
        Classification::ConfirmedVulnerable | Classification::ConfirmedMitigated => {
            paint(text).green().to_string()
        }
        Classification::ConfirmedIllustrative => paint(text).cyan().to_string(),
        Classification::Inconclusive => paint(text).yellow().to_string(),
        Classification::HarnessError => paint(text).red().bold().to_string(),
    }
}

fn observed(record: &VerdictRecord) -> String {
    if let Some(reason) = &record.reason {
        return clip(reason, 40);
    }
    if record.build_failed {
        return "build failed".to_string();
    }
    if let Some(cap) = record.cap_hit {
        return format!("{} cap", cap);
    }
    match (&record.signal, record.exit_status) {
        (Some(signal), _) => signal.clone(),
        (None, Some(code)) => format!("exit {}", code),
        (None, None) => "-".to_string(),
    }
}

/// Human-readable table of a finished run, meant for stderr.
pub fn render_summary(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n  {} {} ({} of {} examples selected)\n\n",
        paint("Corpus").bold(),
        report.manifest.id,
        report.selection.selected,
        report.selection.total,
    ));

    let id_width = report
        .verdicts
        .iter()
        .map(|v| v.id.chars().count().min(ID_WIDTH))
        .max()
        .unwrap_or(2)
        .max(2);
    out.push_str(&format!(
        "  {}\n",
        paint(format!(
            "{:<id_width$}  {:<10}  {:<22}  {:>8}  {}",
            "ID", "CWE", "CLASSIFICATION", "ELAPSED", "OBSERVED"
        ))
        .dim()
    ));
    for record in &report.verdicts {
        out.push_str(&format!(
            "  {:<id_width$}  {:<10}  {}  {:>8}  {}\n",
            clip(&record.id, ID_WIDTH),
            clip(&record.cwe, 10),
            styled(record.classification),
            format_duration(record.elapsed_ms),
            observed(record),
        ));
    }

    let counts: Vec<String> = Classification::ALL
        .iter()
        .filter_map(|c| {
            let n = report.summary.count(*c);
            (n > 0).then(|| format!("{} {}", n, c))
        })
        .collect();
    out.push_str(&format!(
        "\n  {} {}\n",
        paint("Summary:").bold(),
        if counts.is_empty() { "no examples run".to_string() } else { counts.join(", ") }
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceCaps;
    use crate::index::Filter;
    use crate::models::{Example, ExecutionOutcome, Intent, Verdict};
    use crate::oracle::{decide, parse_clause, Oracle};
    use crate::report::document::{ManifestRecord, RunContext, SelectionRecord};
    use chrono::Utc;
    use std::sync::Arc;

    #[test]
    fn test_summary_lists_every_verdict() {
        console::set_colors_enabled_stderr(false);
        let example = Arc::new(Example::fixture(
            "cwe121-overflow",
            Intent::IntendedVulnerable,
            Oracle::Single(parse_clause("terminated-by-signal: crash").unwrap()),
        ));
        let crashed = decide(
            example.clone(),
            ExecutionOutcome { signal: Some("SIGSEGV".into()), elapsed_ms: 12, ..Default::default() },
        );
        let cancelled = Verdict::cancelled(example);
        let context = RunContext {
            manifest: ManifestRecord { id: "posix".into(), path: "m.yaml".into(), declared_harness_version: None },
            caps: ResourceCaps::default().record(),
            selection: SelectionRecord::new(&Filter::default(), 5, 2),
            excerpt_bytes: 64,
            started_at: Utc::now(),
        };
        let report = Report::build(context, &[crashed, cancelled], Utc::now());

        let text = render_summary(&report);
        assert!(text.contains("posix (2 of 5 examples selected)"));
        assert!(text.contains("SIGSEGV"));
        assert!(text.contains("cancelled"));
        assert!(text.contains("1 confirmed-vulnerable, 1 harness-error"));
    }
}
