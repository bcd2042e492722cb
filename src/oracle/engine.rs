use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::clause::*;
use super::signals::is_crash_signal;
use crate::models::{Classification, Example, ExecutionOutcome, Intent, Verdict};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub clause: String,
    pub matched: bool,
}

/// Which leaf clauses matched, in declaration order, and the combined result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleTrace {
    pub combinator: Combinator,
    pub clauses: Vec<TraceEntry>,
    pub matched: bool,
}

/// Evaluate every leaf clause, then combine per the declared structure.
///
/// All clauses are evaluated even when the result is already decided so the
/// trace is complete.
pub fn evaluate(oracle: &Oracle, outcome: &ExecutionOutcome) -> OracleTrace {
    let clauses: Vec<TraceEntry> = oracle
        .clauses()
        .iter()
        .map(|clause| TraceEntry {
            clause: clause.to_string(),
            matched: clause_matches(clause, outcome),
        })
        .collect();

    let matched = match oracle.combinator() {
        Combinator::Single | Combinator::AllOf => clauses.iter().all(|e| e.matched),
        Combinator::AnyOf => clauses.iter().any(|e| e.matched),
    };

    OracleTrace {
        combinator: oracle.combinator(),
        clauses,
        matched,
    }
}

/// Map declared intent plus oracle result to a classification.
///
/// Intent is never inferred from the outcome: a miss is always inconclusive.
pub fn classify(intent: Intent, trace: &OracleTrace) -> Classification {
    if !trace.matched {
        return Classification::Inconclusive;
    }
    match intent {
        Intent::IntendedVulnerable => Classification::ConfirmedVulnerable,
        Intent::IntendedMitigated => Classification::ConfirmedMitigated,
        Intent::Illustrative => Classification::ConfirmedIllustrative,
    }
}

pub fn decide(example: Arc<Example>, outcome: ExecutionOutcome) -> Verdict {
    let trace = evaluate(&example.oracle, &outcome);
    let classification = classify(example.intent, &trace);
    debug!(
        example = %example.id,
        classification = %classification,
        matched = trace.matched,
        "Oracle evaluated"
    );
    Verdict {
        example,
        classification,
        trace: Some(trace),
        outcome: Some(outcome),
        reason: None,
    }
}

fn clause_matches(clause: &Clause, outcome: &ExecutionOutcome) -> bool {
    // The artifact never ran after a failed build; only the build streams are observable.
    if outcome.build_failed {
        return match clause {
            Clause::BuildFailed => true,
            Clause::Output { stream, matcher } => text_matches(matcher, stream_bytes(*stream, outcome)),
            _ => false,
        };
    }

    match clause {
        Clause::ExitStatus(matcher) => match outcome.exit_status {
            None => false,
            Some(code) => match matcher {
                ExitMatcher::Equals(n) => code == *n,
                ExitMatcher::InSet(set) => set.contains(&code),
                ExitMatcher::NonZero => code != 0,
                ExitMatcher::Zero => code == 0,
            },
        },
        Clause::TerminatedBySignal(matcher) => match outcome.signal.as_deref() {
            None => false,
            Some(name) => match matcher {
                SignalMatcher::Any => true,
                SignalMatcher::Name(expected) => name == expected,
                SignalMatcher::Crash => is_crash_signal(name),
            },
        },
        Clause::Output { stream, matcher } => text_matches(matcher, stream_bytes(*stream, outcome)),
        Clause::WallTimeExceededCap => outcome.time_cap_hit(),
        Clause::OutputTruncated => outcome.output_truncated,
        Clause::BuildFailed => false,
    }
}

fn stream_bytes(stream: Stream, outcome: &ExecutionOutcome) -> &[u8] {
    match stream {
        Stream::Stdout => &outcome.stdout,
        Stream::Stderr => &outcome.stderr,
    }
}

fn text_matches(matcher: &TextMatcher, haystack: &[u8]) -> bool {
    match matcher {
        TextMatcher::Contains(needle) => contains_bytes(haystack, needle),
        TextMatcher::Matches(re) => re.is_match(haystack),
    }
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}
