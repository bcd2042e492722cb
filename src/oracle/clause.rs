use std::fmt;

use crate::report::escape_bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitMatcher {
    Equals(i32),
    InSet(Vec<i32>),
    NonZero,
    Zero,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalMatcher {
    Any,
    /// Canonical signal name, e.g. `SIGSEGV`.
    Name(String),
    /// Any of the platform's fatal crash signals.
    Crash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Clone)]
pub enum TextMatcher {
    /// Raw bytes; `\xHH` escapes may produce non-UTF-8 needles.
    Contains(Vec<u8>),
    /// Byte regex, so binary output is matched without lossy decoding.
    Matches(regex::bytes::Regex),
}

/// One leaf predicate over an execution outcome. Each variant carries only the data it needs.
#[derive(Debug, Clone)]
pub enum Clause {
    ExitStatus(ExitMatcher),
    TerminatedBySignal(SignalMatcher),
    Output { stream: Stream, matcher: TextMatcher },
    WallTimeExceededCap,
    OutputTruncated,
    BuildFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Combinator {
    Single,
    AnyOf,
    AllOf,
}

impl Combinator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::AnyOf => "any-of",
            Self::AllOf => "all-of",
        }
    }
}

/// A declared oracle: one clause, or a flat `any-of` / `all-of` list.
#[derive(Debug, Clone)]
pub enum Oracle {
    Single(Clause),
    AnyOf(Vec<Clause>),
    AllOf(Vec<Clause>),
}

impl Oracle {
    pub fn combinator(&self) -> Combinator {
        match self {
            Self::Single(_) => Combinator::Single,
            Self::AnyOf(_) => Combinator::AnyOf,
            Self::AllOf(_) => Combinator::AllOf,
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        match self {
            Self::Single(clause) => std::slice::from_ref(clause),
            Self::AnyOf(clauses) | Self::AllOf(clauses) => clauses,
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::ExitStatus(m) => match m {
                ExitMatcher::Equals(n) => write!(f, "exit-status: equals {}", n),
                ExitMatcher::InSet(set) => {
                    let items: Vec<String> = set.iter().map(|n| n.to_string()).collect();
                    write!(f, "exit-status: in-set {{{}}}", items.join(", "))
                }
                ExitMatcher::NonZero => f.write_str("exit-status: non-zero"),
                ExitMatcher::Zero => f.write_str("exit-status: zero"),
            },
            Clause::TerminatedBySignal(m) => match m {
                SignalMatcher::Any => f.write_str("terminated-by-signal: any"),
                SignalMatcher::Name(name) => write!(f, "terminated-by-signal: name {}", name),
                SignalMatcher::Crash => f.write_str("terminated-by-signal: crash"),
            },
            Clause::Output { stream, matcher } => match matcher {
                TextMatcher::Contains(literal) => {
                    let quoted = escape_bytes(literal).replace('"', "\\\"");
                    write!(f, "{}-contains: \"{}\"", stream.as_str(), quoted)
                }
                TextMatcher::Matches(re) => {
                    write!(f, "{}-matches: /{}/", stream.as_str(), re.as_str())
                }
            },
            Clause::WallTimeExceededCap => f.write_str("wall-time-exceeded-cap"),
            Clause::OutputTruncated => f.write_str("output-truncated"),
            Clause::BuildFailed => f.write_str("build-failed"),
        }
    }
}
