pub mod clause;
pub mod engine;
pub mod parse;
pub mod signals;

pub use clause::{Clause, Combinator, ExitMatcher, Oracle, SignalMatcher, Stream, TextMatcher};
pub use engine::{classify, decide, evaluate, OracleTrace, TraceEntry};
pub use parse::{parse_clause, parse_oracle, OracleParseError};
