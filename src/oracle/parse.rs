use serde_yaml::Value;
use thiserror::Error;
use super::clause::*;
use super::signals::canonical_signal;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct OracleParseError(pub String);

fn bad(message: impl Into<String>) -> OracleParseError {
    OracleParseError(message.into())
}

/// Parse the `oracle` value of a manifest entry.
///
/// Accepted shapes: a clause string, a one-key clause mapping, or a mapping
/// with a single `any-of` / `all-of` key holding a non-empty list of clauses.
pub fn parse_oracle(value: &Value) -> Result<Oracle, OracleParseError> {
    match value {
        Value::String(text) => Ok(Oracle::Single(parse_clause(text)?)),
        Value::Mapping(map) => {
            if map.len() != 1 {
                return Err(bad(format!(
                    "oracle mapping must have exactly one key, found {}",
                    map.len()
                )));
            }
            let (key, inner) = map.iter().next().ok_or_else(|| bad("empty oracle"))?;
            let key = key.as_str().ok_or_else(|| bad("oracle keys must be strings"))?;
            match key {
                "any-of" => Ok(Oracle::AnyOf(parse_clause_list(key, inner)?)),
                "all-of" => Ok(Oracle::AllOf(parse_clause_list(key, inner)?)),
                _ => Ok(Oracle::Single(parse_clause_entry(key, inner)?)),
            }
        }
        Value::Null => Err(bad("oracle is missing")),
        _ => Err(bad("oracle must be a clause string or mapping")),
    }
}

fn parse_clause_list(combinator: &str, value: &Value) -> Result<Vec<Clause>, OracleParseError> {
    let items = value
        .as_sequence()
        .ok_or_else(|| bad(format!("`{}` expects a list of clauses", combinator)))?;
    if items.is_empty() {
        return Err(bad(format!("`{}` list is empty", combinator)));
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            parse_clause_value(item).map_err(|e| bad(format!("{}[{}]: {}", combinator, i, e)))
        })
        .collect()
}

fn parse_clause_value(value: &Value) -> Result<Clause, OracleParseError> {
    match value {
        Value::String(text) => parse_clause(text),
        Value::Mapping(map) if map.len() == 1 => {
            let (key, inner) = map.iter().next().ok_or_else(|| bad("empty clause"))?;
            let key = key.as_str().ok_or_else(|| bad("clause keys must be strings"))?;
            if key == "any-of" || key == "all-of" {
                return Err(bad("nested any-of/all-of is not supported"));
            }
            parse_clause_entry(key, inner)
        }
        _ => Err(bad("clause must be a string or a one-key mapping")),
    }
}

/// `{key: value}` mapping form. Unit clauses accept `true`.
fn parse_clause_entry(key: &str, value: &Value) -> Result<Clause, OracleParseError> {
    let argument = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) if is_unit_clause(key) => return parse_clause(key),
        Value::Bool(_) => return Err(bad(format!("`{}` does not take a boolean", key))),
        Value::Null if is_unit_clause(key) => return parse_clause(key),
        _ => return Err(bad(format!("`{}` expects a scalar argument", key))),
    };
    parse_keyed(key, argument.trim())
}

fn is_unit_clause(key: &str) -> bool {
    matches!(key, "wall-time-exceeded-cap" | "output-truncated" | "build-failed")
}

/// Parse one clause in its textual form, e.g. `exit-status: in-set {1, 2}`.
pub fn parse_clause(text: &str) -> Result<Clause, OracleParseError> {
    let text = text.trim();
    match text {
        "wall-time-exceeded-cap" => return Ok(Clause::WallTimeExceededCap),
        "output-truncated" => return Ok(Clause::OutputTruncated),
        "build-failed" => return Ok(Clause::BuildFailed),
        _ => {}
    }
    let (key, argument) = text
        .split_once(':')
        .ok_or_else(|| bad(format!("unrecognised clause `{}`", text)))?;
    parse_keyed(key.trim(), argument.trim())
}

fn parse_keyed(key: &str, argument: &str) -> Result<Clause, OracleParseError> {
    match key {
        "exit-status" => parse_exit(argument).map(Clause::ExitStatus),
        "terminated-by-signal" => parse_signal(argument).map(Clause::TerminatedBySignal),
        "stdout-contains" => Ok(Clause::Output {
            stream: Stream::Stdout,
            matcher: TextMatcher::Contains(parse_literal(argument)?),
        }),
        "stderr-contains" => Ok(Clause::Output {
            stream: Stream::Stderr,
            matcher: TextMatcher::Contains(parse_literal(argument)?),
        }),
        "stdout-matches" => Ok(Clause::Output {
            stream: Stream::Stdout,
            matcher: TextMatcher::Matches(parse_pattern(argument)?),
        }),
        "stderr-matches" => Ok(Clause::Output {
            stream: Stream::Stderr,
            matcher: TextMatcher::Matches(parse_pattern(argument)?),
        }),
        k if is_unit_clause(k) => Err(bad(format!("`{}` takes no argument", k))),
        other => Err(bad(format!("unknown clause `{}`", other))),
    }
}

fn parse_exit(argument: &str) -> Result<ExitMatcher, OracleParseError> {
    if argument == "zero" {
        return Ok(ExitMatcher::Zero);
    }
    if argument == "non-zero" {
        return Ok(ExitMatcher::NonZero);
    }
    if let Some(rest) = argument.strip_prefix("equals") {
        return parse_int(rest.trim()).map(ExitMatcher::Equals);
    }
    if let Some(rest) = argument.strip_prefix("in-set") {
        let body = rest
            .trim()
            .strip_prefix('{')
            .and_then(|r| r.strip_suffix('}'))
            .ok_or_else(|| bad("in-set expects `{N1, N2, ...}`"))?;
        let mut set = Vec::new();
        for item in body.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let n = parse_int(item)?;
            if !set.contains(&n) {
                set.push(n);
            }
        }
        if set.is_empty() {
            return Err(bad("in-set is empty"));
        }
        return Ok(ExitMatcher::InSet(set));
    }
    // A bare number reads as `equals N`.
    parse_int(argument)
        .map(ExitMatcher::Equals)
        .map_err(|_| bad(format!("unrecognised exit-status matcher `{}`", argument)))
}

fn parse_int(text: &str) -> Result<i32, OracleParseError> {
    text.parse::<i32>()
        .map_err(|_| bad(format!("`{}` is not an integer", text)))
}

fn parse_signal(argument: &str) -> Result<SignalMatcher, OracleParseError> {
    match argument {
        "any" => Ok(SignalMatcher::Any),
        "crash" => Ok(SignalMatcher::Crash),
        _ => {
            let name = argument
                .strip_prefix("name")
                .map(str::trim)
                .ok_or_else(|| bad(format!("unrecognised signal matcher `{}`", argument)))?;
            canonical_signal(name)
                .map(SignalMatcher::Name)
                .ok_or_else(|| bad(format!("unknown signal `{}`", name)))
        }
    }
}

/// A `"quoted"` literal with escapes, or the raw text when unquoted.
/// `\xHH` yields the raw byte, so binary output can be matched.
fn parse_literal(argument: &str) -> Result<Vec<u8>, OracleParseError> {
    if argument.is_empty() {
        return Err(bad("empty literal"));
    }
    let Some(inner) = argument.strip_prefix('"') else {
        return Ok(argument.as_bytes().to_vec());
    };
    let inner = inner
        .strip_suffix('"')
        .ok_or_else(|| bad(format!("unterminated literal {}", argument)))?;

    let mut out = Vec::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('r') => out.push(b'\r'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some('"') => out.push(b'"'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let byte = u8::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 2)
                    .ok_or_else(|| bad(format!("bad \\x escape in {}", argument)))?;
                out.push(byte);
            }
            other => {
                return Err(bad(format!(
                    "unknown escape `\\{}` in {}",
                    other.map(String::from).unwrap_or_default(),
                    argument
                )))
            }
        }
    }
    if out.is_empty() {
        return Err(bad("empty literal"));
    }
    Ok(out)
}

fn parse_pattern(argument: &str) -> Result<regex::bytes::Regex, OracleParseError> {
    let body = argument
        .strip_prefix('/')
        .and_then(|r| r.strip_suffix('/'))
        .filter(|b| !b.is_empty())
        .ok_or_else(|| bad(format!("pattern must be written as /regex/, got `{}`", argument)))?;
    regex::bytes::Regex::new(body).map_err(|e| bad(format!("invalid pattern /{}/: {}", body, e)))
}
