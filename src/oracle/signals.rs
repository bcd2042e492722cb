//! Platform adapter for signal names and the `crash` oracle clause.
//!
//! Names are always emitted verbatim (`SIGSEGV`) so downstream consumers can
//! reinterpret them for other platforms.

use nix::sys::signal::Signal;
use std::str::FromStr;

/// Fatal signals raised for memory-safety or arithmetic faults.
pub const CRASH_SIGNALS: &[&str] = &[
    "SIGSEGV",
    "SIGBUS",
    "SIGILL",
    "SIGFPE",
    "SIGABRT",
    "SIGTRAP",
];

/// Canonical name for a raw signal number. Unknown numbers become `SIG<n>`.
pub fn signal_name(number: i32) -> String {
    match Signal::try_from(number) {
        Ok(sig) => sig.as_str().to_string(),
        Err(_) => format!("SIG{}", number),
    }
}

/// Parse a user-written signal reference: `SIGSEGV`, `segv`, or `11`.
pub fn canonical_signal(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(number) = text.parse::<i32>() {
        return Signal::try_from(number).ok().map(|s| s.as_str().to_string());
    }
    let upper = text.to_ascii_uppercase();
    let name = if upper.starts_with("SIG") { upper } else { format!("SIG{}", upper) };
    Signal::from_str(&name).ok().map(|s| s.as_str().to_string())
}

pub fn is_crash_signal(name: &str) -> bool {
    CRASH_SIGNALS.contains(&name)
}
