//! Canonical text form for captured bytes, so reports diff cleanly across runs.

use std::fmt::Write;

/// Printable ASCII other than `\` is kept; `\\`, `\n`, `\r` and `\t` use
/// short escapes; every other byte becomes `\xHH` (lowercase hex).
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{:02x}", b);
            }
        }
    }
    out
}

/// Leading `limit` bytes, escaped, and whether anything was cut off.
pub fn excerpt(bytes: &[u8], limit: usize) -> (String, bool) {
    if bytes.len() > limit {
        (escape_bytes(&bytes[..limit]), true)
    } else {
        (escape_bytes(bytes), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable_passthrough() {
        assert_eq!(escape_bytes(b"OK done"), "OK done");
    }

    #[test]
    fn test_short_escapes() {
        assert_eq!(escape_bytes(b"a\\b\n\r\t"), "a\\\\b\\n\\r\\t");
    }

    #[test]
    fn test_hex_escapes() {
        assert_eq!(escape_bytes(&[0x00, 0x7f, 0xff, b'"']), "\\x00\\x7f\\xff\"");
    }

    #[test]
    fn test_excerpt_truncation() {
        assert_eq!(excerpt(b"abcdef", 3), ("abc".to_string(), true));
        assert_eq!(excerpt(b"abc", 3), ("abc".to_string(), false));
        assert_eq!(excerpt(b"", 0), (String::new(), false));
    }
}
