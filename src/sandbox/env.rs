use std::collections::BTreeMap;
use std::path::Path;

const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// The scrubbed environment handed to one child.
///
/// Whitelisted variables come from the harness's own environment, `HOME` and
/// `TMPDIR` point into the scratch directory, the locale is pinned, and the
/// example's own `env` mapping is applied last.
pub fn child_environment<F>(
    whitelist: &[String],
    scratch: &Path,
    example_env: &BTreeMap<String, String>,
    lookup: F,
) -> BTreeMap<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut env = BTreeMap::new();
    for name in whitelist {
        if let Some(value) = lookup(name) {
            env.insert(name.clone(), value);
        }
    }
    env.entry("PATH".to_string())
        .or_insert_with(|| FALLBACK_PATH.to_string());

    let scratch = scratch.to_string_lossy().into_owned();
    env.insert("HOME".into(), scratch.clone());
    env.insert("TMPDIR".into(), scratch);
    env.insert("LC_ALL".into(), "C".into());

    for (name, value) in example_env {
        env.insert(name.clone(), value.clone());
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitelist() -> Vec<String> {
        vec!["PATH".into(), "LANG".into(), "TZ".into()]
    }

    #[test]
    fn test_only_whitelisted_variables_pass() {
        let lookup = |name: &str| match name {
            "PATH" => Some("/opt/bin:/usr/bin".to_string()),
            "SECRET_TOKEN" => Some("hunter2".to_string()),
            _ => None,
        };
        let env = child_environment(&whitelist(), Path::new("/tmp/s"), &BTreeMap::new(), lookup);
        assert_eq!(env.get("PATH").map(String::as_str), Some("/opt/bin:/usr/bin"));
        assert!(!env.contains_key("SECRET_TOKEN"));
        assert!(!env.contains_key("LANG"));
        assert_eq!(env.get("HOME").map(String::as_str), Some("/tmp/s"));
        assert_eq!(env.get("TMPDIR").map(String::as_str), Some("/tmp/s"));
        assert_eq!(env.get("LC_ALL").map(String::as_str), Some("C"));
    }

    #[test]
    fn test_path_fallback() {
        let env = child_environment(&whitelist(), Path::new("/tmp/s"), &BTreeMap::new(), |_| None);
        assert_eq!(env.get("PATH").map(String::as_str), Some(FALLBACK_PATH));
    }

    #[test]
    fn test_example_env_applied_last() {
        let mut extra = BTreeMap::new();
        extra.insert("LC_ALL".to_string(), "en_US.UTF-8".to_string());
        extra.insert("MALLOC_CHECK_".to_string(), "3".to_string());
        let env = child_environment(&whitelist(), Path::new("/tmp/s"), &extra, |_| None);
        assert_eq!(env.get("LC_ALL").map(String::as_str), Some("en_US.UTF-8"));
        assert_eq!(env.get("MALLOC_CHECK_").map(String::as_str), Some("3"));
    }
}
