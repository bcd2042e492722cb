use std::path::PathBuf;
use tracing::debug;

use crate::errors::HarnessError;

pub const PARALLELISM_VAR: &str = "HARNESS_PARALLELISM";
pub const TMPDIR_VAR: &str = "HARNESS_TMPDIR";

/// Settings the harness reads from its own environment. Flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub parallelism: Option<usize>,
    pub tmpdir: Option<PathBuf>,
}

impl EnvOverrides {
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve from an arbitrary lookup so tests need not touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HarnessError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parallelism = match lookup(PARALLELISM_VAR) {
            Some(raw) => {
                let value = parse_parallelism(raw.trim()).map_err(|e| {
                    HarnessError::Usage(format!("{}={:?}: {}", PARALLELISM_VAR, raw, e))
                })?;
                debug!(var = PARALLELISM_VAR, value, "Parallelism from environment");
                Some(value)
            }
            None => None,
        };

        let tmpdir = lookup(TMPDIR_VAR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        if let Some(dir) = &tmpdir {
            debug!(var = TMPDIR_VAR, dir = %dir.display(), "Scratch root from environment");
        }

        Ok(Self { parallelism, tmpdir })
    }
}

/// A positive integer. Shared by the flag parser and the environment override.
pub fn parse_parallelism(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("parallelism must be at least 1".into()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("`{}` is not a positive integer", raw)),
    }
}
