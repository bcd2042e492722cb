use std::path::PathBuf;
use thiserror::Error;

use crate::manifest::ManifestErrors;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("{0}")]
    Manifest(#[from] ManifestErrors),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Report error: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Infrastructure faults while executing one example. A crashing child is not one of these.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("cannot create scratch directory under {root}: {source}")]
    Scratch {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot materialise {path}: {source}")]
    Materialise {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("lost track of child process: {0}")]
    Supervise(#[source] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

impl ExecutorError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Text recorded as the `reason` of a harness-error verdict.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}
