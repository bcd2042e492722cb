use nix::errno::Errno;

use super::types::{ExecutorError, HarnessError};

pub const EXIT_HARNESS_ERROR: i32 = 2;
pub const EXIT_MANIFEST_ERROR: i32 = 3;
pub const EXIT_USAGE_ERROR: i32 = 4;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub exit_code: i32,
    pub retryable: bool,
}

impl HarnessError {
    /// Classify this error to determine the process exit code.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            HarnessError::Usage(_) => ErrorClassification {
                error_type: "UsageError",
                exit_code: EXIT_USAGE_ERROR,
                retryable: false,
            },
            HarnessError::Manifest(_) => ErrorClassification {
                error_type: "ManifestError",
                exit_code: EXIT_MANIFEST_ERROR,
                retryable: false,
            },
            HarnessError::Executor(e) => e.classify(),
            HarnessError::Report(_) => ErrorClassification {
                error_type: "ReportError",
                exit_code: EXIT_HARNESS_ERROR,
                retryable: false,
            },
            HarnessError::Io(_) => ErrorClassification {
                error_type: "IoError",
                exit_code: EXIT_HARNESS_ERROR,
                retryable: false,
            },
            HarnessError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                exit_code: EXIT_HARNESS_ERROR,
                retryable: false,
            },
            HarnessError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                exit_code: EXIT_MANIFEST_ERROR,
                retryable: false,
            },
            HarnessError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                exit_code: EXIT_HARNESS_ERROR,
                retryable: false,
            },
        }
    }
}

impl ExecutorError {
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // A freshly written artifact can still be open for writing (ETXTBSY), and
            // fork can fail transiently under process pressure (EAGAIN).
            ExecutorError::Spawn { source, .. } => ErrorClassification {
                error_type: "SpawnError",
                exit_code: EXIT_HARNESS_ERROR,
                retryable: matches!(
                    source.raw_os_error(),
                    Some(code) if code == Errno::ETXTBSY as i32 || code == Errno::EAGAIN as i32
                ),
            },
            ExecutorError::Scratch { .. } => ErrorClassification {
                error_type: "ScratchError",
                exit_code: EXIT_HARNESS_ERROR,
                retryable: false,
            },
            ExecutorError::Materialise { .. } => ErrorClassification {
                error_type: "MaterialiseError",
                exit_code: EXIT_HARNESS_ERROR,
                retryable: false,
            },
            ExecutorError::Supervise(_) => ErrorClassification {
                error_type: "SuperviseError",
                exit_code: EXIT_HARNESS_ERROR,
                retryable: false,
            },
            ExecutorError::Cancelled => ErrorClassification {
                error_type: "Cancelled",
                exit_code: EXIT_HARNESS_ERROR,
                retryable: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ManifestError, ManifestErrorKind, ManifestErrors};
    use std::path::PathBuf;

    fn spawn_error(code: i32) -> ExecutorError {
        ExecutorError::Spawn {
            program: "./a.out".into(),
            source: std::io::Error::from_raw_os_error(code),
        }
    }

    #[test]
    fn test_usage_exit_code() {
        let class = HarnessError::Usage("bad flag".into()).classify();
        assert_eq!(class.exit_code, 4);
        assert_eq!(class.error_type, "UsageError");
    }

    #[test]
    fn test_manifest_exit_code() {
        let errors = ManifestErrors(vec![ManifestError::new(
            ManifestErrorKind::DuplicateId,
            PathBuf::from("corpus.yaml"),
            Some(3),
            "duplicate id `a`",
        )]);
        assert_eq!(HarnessError::from(errors).classify().exit_code, 3);
    }

    #[test]
    fn test_io_is_harness_error() {
        let err = HarnessError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(err.classify().exit_code, 2);
    }

    #[test]
    fn test_text_busy_is_retryable() {
        assert!(spawn_error(Errno::ETXTBSY as i32).classify().retryable);
        assert!(spawn_error(Errno::EAGAIN as i32).classify().retryable);
    }

    #[test]
    fn test_missing_program_not_retryable() {
        assert!(!spawn_error(Errno::ENOENT as i32).classify().retryable);
        assert!(!ExecutorError::Cancelled.classify().retryable);
    }
}
