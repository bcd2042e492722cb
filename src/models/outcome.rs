use serde::{Deserialize, Serialize};

/// Which resource cap ended an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapKind {
    Cpu,
    Wall,
    Memory,
}

impl CapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Wall => "wall",
            Self::Memory => "memory",
        }
    }

    /// Cpu and wall caps both mean the program ran out of time.
    pub fn is_time_cap(&self) -> bool {
        matches!(self, Self::Cpu | Self::Wall)
    }
}

impl std::fmt::Display for CapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the sandbox observed. Created when execution ends, never mutated afterwards.
///
/// When `build_failed` is set the streams and exit status belong to the build
/// step and the artifact never ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Absent when the process was killed.
    pub exit_status: Option<i32>,
    /// Canonical name (`SIGSEGV`) of the terminating signal.
    pub signal: Option<String>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed_ms: u64,
    pub build_elapsed_ms: u64,
    /// Best effort; `None` where the platform offers no way to sample it.
    pub peak_rss_bytes: Option<u64>,
    pub cap_hit: Option<CapKind>,
    pub output_truncated: bool,
    pub build_failed: bool,
}

impl ExecutionOutcome {
    pub fn exited_normally(&self) -> bool {
        self.exit_status.is_some()
    }

    pub fn killed_by_signal(&self) -> bool {
        self.signal.is_some()
    }

    pub fn time_cap_hit(&self) -> bool {
        self.cap_hit.map_or(false, |c| c.is_time_cap())
    }
}
