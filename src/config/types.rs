use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::index::Filter;

pub const DEFAULT_CPU_CAP: Duration = Duration::from_secs(5);
pub const DEFAULT_WALL_CAP: Duration = Duration::from_secs(10);
pub const DEFAULT_MEMORY_CAP: u64 = 256 * 1024 * 1024;
pub const DEFAULT_CAPTURE_CAP: usize = 1024 * 1024;
pub const DEFAULT_BUILD_CAP: Duration = Duration::from_secs(120);
pub const DEFAULT_EXCERPT_BYTES: usize = 2048;

/// Variables passed through from the harness's own environment.
pub const DEFAULT_ENV_WHITELIST: &[&str] = &["PATH", "LANG", "TZ"];

/// Bounds enforced on every child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCaps {
    pub cpu: Duration,
    pub wall: Duration,
    pub memory_bytes: u64,
    /// Per stream.
    pub capture_bytes: usize,
    pub build_wall: Duration,
}

impl Default for ResourceCaps {
    fn default() -> Self {
        Self {
            cpu: DEFAULT_CPU_CAP,
            wall: DEFAULT_WALL_CAP,
            memory_bytes: DEFAULT_MEMORY_CAP,
            capture_bytes: DEFAULT_CAPTURE_CAP,
            build_wall: DEFAULT_BUILD_CAP,
        }
    }
}

/// Report form of the caps: integer milliseconds and bytes.
#[derive(Debug, Clone, Serialize)]
pub struct CapsRecord {
    pub cpu_ms: u64,
    pub wall_ms: u64,
    pub memory_bytes: u64,
    pub capture_bytes: u64,
    pub build_wall_ms: u64,
}

impl ResourceCaps {
    pub fn record(&self) -> CapsRecord {
        CapsRecord {
            cpu_ms: self.cpu.as_millis() as u64,
            wall_ms: self.wall.as_millis() as u64,
            memory_bytes: self.memory_bytes,
            capture_bytes: self.capture_bytes as u64,
            build_wall_ms: self.build_wall.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputTarget {
    #[default]
    Stdout,
    File(PathBuf),
}

/// Everything a run needs, built once from flags and environment and passed down by value.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub manifest: PathBuf,
    pub parallelism: usize,
    pub caps: ResourceCaps,
    pub scratch_root: PathBuf,
    pub env_whitelist: Vec<String>,
    pub excerpt_bytes: usize,
    pub strict: bool,
    pub filter: Filter,
    pub artifacts_dir: Option<PathBuf>,
    pub output: OutputTarget,
}

impl HarnessConfig {
    pub fn new(manifest: impl Into<PathBuf>) -> Self {
        Self {
            manifest: manifest.into(),
            parallelism: default_parallelism(),
            caps: ResourceCaps::default(),
            scratch_root: std::env::temp_dir(),
            env_whitelist: DEFAULT_ENV_WHITELIST.iter().map(|s| s.to_string()).collect(),
            excerpt_bytes: DEFAULT_EXCERPT_BYTES,
            strict: false,
            filter: Filter::default(),
            artifacts_dir: None,
            output: OutputTarget::Stdout,
        }
    }
}

/// Available hardware threads, at least 1.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1)
}
