use nix::libc::rlim_t;
use nix::sys::resource::{setrlimit, Resource};
use std::time::Duration;

use crate::config::ResourceCaps;

/// Headroom between the memory cap and the address-space backstop.
const ADDRESS_SPACE_SLACK: u64 = 64 * 1024 * 1024;

/// rlimits installed in the child between fork and exec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildLimits {
    /// Whole seconds; the hard limit sits one second above so SIGXCPU arrives first.
    pub cpu_secs: Option<u64>,
    /// Backstop only. The memory cap itself is enforced by RSS sampling, which
    /// can only see the child cross the cap if the address space allows it.
    pub address_space: Option<u64>,
}

impl ChildLimits {
    pub fn for_run(caps: &ResourceCaps) -> Self {
        let cpu_secs = caps.cpu.as_secs() + u64::from(caps.cpu.subsec_nanos() > 0);
        Self {
            cpu_secs: Some(cpu_secs.max(1)),
            address_space: Some(address_space_backstop(caps.memory_bytes)),
        }
    }

    /// Past this much CPU time the kernel sends SIGKILL instead of SIGXCPU.
    pub fn cpu_hard_limit(&self) -> Option<Duration> {
        self.cpu_secs.map(|secs| Duration::from_secs(secs.saturating_add(1)))
    }

    /// Builds only get the wall cap, supervised from outside.
    pub fn for_build() -> Self {
        Self { cpu_secs: None, address_space: None }
    }

    /// Runs in the forked child: no allocation, only raw syscalls.
    pub fn apply(&self) -> std::io::Result<()> {
        setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
        if let Some(secs) = self.cpu_secs {
            setrlimit(Resource::RLIMIT_CPU, secs as rlim_t, secs.saturating_add(1) as rlim_t)?;
        }
        #[cfg(target_os = "linux")]
        {
            if let Some(bytes) = self.address_space {
                setrlimit(Resource::RLIMIT_AS, bytes as rlim_t, bytes as rlim_t)?;
            }
        }
        Ok(())
    }
}

pub fn address_space_backstop(memory_cap: u64) -> u64 {
    memory_cap.saturating_mul(2).saturating_add(ADDRESS_SPACE_SLACK)
}

/// Peak resident set size of a live process, from `VmHWM` in `/proc/<pid>/status`.
#[cfg(target_os = "linux")]
pub fn peak_rss_bytes(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    parse_vm_hwm(&status)
}

#[cfg(not(target_os = "linux"))]
pub fn peak_rss_bytes(_pid: u32) -> Option<u64> {
    None
}

pub fn parse_vm_hwm(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmHWM:"))?;
    let mut fields = line["VmHWM:".len()..].split_whitespace();
    let value: u64 = fields.next()?.parse().ok()?;
    match fields.next() {
        Some("kB") | None => Some(value * 1024),
        Some(_) => None,
    }
}
