use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::capture::{Captured, StreamCapture};
use super::env::child_environment;
use super::limits::{peak_rss_bytes, ChildLimits};
use super::scratch::ScratchDir;
use crate::config::{HarnessConfig, ResourceCaps};
use crate::errors::{with_retry, ExecutorError, RetryConfig};
use crate::manifest::{resolve_template, TemplateContext};
use crate::models::{CapKind, Example, ExecutionOutcome};
use crate::oracle::signals::signal_name;
use crate::scheduler::ExampleRunner;

const SHELL: &str = "/bin/sh";
const RSS_SAMPLE_INTERVAL: Duration = Duration::from_millis(25);
/// How long stream readers may run on after the process group is gone.
const CAPTURE_GRACE: Duration = Duration::from_millis(500);

/// Kills the whole process group when dropped, so no descendant outlives its execution.
struct ProcessGroup {
    pgid: Option<Pid>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid.map(|p| Pid::from_raw(p as i32)) }
    }

    fn kill(&self) {
        if let Some(pgid) = self.pgid {
            // ESRCH just means everyone is already gone.
            let _ = killpg(pgid, Signal::SIGKILL);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// What supervising one child produced.
struct Observed {
    status: Option<ExitStatus>,
    killed_by: Option<CapKind>,
    stdout: Captured,
    stderr: Captured,
    elapsed: Duration,
    peak_rss: Option<u64>,
    memory_cap: Option<u64>,
    cpu_hard_limit: Option<Duration>,
}

impl Observed {
    /// A cap the child ran into without the harness killing it: the kernel's
    /// SIGKILL at the hard CPU limit, or an allocation failure against the
    /// address-space backstop after RSS had already neared the memory cap.
    fn inferred_cap(&self) -> Option<CapKind> {
        let status = self.status?;
        if let (Some(peak), Some(cap)) = (self.peak_rss, self.memory_cap) {
            if peak > cap || (!status.success() && peak >= cap - cap / 4) {
                return Some(CapKind::Memory);
            }
        }
        let hard = self.cpu_hard_limit?;
        (status.signal() == Some(Signal::SIGKILL as i32) && self.elapsed >= hard)
            .then_some(CapKind::Cpu)
    }
}

struct Supervision<'a> {
    limits: ChildLimits,
    wall: Duration,
    memory_cap: Option<u64>,
    stdin: &'a [u8],
}

/// Builds and runs examples in scratch directories under resource caps.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    caps: ResourceCaps,
    scratch_root: PathBuf,
    env_whitelist: Vec<String>,
    retry: RetryConfig,
}

impl SandboxExecutor {
    pub fn new(caps: ResourceCaps, scratch_root: PathBuf, env_whitelist: Vec<String>) -> Self {
        Self { caps, scratch_root, env_whitelist, retry: RetryConfig::default() }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            config.caps.clone(),
            config.scratch_root.clone(),
            config.env_whitelist.clone(),
        )
    }

    /// Execute one example. The scratch directory is released on every path.
    pub async fn execute(
        &self,
        example: &Example,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let scratch = ScratchDir::create(&self.scratch_root).await?;
        let result = self.execute_in(example, &scratch, cancel).await;
        if let Err(e) = scratch.close().await {
            warn!(example = %example.id, error = %e, "Failed to remove scratch directory");
        }
        result
    }

    async fn execute_in(
        &self,
        example: &Example,
        scratch: &ScratchDir,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let workdir = scratch.path();
        self.materialise(example, workdir).await?;

        let source = example.source_name.to_string_lossy();
        let workdir_text = workdir.to_string_lossy();
        let context = TemplateContext {
            source: &source,
            artifact: &example.artifact,
            id: &example.id,
            cwe: &example.cwe,
            workdir: &workdir_text,
        };
        let env = child_environment(
            &self.env_whitelist,
            workdir,
            &example.run.env,
            |name| std::env::var(name).ok(),
        );

        let build_command = resolve_template(&example.build.command, &context);
        debug!(example = %example.id, command = %build_command, "Building");
        let mut build = Command::new(SHELL);
        build.arg("-c").arg(&build_command);
        let build = self
            .supervise(
                build,
                workdir,
                &env,
                Supervision {
                    limits: ChildLimits::for_build(),
                    wall: self.caps.build_wall,
                    memory_cap: None,
                    stdin: &[],
                },
                cancel,
            )
            .await?;
        let build_elapsed_ms = build.elapsed.as_millis() as u64;
        let build_ok = build.killed_by.is_none() && build.status.map_or(false, |s| s.success());
        if !build_ok {
            info!(example = %example.id, elapsed_ms = build_elapsed_ms, "Build failed");
            let mut outcome = to_outcome(build);
            outcome.build_failed = true;
            outcome.build_elapsed_ms = outcome.elapsed_ms;
            outcome.elapsed_ms = 0;
            return Ok(outcome);
        }

        let argv: Vec<String> = example
            .run
            .argv
            .iter()
            .map(|arg| resolve_template(arg, &context))
            .collect();
        let Some((program, args)) = argv.split_first() else {
            return Err(ExecutorError::Spawn {
                program: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"),
            });
        };
        let program_path = resolve_program(program, &example.artifact, workdir);
        let mut run = Command::new(&program_path);
        run.args(args);

        let wall = example.wall_cap.unwrap_or(self.caps.wall);
        debug!(example = %example.id, program = %program_path.display(), wall_ms = wall.as_millis() as u64, "Running");
        let observed = self
            .supervise(
                run,
                workdir,
                &env,
                Supervision {
                    limits: ChildLimits::for_run(&self.caps),
                    wall,
                    memory_cap: Some(self.caps.memory_bytes),
                    stdin: &example.run.stdin,
                },
                cancel,
            )
            .await;

        let observed = match observed {
            Ok(observed) => observed,
            // The build "succeeded" without producing what the run step launches.
            Err(ExecutorError::Spawn { source, .. })
                if program_path.starts_with(workdir)
                    && matches!(
                        source.kind(),
                        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
                    ) =>
            {
                info!(example = %example.id, program = %program, "Artifact missing after build");
                let mut stderr = build.stderr.bytes;
                stderr.extend_from_slice(
                    format!("cwe-harness: cannot execute `{}`: {}\n", program, source).as_bytes(),
                );
                return Ok(ExecutionOutcome {
                    exit_status: None,
                    stdout: build.stdout.bytes,
                    stderr,
                    build_elapsed_ms,
                    build_failed: true,
                    ..Default::default()
                });
            }
            Err(e) => return Err(e),
        };

        let mut outcome = to_outcome(observed);
        outcome.build_elapsed_ms = build_elapsed_ms;
        info!(
            example = %example.id,
            exit_status = ?outcome.exit_status,
            signal = ?outcome.signal,
            cap = ?outcome.cap_hit,
            elapsed_ms = outcome.elapsed_ms,
            "Execution finished"
        );
        Ok(outcome)
    }

    /// Copy the source and declared build inputs into the scratch directory,
    /// keeping their layout relative to the example directory.
    async fn materialise(&self, example: &Example, workdir: &Path) -> Result<(), ExecutorError> {
        let files = std::iter::once(&example.source_name).chain(example.build.inputs.iter());
        for rel in files {
            let from = example.example_dir.join(rel);
            let to = workdir.join(rel);
            let fail = |source| ExecutorError::Materialise { path: from.clone(), source };
            if let Some(parent) = to.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(fail)?;
            }
            tokio::fs::copy(&from, &to).await.map_err(fail)?;
        }
        Ok(())
    }

    async fn supervise(
        &self,
        mut command: Command,
        workdir: &Path,
        env: &std::collections::BTreeMap<String, String>,
        spec: Supervision<'_>,
        cancel: &CancellationToken,
    ) -> Result<Observed, ExecutorError> {
        let limits = spec.limits;
        command
            .current_dir(workdir)
            .env_clear()
            .envs(env)
            .stdin(if spec.stdin.is_empty() { Stdio::null() } else { Stdio::piped() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        // SAFETY: the hook runs between fork and exec and only issues setrlimit syscalls.
        unsafe {
            command.pre_exec(move || limits.apply());
        }

        let program = format!("{:?}", command.as_std().get_program());
        let mut child = with_retry("spawn", &self.retry, || {
            let spawned = command.spawn().map_err(|source| ExecutorError::Spawn {
                program: program.clone(),
                source,
            });
            async move { spawned }
        })
        .await?;

        let pid = child.id();
        let group = ProcessGroup::new(pid);
        let started = Instant::now();

        let stdout = StreamCapture::spawn(child.stdout.take(), self.caps.capture_bytes);
        let stderr = StreamCapture::spawn(child.stderr.take(), self.caps.capture_bytes);
        if let Some(mut pipe) = child.stdin.take() {
            let bytes = spec.stdin.to_vec();
            tokio::spawn(async move {
                // The child may exit without reading; a broken pipe is expected then.
                let _ = pipe.write_all(&bytes).await;
                let _ = pipe.shutdown().await;
            });
        }

        let deadline = tokio::time::sleep(spec.wall);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval(RSS_SAMPLE_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut peak_rss: Option<u64> = None;

        let (status, killed_by) = loop {
            tokio::select! {
                status = child.wait() => {
                    break (Some(status.map_err(ExecutorError::Supervise)?), None);
                }
                _ = &mut deadline => {
                    group.kill();
                    let _ = child.wait().await;
                    break (None, Some(CapKind::Wall));
                }
                _ = cancel.cancelled() => {
                    group.kill();
                    let _ = child.wait().await;
                    stdout.abort();
                    stderr.abort();
                    debug!(pid = ?pid, "Child torn down on cancellation");
                    return Err(ExecutorError::Cancelled);
                }
                _ = ticker.tick(), if spec.memory_cap.is_some() && pid.is_some() => {
                    let sample = pid.and_then(peak_rss_bytes);
                    if let Some(rss) = sample {
                        peak_rss = Some(peak_rss.map_or(rss, |p| p.max(rss)));
                    }
                    if let (Some(rss), Some(cap)) = (sample, spec.memory_cap) {
                        if rss > cap {
                            group.kill();
                            let _ = child.wait().await;
                            break (None, Some(CapKind::Memory));
                        }
                    }
                }
            }
        };
        let elapsed = started.elapsed();

        // Descendants may still hold the pipes open.
        group.kill();
        let stdout = stdout.finish(CAPTURE_GRACE).await;
        let stderr = stderr.finish(CAPTURE_GRACE).await;

        Ok(Observed {
            status,
            killed_by,
            stdout,
            stderr,
            elapsed,
            peak_rss,
            memory_cap: spec.memory_cap,
            cpu_hard_limit: limits.cpu_hard_limit(),
        })
    }
}

#[async_trait]
impl ExampleRunner for SandboxExecutor {
    async fn run(
        &self,
        example: Arc<Example>,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        self.execute(&example, &cancel).await
    }
}

/// argv[0] naming the artifact or a file in the scratch directory runs that file;
/// other bare names go through PATH.
fn resolve_program(program: &str, artifact: &str, workdir: &Path) -> PathBuf {
    let path = Path::new(program);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    if program == artifact || program.contains('/') || workdir.join(path).exists() {
        return workdir.join(path);
    }
    path.to_path_buf()
}

fn to_outcome(observed: Observed) -> ExecutionOutcome {
    let cap_hit = observed.killed_by.or_else(|| observed.inferred_cap());
    let mut outcome = ExecutionOutcome {
        stdout: observed.stdout.bytes,
        stderr: observed.stderr.bytes,
        output_truncated: observed.stdout.truncated || observed.stderr.truncated,
        elapsed_ms: observed.elapsed.as_millis() as u64,
        peak_rss_bytes: observed.peak_rss,
        ..Default::default()
    };

    if let Some(cap) = cap_hit {
        outcome.cap_hit = Some(cap);
        return outcome;
    }
    let Some(status) = observed.status else {
        return outcome;
    };
    match (status.code(), status.signal()) {
        (Some(code), _) => outcome.exit_status = Some(code),
        (None, Some(sig)) if sig == Signal::SIGXCPU as i32 => outcome.cap_hit = Some(CapKind::Cpu),
        (None, Some(sig)) => outcome.signal = Some(signal_name(sig)),
        (None, None) => {}
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuildRecipe, Intent, RunRecipe};
    use crate::oracle::{Clause, Oracle};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    struct Fixture {
        corpus: TempDir,
        scratch: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self { corpus: TempDir::new().unwrap(), scratch: TempDir::new().unwrap() }
        }

        fn example(&self, script: &str, build: &str) -> Example {
            let dir = self.corpus.path().join("ex");
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("main.sh"), script).unwrap();
            Example {
                id: "ex".into(),
                cwe: "CWE-000".into(),
                intent: Intent::IntendedVulnerable,
                source: PathBuf::from("ex/main.sh"),
                example_dir: dir,
                source_name: PathBuf::from("main.sh"),
                artifact: "main".into(),
                build: BuildRecipe { command: build.into(), inputs: vec![] },
                run: RunRecipe { argv: vec!["{artifact}".into()], stdin: vec![], env: BTreeMap::new() },
                oracle: Oracle::Single(Clause::BuildFailed),
                tags: vec![],
                wall_cap: None,
                line: None,
            }
        }

        fn executor(&self, caps: ResourceCaps) -> SandboxExecutor {
            SandboxExecutor::new(caps, self.scratch.path().to_path_buf(), vec!["PATH".into()])
        }

        fn scratch_is_empty(&self) -> bool {
            std::fs::read_dir(self.scratch.path()).unwrap().next().is_none()
        }
    }

    const BUILD: &str = "cp {source} {artifact} && chmod +x {artifact}";

    #[tokio::test]
    async fn test_exit_status_and_stdout() {
        let fx = Fixture::new();
        let ex = fx.example("#!/bin/sh\necho OK\nexit 3\n", BUILD);
        let outcome = fx.executor(ResourceCaps::default()).execute(&ex, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.exit_status, Some(3));
        assert_eq!(outcome.stdout, b"OK\n");
        assert!(outcome.signal.is_none());
        assert!(!outcome.build_failed);
        assert!(fx.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_signal_recorded() {
        let fx = Fixture::new();
        let ex = fx.example("#!/bin/sh\nkill -SEGV $$\n", BUILD);
        let outcome = fx.executor(ResourceCaps::default()).execute(&ex, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.signal.as_deref(), Some("SIGSEGV"));
        assert_eq!(outcome.exit_status, None);
    }

    #[tokio::test]
    async fn test_wall_cap() {
        let fx = Fixture::new();
        let mut ex = fx.example("#!/bin/sh\nsleep 30\n", BUILD);
        ex.wall_cap = Some(Duration::from_millis(300));
        let started = Instant::now();
        let outcome = fx.executor(ResourceCaps::default()).execute(&ex, &CancellationToken::new()).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.cap_hit, Some(CapKind::Wall));
        assert_eq!(outcome.exit_status, None);
        assert_eq!(outcome.signal, None);
        assert!(fx.scratch_is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_memory_cap_reported_as_cap() {
        let fx = Fixture::new();
        let ex = fx.example(
            "#!/bin/sh\nbig=$(head -c 100000000 /dev/zero | tr '\\0' a)\necho ${#big}\n",
            BUILD,
        );
        let caps = ResourceCaps { memory_bytes: 16 * 1024 * 1024, ..Default::default() };
        let outcome = fx.executor(caps).execute(&ex, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.cap_hit, Some(CapKind::Memory));
        assert_eq!(outcome.exit_status, None);
        assert_eq!(outcome.signal, None);
        assert!(outcome.peak_rss_bytes.is_some());
        assert!(fx.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_output_truncated() {
        let fx = Fixture::new();
        let ex = fx.example("#!/bin/sh\nhead -c 100000 /dev/zero\n", BUILD);
        let caps = ResourceCaps { capture_bytes: 1000, ..Default::default() };
        let outcome = fx.executor(caps).execute(&ex, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.stdout.len(), 1000);
        assert!(outcome.output_truncated);
        assert_eq!(outcome.exit_status, Some(0));
    }

    #[tokio::test]
    async fn test_build_failure() {
        let fx = Fixture::new();
        let ex = fx.example("#!/bin/sh\n", "echo 'syntax error' >&2; exit 1");
        let outcome = fx.executor(ResourceCaps::default()).execute(&ex, &CancellationToken::new()).await.unwrap();
        assert!(outcome.build_failed);
        assert_eq!(outcome.exit_status, Some(1));
        assert_eq!(outcome.stderr, b"syntax error\n");
    }

    #[tokio::test]
    async fn test_missing_artifact_is_build_failure() {
        let fx = Fixture::new();
        let ex = fx.example("#!/bin/sh\n", "true");
        let outcome = fx.executor(ResourceCaps::default()).execute(&ex, &CancellationToken::new()).await.unwrap();
        assert!(outcome.build_failed);
        assert!(String::from_utf8_lossy(&outcome.stderr).contains("cannot execute"));
    }

    #[tokio::test]
    async fn test_stdin_and_environment() {
        let fx = Fixture::new();
        let mut ex = fx.example("#!/bin/sh\ncat\necho \"$GREETING:$HOME\"\n", BUILD);
        ex.run.stdin = b"from-stdin\n".to_vec();
        ex.run.env.insert("GREETING".into(), "hi".into());
        let outcome = fx.executor(ResourceCaps::default()).execute(&ex, &CancellationToken::new()).await.unwrap();
        let text = String::from_utf8(outcome.stdout).unwrap();
        assert!(text.starts_with("from-stdin\nhi:"));
        assert!(text.contains("cwe-harness-"));
    }

    #[tokio::test]
    async fn test_cancellation_tears_down() {
        let fx = Fixture::new();
        let ex = fx.example("#!/bin/sh\nsleep 30\n", BUILD);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });
        let started = Instant::now();
        let err = fx.executor(ResourceCaps::default()).execute(&ex, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(fx.scratch_is_empty());
    }

    #[test]
    fn test_resolve_program() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("demo"), b"").unwrap();
        assert_eq!(resolve_program("demo", "x", dir.path()), dir.path().join("demo"));
        assert_eq!(resolve_program("sub/demo", "x", dir.path()), dir.path().join("sub/demo"));
        assert_eq!(resolve_program("x", "x", dir.path()), dir.path().join("x"));
        assert_eq!(resolve_program("/bin/true", "x", dir.path()), PathBuf::from("/bin/true"));
        assert_eq!(resolve_program("env", "x", dir.path()), PathBuf::from("env"));
    }

    #[test]
    fn test_to_outcome_cap_wins() {
        let observed = Observed {
            status: None,
            killed_by: Some(CapKind::Memory),
            stdout: Captured::default(),
            stderr: Captured { bytes: vec![1], truncated: true },
            elapsed: Duration::from_millis(42),
            peak_rss: Some(10),
            memory_cap: Some(1 << 20),
            cpu_hard_limit: None,
        };
        let outcome = to_outcome(observed);
        assert_eq!(outcome.cap_hit, Some(CapKind::Memory));
        assert!(outcome.output_truncated);
        assert_eq!(outcome.elapsed_ms, 42);
        assert_eq!(outcome.exit_status, None);
    }

    fn exited_with(raw: i32, elapsed: Duration, peak_rss: Option<u64>) -> Observed {
        Observed {
            status: Some(ExitStatus::from_raw(raw)),
            killed_by: None,
            stdout: Captured::default(),
            stderr: Captured::default(),
            elapsed,
            peak_rss,
            memory_cap: Some(64 << 20),
            cpu_hard_limit: Some(Duration::from_secs(2)),
        }
    }

    #[test]
    fn test_kernel_sigkill_at_cpu_hard_limit_is_cpu_cap() {
        let outcome = to_outcome(exited_with(Signal::SIGKILL as i32, Duration::from_millis(2300), None));
        assert_eq!(outcome.cap_hit, Some(CapKind::Cpu));
        assert_eq!(outcome.signal, None);

        let quick = to_outcome(exited_with(Signal::SIGKILL as i32, Duration::from_millis(50), None));
        assert_eq!(quick.cap_hit, None);
        assert_eq!(quick.signal.as_deref(), Some("SIGKILL"));
    }

    #[test]
    fn test_death_near_memory_cap_is_memory_cap() {
        let near = Some(60 << 20);
        let crashed = to_outcome(exited_with(Signal::SIGSEGV as i32, Duration::from_millis(80), near));
        assert_eq!(crashed.cap_hit, Some(CapKind::Memory));
        assert_eq!(crashed.signal, None);
        assert_eq!(crashed.exit_status, None);

        let failed = to_outcome(exited_with(2 << 8, Duration::from_millis(80), near));
        assert_eq!(failed.cap_hit, Some(CapKind::Memory));
        assert_eq!(failed.exit_status, None);

        let clean = to_outcome(exited_with(0, Duration::from_millis(80), near));
        assert_eq!(clean.cap_hit, None);
        assert_eq!(clean.exit_status, Some(0));

        let small = to_outcome(exited_with(Signal::SIGSEGV as i32, Duration::from_millis(80), Some(1 << 20)));
        assert_eq!(small.cap_hit, None);
        assert_eq!(small.signal.as_deref(), Some("SIGSEGV"));
    }
}
