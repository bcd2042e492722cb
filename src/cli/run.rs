use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::commands::RunArgs;
use crate::config::{EnvOverrides, HarnessConfig, OutputTarget};
use crate::errors::HarnessError;
use crate::index::Filter;
use crate::pipeline::HarnessOrchestrator;
use crate::progress::RunProgress;
use crate::report::render_summary;

/// Merge flags over environment over defaults. Flags always win.
pub fn build_config(args: &RunArgs, env: &EnvOverrides) -> Result<HarnessConfig, HarnessError> {
    let manifest = args
        .manifest
        .clone()
        .ok_or_else(|| HarnessError::Usage("--manifest is required".into()))?;
    let mut config = HarnessConfig::new(manifest);

    if let Some(n) = args.parallelism.or(env.parallelism) {
        config.parallelism = n;
    }
    if let Some(dir) = &env.tmpdir {
        config.scratch_root = dir.clone();
    }
    if let Some(secs) = args.cpu_cap {
        config.caps.cpu = Duration::from_secs(secs);
    }
    if let Some(secs) = args.wall_cap {
        config.caps.wall = Duration::from_secs(secs);
    }
    if let Some(bytes) = args.mem_cap {
        config.caps.memory_bytes = bytes;
    }
    if let Some(secs) = args.build_cap {
        config.caps.build_wall = Duration::from_secs(secs);
    }
    config.filter = Filter::new(args.filter_cwe.iter().cloned(), args.filter_tag.iter().cloned());
    config.strict = args.strict;
    config.artifacts_dir = args.artifacts.clone();
    config.output = match &args.output {
        Some(path) => OutputTarget::File(path.clone()),
        None => OutputTarget::Stdout,
    };
    Ok(config)
}

/// Run the harness and return the process exit code it implies.
pub async fn handle_run(args: RunArgs) -> Result<i32, HarnessError> {
    let env = EnvOverrides::from_env()?;
    let config = build_config(&args, &env)?;
    info!(
        manifest = %config.manifest.display(),
        parallelism = config.parallelism,
        scratch = %config.scratch_root.display(),
        "Starting run"
    );

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        }
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let show_progress = !args.no_progress && console::Term::stderr().is_term();
    let progress_task = tokio::spawn(async move {
        let mut progress = if show_progress { RunProgress::new(0) } else { RunProgress::hidden(0) };
        while let Some(event) = event_rx.recv().await {
            progress.handle_event(&event);
        }
        progress.finish();
    });

    let orchestrator = HarnessOrchestrator::new(config)
        .with_cancel_token(cancel)
        .with_event_channel(event_tx);
    let result = orchestrator.run().await;
    drop(orchestrator);
    let _ = progress_task.await;
    interrupt.abort();

    let outcome = result?;
    eprint!("{}", render_summary(&outcome.report));
    Ok(outcome.exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(manifest: &str) -> RunArgs {
        RunArgs { manifest: Some(PathBuf::from(manifest)), ..Default::default() }
    }

    #[test]
    fn test_defaults_without_flags() {
        let config = build_config(&args("m.yaml"), &EnvOverrides::default()).unwrap();
        assert_eq!(config.manifest, PathBuf::from("m.yaml"));
        assert_eq!(config.caps.wall, Duration::from_secs(10));
        assert_eq!(config.output, OutputTarget::Stdout);
        assert!(config.filter.is_empty());
        assert!(!config.strict);
    }

    #[test]
    fn test_flag_beats_env() {
        let env = EnvOverrides { parallelism: Some(8), tmpdir: Some(PathBuf::from("/scratch")) };
        let mut a = args("m.yaml");
        assert_eq!(build_config(&a, &env).unwrap().parallelism, 8);
        a.parallelism = Some(2);
        let config = build_config(&a, &env).unwrap();
        assert_eq!(config.parallelism, 2);
        assert_eq!(config.scratch_root, PathBuf::from("/scratch"));
    }

    #[test]
    fn test_caps_and_outputs() {
        let mut a = args("m.yaml");
        a.cpu_cap = Some(1);
        a.wall_cap = Some(3);
        a.mem_cap = Some(1 << 20);
        a.build_cap = Some(30);
        a.output = Some(PathBuf::from("out.json"));
        a.artifacts = Some(PathBuf::from("bundles"));
        a.filter_cwe = vec!["cwe-121".into()];
        let config = build_config(&a, &EnvOverrides::default()).unwrap();
        assert_eq!(config.caps.cpu, Duration::from_secs(1));
        assert_eq!(config.caps.wall, Duration::from_secs(3));
        assert_eq!(config.caps.memory_bytes, 1 << 20);
        assert_eq!(config.caps.build_wall, Duration::from_secs(30));
        assert_eq!(config.output, OutputTarget::File(PathBuf::from("out.json")));
        assert_eq!(config.artifacts_dir, Some(PathBuf::from("bundles")));
        assert_eq!(config.filter.cwes, vec!["CWE-121"]);
    }

    #[test]
    fn test_missing_manifest_is_usage_error() {
        let err = build_config(&RunArgs::default(), &EnvOverrides::default()).unwrap_err();
        assert!(matches!(err, HarnessError::Usage(_)));
    }
}
