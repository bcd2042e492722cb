pub mod commands;
pub mod list;
pub mod run;
pub mod validate;

pub use commands::{Cli, Commands};

use tracing_subscriber::EnvFilter;

/// Level used when `RUST_LOG` is unset.
pub fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Logs go to stderr; stdout is reserved for the report.
pub fn init_logging(verbose: u8, no_color: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level(verbose)));

    if no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!no_color)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Dispatch to the subcommand, or run the harness when none was given.
pub async fn dispatch(cli: Cli) -> Result<i32, crate::errors::HarnessError> {
    match cli.command {
        Some(Commands::Validate(args)) => validate::handle_validate(args).await,
        Some(Commands::List(args)) => list::handle_list(args).await,
        None => run::handle_run(cli.run).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels() {
        assert_eq!(log_level(0), "warn");
        assert_eq!(log_level(1), "info");
        assert_eq!(log_level(2), "debug");
        assert_eq!(log_level(7), "trace");
    }
}
