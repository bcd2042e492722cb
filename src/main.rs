use clap::Parser;
use cwe_harness::cli;
use cwe_harness::errors::classification::EXIT_USAGE_ERROR;

#[tokio::main]
async fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version land here too and are not failures.
            let code = if e.use_stderr() { EXIT_USAGE_ERROR } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    cli::init_logging(cli.verbose, cli.no_color);

    let code = match cli::dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            let classification = e.classify();
            eprintln!("Error: {}", e);
            tracing::debug!(error_type = classification.error_type, "Run aborted");
            classification.exit_code
        }
    };
    std::process::exit(code);
}
