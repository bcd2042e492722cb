use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::env::parse_parallelism;

#[derive(Parser, Debug)]
#[command(
    name = "cwe-harness",
    version,
    about = "Build, run and classify a corpus of CWE example programs",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a manifest without executing anything
    Validate(ValidateArgs),
    /// Print the corpus index (CWE to example ids) for a selection
    List(ListArgs),
}

fn parallelism_arg(raw: &str) -> Result<usize, String> {
    parse_parallelism(raw.trim())
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Corpus manifest (YAML)
    #[arg(long, required = true)]
    pub manifest: Option<PathBuf>,

    /// Only run examples with this CWE (repeatable)
    #[arg(long = "filter-cwe", value_name = "TAG")]
    pub filter_cwe: Vec<String>,

    /// Only run examples carrying this tag (repeatable)
    #[arg(long = "filter-tag", value_name = "TAG")]
    pub filter_tag: Vec<String>,

    /// Concurrent executions [env: HARNESS_PARALLELISM]
    #[arg(long, value_parser = parallelism_arg)]
    pub parallelism: Option<usize>,

    /// CPU-time cap per example, in seconds
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub cpu_cap: Option<u64>,

    /// Wall-clock cap per example, in seconds
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub wall_cap: Option<u64>,

    /// Address-space cap per example, in bytes
    #[arg(long, value_name = "BYTES", value_parser = clap::value_parser!(u64).range(1..))]
    pub mem_cap: Option<u64>,

    /// Wall-clock cap for each build step, in seconds
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub build_cap: Option<u64>,

    /// Write the report here instead of stdout
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Write per-example stdout/stderr/outcome/trace bundles under this directory
    #[arg(long, value_name = "DIR")]
    pub artifacts: Option<PathBuf>,

    /// Exit non-zero when any example is inconclusive
    #[arg(long)]
    pub strict: bool,

    /// Do not draw progress bars
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Corpus manifest (YAML)
    #[arg(long)]
    pub manifest: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Corpus manifest (YAML)
    #[arg(long)]
    pub manifest: PathBuf,

    /// Only list examples with this CWE (repeatable)
    #[arg(long = "filter-cwe", value_name = "TAG")]
    pub filter_cwe: Vec<String>,

    /// Only list examples carrying this tag (repeatable)
    #[arg(long = "filter-tag", value_name = "TAG")]
    pub filter_tag: Vec<String>,
}
