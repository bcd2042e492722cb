use tracing::info;

use crate::cli::commands::ValidateArgs;
use crate::config::HarnessConfig;
use crate::errors::HarnessError;
use crate::pipeline::validate_manifest;

pub async fn handle_validate(args: ValidateArgs) -> Result<i32, HarnessError> {
    let config = HarnessConfig::new(&args.manifest);
    let index = validate_manifest(&config).await?;
    info!(manifest = %index.meta().id, examples = index.len(), "Manifest is valid");
    println!(
        "Manifest is valid: {} ({} examples, {} CWEs)",
        args.manifest.display(),
        index.len(),
        index.cwes().count()
    );
    Ok(0)
}
