use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::document::Report;
use crate::config::OutputTarget;
use crate::errors::HarnessError;

/// Pretty JSON with a trailing newline.
pub fn render(report: &Report) -> Result<String, HarnessError> {
    let mut text = serde_json::to_string_pretty(report)?;
    text.push('\n');
    Ok(text)
}

pub async fn emit(report: &Report, target: &OutputTarget) -> Result<(), HarnessError> {
    let text = render(report)?;
    match target {
        OutputTarget::Stdout => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(text.as_bytes()).await?;
            stdout.flush().await?;
        }
        OutputTarget::File(path) => {
            atomic_write(path, text.as_bytes()).await?;
            info!(path = %path.display(), verdicts = report.verdicts.len(), "Report written");
        }
    }
    Ok(())
}

/// Write to a sibling temp file, then rename over the destination so readers
/// never observe a partial report.
pub async fn atomic_write(path: &Path, content: &[u8]) -> Result<(), HarnessError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| HarnessError::Report(format!("not a file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        uuid::Uuid::new_v4().simple()
    ));
    if let Err(e) = tokio::fs::write(&tmp, content).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(HarnessError::Report(format!("cannot write {}: {}", tmp.display(), e)));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(HarnessError::Report(format!("cannot replace {}: {}", path.display(), e)));
    }
    Ok(())
}
