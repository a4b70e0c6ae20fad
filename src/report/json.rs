use super::types::IterationReport;
use anyhow::Result;
use std::path::Path;

/// Write the iteration payload as JSON, to `output` or stdout
pub async fn generate(report: &IterationReport, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;

    if let Some(path) = output {
        tokio::fs::write(path, json).await?;
        log::info!("JSON report saved to: {}", path.display());
    } else {
        println!("{}", json);
    }

    Ok(())
}
