use super::types::IterationReport;
use anyhow::Result;
use std::path::Path;

/// Write the iteration payload as YAML, to `output` or stdout
pub async fn generate(report: &IterationReport, output: Option<&Path>) -> Result<()> {
    let yaml = serde_yaml::to_string(report)?;

    if let Some(path) = output {
        tokio::fs::write(path, yaml).await?;
        log::info!("YAML report saved to: {}", path.display());
    } else {
        print!("{}", yaml);
    }

    Ok(())
}
