use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use alm_steps::expander::{FileResolver, StepExpander, TestCase, TestCaseSource};
use alm_steps::report;
use alm_steps::utils::config::Config;

#[derive(Parser)]
#[command(name = "alm-steps")]
#[command(version = "0.1.0")]
#[command(about = "Shared-step codec between ALM step markup and flat test steps", long_about = None)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand step markup into flat steps
    Expand {
        /// Markup file, or a JSON list of test cases ({id, title, markup})
        path: PathBuf,

        /// Shared-step fixture (JSON or YAML) keyed by group id
        #[arg(short, long)]
        groups: Option<PathBuf>,

        /// Output file for the expanded test cases (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Project executed steps into result rows
    Project {
        /// Path to executed steps JSON ({testCaseId, steps})
        results: PathBuf,

        /// Output format (json, yaml)
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Expand {
            path,
            groups,
            output,
        } => {
            eprintln!(
                "{} Expanding steps from: {}",
                "▶".green().bold(),
                path.display()
            );

            let resolver = match &groups {
                Some(fixture) => {
                    let resolver = FileResolver::load(fixture)?;
                    eprintln!("  Shared steps: {}", resolver.len().to_string().cyan());
                    resolver
                }
                None => FileResolver::new(Default::default()),
            };
            eprintln!(
                "  Parallel fetches: {}",
                config.max_parallel_fetches.to_string().cyan()
            );

            let sources = load_sources(&path).await?;
            let expander = StepExpander::new(Arc::new(resolver), config);

            let results = tokio::select! {
                results = expander.pull_batch(&sources) => results,
                _ = tokio::signal::ctrl_c() => {
                    anyhow::bail!("Expansion cancelled");
                }
            };

            let mut cases: Vec<TestCase> = Vec::new();
            for (source, result) in sources.iter().zip(results) {
                match result {
                    Ok(case) => {
                        let mark = if case.is_valid() {
                            "✓".green()
                        } else {
                            "!".yellow()
                        };
                        eprintln!("  {} {} ({} steps)", mark, case.id, case.steps.len());
                        cases.push(case);
                    }
                    Err(e) => eprintln!("  {} {}: {}", "✗".red(), source.id, e),
                }
            }

            let json = serde_json::to_string_pretty(&cases)?;
            match output {
                Some(out) => {
                    tokio::fs::write(&out, json).await?;
                    eprintln!("Steps saved to: {}", out.display());
                }
                None => println!("{}", json),
            }
        }

        Commands::Project {
            results,
            format,
            output,
        } => {
            eprintln!(
                "{} Projecting {} results from: {}",
                "📊".to_string().blue(),
                format.cyan(),
                results.display()
            );
            report::generate_report(&results, &format, output.as_deref()).await?;
        }
    }

    Ok(())
}

/// Read test cases: a JSON list, or a single markup file named after its id
async fn load_sources(path: &Path) -> anyhow::Result<Vec<TestCaseSource>> {
    let content = tokio::fs::read_to_string(path).await?;

    if path.extension().map_or(false, |ext| ext == "json") {
        return Ok(serde_json::from_str(&content)?);
    }

    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(vec![TestCaseSource {
        title: id.clone(),
        id,
        markup: content,
    }])
}
