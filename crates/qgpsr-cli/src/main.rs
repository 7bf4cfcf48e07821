use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};

use qgpsr_abstract::{AnalysisConfig, ConfigOverride};
use qgpsr_analyzer::{AnalysisSummary, compute_statistics, parse_configured};

#[derive(Parser, Debug)]
#[command(author, version, about = "Summarise Queue-GPSR simulation results")]
struct Args {
    /// TOML file with analysis settings; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the .sca/.vec files.
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Glob pattern relative to the results directory. Repeatable.
    #[arg(long = "pattern")]
    patterns: Vec<String>,

    /// Worker threads for parsing and metrics (0 = one per core).
    #[arg(long)]
    workers: Option<usize>,

    /// Confidence level of across-run intervals, e.g. 0.95.
    #[arg(long)]
    confidence: Option<f64>,

    /// Write the summary as JSON.
    #[arg(long)]
    json_out: Option<PathBuf>,

    /// Write the Markdown report to a file instead of stdout.
    #[arg(long)]
    markdown_out: Option<PathBuf>,

    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    #[arg(long, short, default_value_t = false)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.verbose && args.quiet {
        anyhow::bail!("--verbose and --quiet cannot be used together");
    }
    init_logging(args.log_level());
    info!("qgpsr-analyze starting…");

    let config = args.analysis_config()?;
    let handle = parse_configured(&config).context("Failed to load simulation results")?;
    let summary = compute_statistics(&handle, &config);
    if !summary.skipped_files.is_empty() {
        warn!("{} result files were skipped", summary.skipped_files.len());
    }

    if let Some(path) = &args.json_out {
        write_json(path, &summary)?;
    }
    match &args.markdown_out {
        Some(path) => fs::write(path, summary.to_markdown())
            .with_context(|| format!("Failed to write report {}", path.display()))?,
        None if args.json_out.is_none() => print!("{}", summary.to_markdown()),
        None => {}
    }

    Ok(())
}

impl Args {
    fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::WARN
        } else {
            Level::INFO
        }
    }

    fn overrides(&self) -> ConfigOverride {
        ConfigOverride {
            results_dir: self.results_dir.clone(),
            patterns: Some(self.patterns.clone()),
            workers: self.workers,
            confidence_level: self.confidence,
        }
    }

    fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => AnalysisConfig::default(),
        };
        self.overrides().apply_to(&mut config);
        Ok(config)
    }
}

fn init_logging(level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<AnalysisConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AnalysisConfig =
        toml::from_str(&content).context("Failed to parse config file")?;
    Ok(config)
}

fn write_json(path: &Path, summary: &AnalysisSummary) -> Result<()> {
    let data = serde_json::to_vec_pretty(summary).context("Failed to serialize summary")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write summary {}", path.display()))?;
    Ok(())
}
