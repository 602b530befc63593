//! Offline lab report tool.
//!
//! Works on an existing cache directory only; nothing is fetched.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use labscope::application::lab_analyzer::{AnalysisContext, LabAnalyzer, summarize_cached};
use labscope::application::parameter_planner::ParameterPlanner;
use labscope::application::reporting::LabReporter;
use labscope::application::timing::PassStats;
use labscope::config::{Config, load_range_config};
use labscope::domain::optimization::parameter::RawLabParameter;
use labscope::infrastructure::{BacktestCache, OfflineLabDataSource};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Backtest lab analytics over a local cache", long_about = None)]
struct Cli {
    /// Cache base directory (overrides LABSCOPE_CACHE_DIR)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank a lab's cached backtests
    Summary {
        #[arg(short, long)]
        lab: String,

        /// Number of top results to display
        #[arg(short, long, default_value = "10")]
        top_n: usize,

        /// Optional JSON output file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Robustness scores for a lab's cached backtests
    Score {
        #[arg(short, long)]
        lab: String,

        #[arg(short, long)]
        output: Option<String>,
    },
    /// Re-run metric extraction over cached raw records
    Reanalyze {
        #[arg(short, long)]
        lab: String,
    },
    /// Search-range plans for a parameter list (JSON array)
    Plan {
        #[arg(short, long)]
        params: PathBuf,

        /// TOML file with range settings
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(dir) = cli.cache_dir {
        config.cache.cache_dir = dir;
    }
    info!(
        "labscope {} using cache {:?}",
        env!("CARGO_PKG_VERSION"),
        config.cache.cache_dir
    );

    let reporter = LabReporter::default();

    match cli.command {
        Commands::Summary { lab, top_n, output } => {
            let cache = BacktestCache::open(&config.cache.cache_dir)
                .context("Failed to open backtest cache")?;
            let result =
                summarize_cached(&cache, &lab, top_n, config.analysis.roi_divergence_pct)?;
            reporter.print_lab_summary(&result);
            PassStats::from_result(&result).print_summary();
            if let Some(file) = output {
                reporter.export_json(&result, &file)?;
            }
        }
        Commands::Score { lab, output } => {
            let analyzer = offline_analyzer(&config)?;
            let metrics = analyzer.score_lab(&lab)?;
            reporter.print_robustness_table(&metrics);
            if let Some(file) = output {
                reporter.export_json(&metrics, &file)?;
            }
        }
        Commands::Reanalyze { lab } => {
            let analyzer = offline_analyzer(&config)?;
            let refreshed = analyzer.reanalyze_cached(&lab)?;
            println!("Re-analyzed {} cached backtests for {}", refreshed.len(), lab);
        }
        Commands::Plan {
            params,
            config: range_file,
            output,
        } => {
            let ranges = match range_file {
                Some(path) => load_range_config(&path)?,
                None => config.ranges.clone(),
            };
            let content = std::fs::read_to_string(&params)
                .context(format!("Failed to read parameters: {}", params.display()))?;
            let raw: Vec<RawLabParameter> = serde_json::from_str(&content)
                .context(format!("Failed to parse parameters: {}", params.display()))?;

            let planner = ParameterPlanner::new(Arc::new(OfflineLabDataSource), ranges);
            let plans = planner.plan_raw(&raw);
            reporter.print_plans(&plans);
            if let Some(file) = output {
                reporter.export_json(&plans, &file)?;
            }
        }
    }

    Ok(())
}

/// An analyzer over the local cache that never fetches.
fn offline_analyzer(config: &Config) -> Result<LabAnalyzer> {
    let ctx = AnalysisContext::from_config(Arc::new(OfflineLabDataSource), config)?;
    Ok(LabAnalyzer::new(ctx))
}
