use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[clap(name = "klipper-log-analyzer", version, about = "Analyze Klipper log files and provide insights")]
pub struct Cli {
    /// Path to the Klipper log file
    pub log_file: PathBuf,

    /// Output directory for reports and visualizations
    #[clap(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Extract stats lines to specified file
    #[clap(long)]
    pub extract_stats: Option<PathBuf>,

    /// Skip generating plots
    #[clap(long)]
    pub no_plots: bool,

    /// Generate only text report
    #[clap(long)]
    pub report_only: bool,

    /// Optional TOML file with defaults for the options above
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Log verbosity (error, warn, info, debug, trace)
    #[clap(long)]
    pub log_level: Option<String>,
}

/// Settings that may live in the optional config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    output_dir: Option<PathBuf>,
    extract_stats: Option<PathBuf>,
    plots: Option<bool>,
    report_only: Option<bool>,
    log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_file: PathBuf,
    pub output_dir: PathBuf,
    pub extract_stats: Option<PathBuf>,
    pub plots: bool,
    pub report_only: bool,
    pub log_level: LevelFilter,
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    let file_config = match cli.config {
        Some(ref path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str::<FileConfig>(&content).context("Failed to parse config file")?
        }
        None => FileConfig::default(),
    };

    resolve(cli, file_config)
}

// CLI flags override the file, the file overrides built-in defaults.
fn resolve(cli: &Cli, file: FileConfig) -> Result<Config> {
    let log_level = cli
        .log_level
        .clone()
        .or(file.log_level)
        .unwrap_or_else(|| "info".to_string());
    let log_level = LevelFilter::from_str(&log_level)
        .map_err(|_| anyhow::anyhow!("Invalid log level: {}", log_level))?;

    Ok(Config {
        log_file: cli.log_file.clone(),
        output_dir: cli
            .output_dir
            .clone()
            .or(file.output_dir)
            .unwrap_or_else(|| PathBuf::from(".")),
        extract_stats: cli.extract_stats.clone().or(file.extract_stats),
        plots: !cli.no_plots && file.plots.unwrap_or(true),
        report_only: cli.report_only || file.report_only.unwrap_or(false),
        log_level,
    })
}
