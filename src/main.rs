mod aggregator;
mod analyzer;
mod charts;
mod classifier;
mod config;
mod error;
mod export;
mod health;
mod log_reader;
mod types;

use aggregator::StatsTable;
use analyzer::LogAnalyzer;
use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use health::HealthEvaluator;
use log::{info, warn};
use simple_logger::SimpleLogger;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = config::Cli::parse();

    // Load configuration
    let config = config::load_config(&cli)?;

    SimpleLogger::new()
        .with_level(config.log_level)
        .init()
        .map_err(|e| anyhow::anyhow!("Failed to initialise logger: {}", e))?;

    info!("Starting klipper-log-analyzer");

    let mut analyzer = LogAnalyzer::new()?;
    log_reader::parse_log(&config.log_file, &mut analyzer)
        .await
        .with_context(|| format!("Failed to read log file: {}", config.log_file.display()))?;

    if let Some(ref output) = config.extract_stats {
        log_reader::extract_stats(&config.log_file, output, Local::now().naive_local())
            .await
            .with_context(|| format!("Failed to extract stats to {}", output.display()))?;
    }

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("Failed to create output directory: {}", config.output_dir.display()))?;

    let table = StatsTable::new(analyzer.snapshots());

    if !config.report_only {
        let report = aggregator::performance_report(&table);
        export::write_performance_report(&config.output_dir, report.as_ref()).await?;

        export::export_data(
            &config.output_dir,
            &table,
            analyzer.mcus(),
            analyzer.errors(),
            analyzer.config_sections(),
        )
        .await?;

        if config.plots {
            if let Err(e) = charts::create_visualizations(&table, &config.output_dir).await {
                warn!("Could not generate plots: {}", e);
            }
        }
    }

    let evaluator = HealthEvaluator::new(analyzer.mcus(), analyzer.errors(), &table);
    for warning in evaluator.warnings() {
        warn!("Health check: {}", warning);
    }

    let health_report = evaluator.render(Local::now().naive_local());
    println!("\n{}", health_report);

    export::write_health_report(&config.output_dir, &health_report).await?;

    Ok(())
}
