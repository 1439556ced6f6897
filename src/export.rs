use crate::aggregator::{PerformanceReport, StatsTable};
use crate::error::{AnalyzerError, Result};
use crate::types::{ConfigSection, ErrorEntry, McuDescriptor};
use log::info;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;

pub const PERFORMANCE_REPORT_FILE: &str = "performance_report.json";
pub const STATS_CSV_FILE: &str = "klipper_stats_data.csv";
pub const MCU_CONFIGS_FILE: &str = "klipper_mcu_configs.json";
pub const ERRORS_FILE: &str = "klipper_errors.json";
pub const CONFIG_SECTIONS_FILE: &str = "klipper_config_sections.json";
pub const HEALTH_REPORT_FILE: &str = "health_report.txt";

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, body).await?;
    Ok(())
}

pub async fn write_performance_report(output_dir: &Path, report: Option<&PerformanceReport>) -> Result<()> {
    let path = output_dir.join(PERFORMANCE_REPORT_FILE);
    match report {
        Some(report) => write_json(&path, report).await?,
        None => write_json(&path, &json!({ "error": "No statistics data found in log" })).await?,
    }
    info!("Performance report saved to {}", path.display());
    Ok(())
}

/// Sparse table as CSV: `timestamp,line_number` then every metric column.
pub fn stats_csv(table: &StatsTable<'_>) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["timestamp", "line_number"];
    header.extend(table.columns().iter().copied());
    writer.write_record(&header)?;

    for row in table.rows() {
        let mut record = vec![row.timestamp.to_string(), row.line_number.to_string()];
        record.extend(
            table
                .columns()
                .iter()
                .map(|column| row.get(column).map(ToString::to_string).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| AnalyzerError::Io(std::io::Error::new(e.error().kind(), e.error().to_string())))
}

pub async fn export_data(
    output_dir: &Path,
    table: &StatsTable<'_>,
    mcus: &[McuDescriptor],
    errors: &[ErrorEntry],
    config_sections: &[ConfigSection],
) -> Result<()> {
    if !table.is_empty() {
        let path = output_dir.join(STATS_CSV_FILE);
        tokio::fs::write(&path, stats_csv(table)?).await?;
        info!("Stats data exported to {}", path.display());
    }

    let by_name: BTreeMap<&str, &McuDescriptor> = mcus.iter().map(|mcu| (mcu.name.as_str(), mcu)).collect();
    let path = output_dir.join(MCU_CONFIGS_FILE);
    write_json(&path, &by_name).await?;
    info!("MCU configs exported to {}", path.display());

    let path = output_dir.join(ERRORS_FILE);
    write_json(&path, errors).await?;
    info!("Errors exported to {}", path.display());

    let sections: BTreeMap<&str, &ConfigSection> = config_sections
        .iter()
        .map(|section| (section.name.as_str(), section))
        .collect();
    let path = output_dir.join(CONFIG_SECTIONS_FILE);
    write_json(&path, &sections).await?;
    info!("Config sections exported to {}", path.display());

    Ok(())
}

pub async fn write_health_report(output_dir: &Path, report: &str) -> Result<()> {
    let path = output_dir.join(HEALTH_REPORT_FILE);
    tokio::fs::write(&path, report).await?;
    info!("Health report saved to {}", path.display());
    Ok(())
}
