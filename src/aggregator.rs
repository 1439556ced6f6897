use crate::types::{StatValue, StatsSnapshot};
use serde::Serialize;
use std::collections::BTreeMap;

pub const PERFORMANCE_METRICS: [&str; 4] = ["freq", "sysload", "cputime", "memavail"];
pub const MCU_PREFIXES: [&str; 2] = ["mcu", "EBBCan"];
pub const TEMPERATURE_SUFFIX: &str = "_temp";

/// Column view over the sparse snapshot stream.
///
/// Rows stay in arrival order; columns are the union of every metric key in
/// first-seen order. A missing cell is simply absent, never zero.
pub struct StatsTable<'a> {
    snapshots: &'a [StatsSnapshot],
    columns: Vec<&'a str>,
}

impl<'a> StatsTable<'a> {
    pub fn new(snapshots: &'a [StatsSnapshot]) -> Self {
        let mut columns: Vec<&'a str> = Vec::new();
        for snapshot in snapshots {
            for key in snapshot.keys() {
                if !columns.contains(&key) {
                    columns.push(key);
                }
            }
        }
        Self { snapshots, columns }
    }

    pub fn rows(&self) -> &'a [StatsSnapshot] {
        self.snapshots
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn columns(&self) -> &[&'a str] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }

    /// Numeric cells of `column` in arrival order; text cells are skipped.
    pub fn numeric(&self, column: &str) -> Vec<f64> {
        self.snapshots.iter().filter_map(|s| s.number(column)).collect()
    }

    /// `(timestamp, value)` pairs of the numeric cells of `column`.
    pub fn series(&self, column: &str) -> Vec<(f64, f64)> {
        self.snapshots
            .iter()
            .filter_map(|s| s.number(column).map(|value| (s.timestamp, value)))
            .collect()
    }

    /// True when the column has cells and none of them is text.
    pub fn is_numeric_column(&self, column: &str) -> bool {
        let mut cells = self.snapshots.iter().filter_map(|s| s.get(column)).peekable();
        cells.peek().is_some() && cells.all(|cell| matches!(cell, StatValue::Number(_)))
    }

    pub fn temperature_columns(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.columns
            .iter()
            .copied()
            .filter(|column| column.ends_with(TEMPERATURE_SUFFIX))
    }

    pub fn runtime(&self) -> f64 {
        if self.snapshots.len() < 2 {
            return 0.0;
        }
        let (min, max) = self
            .snapshots
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), s| {
                (min.min(s.timestamp), max.max(s.timestamp))
            });
        max - min
    }

    pub fn stats_frequency(&self) -> f64 {
        let runtime = self.runtime();
        if self.snapshots.len() < 2 || runtime <= 0.0 {
            return 0.0;
        }
        self.snapshots.len() as f64 / runtime
    }

    /// `max - min` of a monotonically growing counter column.
    pub fn counter_delta(&self, column: &str) -> Option<f64> {
        Summary::of(&self.numeric(column)).map(|summary| summary.max - summary.min)
    }

    /// Ordered values of the core performance metrics present in the log.
    pub fn performance_series(&self) -> Vec<(&'static str, Vec<(f64, f64)>)> {
        PERFORMANCE_METRICS
            .iter()
            .map(|metric| (*metric, self.series(metric)))
            .filter(|(_, series)| !series.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
}

impl Summary {
    /// Sample standard deviation; a single value has a deviation of zero.
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len() as f64;
        let mean = values.iter().sum::<f64>() / count;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let std = if values.len() > 1 {
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1.0);
            variance.sqrt()
        } else {
            0.0
        };
        Some(Self { mean, min, max, std })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl Trend {
    /// Compares only the first and last observation.
    pub fn of(values: &[f64]) -> Self {
        match (values.first(), values.last()) {
            (Some(first), Some(last)) if values.len() > 1 => {
                if last > first {
                    Trend::Increasing
                } else if last < first {
                    Trend::Decreasing
                } else {
                    Trend::Stable
                }
            }
            _ => Trend::Stable,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_runtime: f64,
    pub total_stats_entries: usize,
    pub stats_frequency: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricReport {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemperatureReport {
    pub min_temp: f64,
    pub max_temp: f64,
    pub avg_temp: f64,
    pub temp_stability: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeReport {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub summary: RunSummary,
    pub performance_metrics: BTreeMap<String, MetricReport>,
    pub temperature_analysis: BTreeMap<String, TemperatureReport>,
    pub mcu_analysis: BTreeMap<String, BTreeMap<String, RangeReport>>,
    pub communication_stats: BTreeMap<String, RangeReport>,
}

/// Summarise the snapshot stream; `None` when the log had no stats lines.
pub fn performance_report(table: &StatsTable<'_>) -> Option<PerformanceReport> {
    if table.is_empty() {
        return None;
    }

    let summary = RunSummary {
        total_runtime: table.runtime(),
        total_stats_entries: table.rows().len(),
        stats_frequency: table.stats_frequency(),
    };

    let mut performance_metrics = BTreeMap::new();
    for metric in PERFORMANCE_METRICS {
        let values = table.numeric(metric);
        if let Some(stats) = Summary::of(&values) {
            performance_metrics.insert(
                metric.to_string(),
                MetricReport {
                    mean: stats.mean,
                    min: stats.min,
                    max: stats.max,
                    std: stats.std,
                    trend: Trend::of(&values),
                },
            );
        }
    }

    let mut temperature_analysis = BTreeMap::new();
    for column in table.temperature_columns() {
        if let Some(stats) = Summary::of(&table.numeric(column)) {
            temperature_analysis.insert(
                sensor_name(column).to_string(),
                TemperatureReport {
                    min_temp: stats.min,
                    max_temp: stats.max,
                    avg_temp: stats.mean,
                    temp_stability: stats.std,
                },
            );
        }
    }

    let mut mcu_analysis = BTreeMap::new();
    for prefix in MCU_PREFIXES {
        let key_prefix = format!("{}_", prefix);
        let can_prefix = format!("canstat_{}", prefix);
        let columns: Vec<&str> = table
            .columns()
            .iter()
            .copied()
            .filter(|c| c.starts_with(&key_prefix) || c.starts_with(&can_prefix))
            .collect();
        if columns.is_empty() {
            continue;
        }

        let mut ranges = BTreeMap::new();
        for column in columns {
            if !table.is_numeric_column(column) {
                continue;
            }
            if let Some(stats) = Summary::of(&table.numeric(column)) {
                ranges.insert(
                    column.to_string(),
                    RangeReport {
                        mean: stats.mean,
                        max: stats.max,
                        min: stats.min,
                    },
                );
            }
        }
        mcu_analysis.insert(prefix.to_string(), ranges);
    }

    Some(PerformanceReport {
        summary,
        performance_metrics,
        temperature_analysis,
        mcu_analysis,
        communication_stats: BTreeMap::new(),
    })
}

/// `extruder_temp` -> `extruder`
pub fn sensor_name(column: &str) -> &str {
    column.strip_suffix(TEMPERATURE_SUFFIX).unwrap_or(column)
}
