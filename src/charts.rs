use crate::aggregator::{sensor_name, StatsTable};
use crate::error::{AnalyzerError, Result};
use log::info;
use std::fmt::Write;
use std::path::{Path, PathBuf};

pub const PERFORMANCE_CHART_FILE: &str = "klipper_performance_metrics.svg";
pub const TEMPERATURE_CHART_FILE: &str = "klipper_temperatures.svg";
pub const COMMUNICATION_CHART_FILE: &str = "klipper_mcu_communication.svg";

const PANEL_WIDTH: f64 = 640.0;
const PANEL_HEIGHT: f64 = 320.0;
const MARGIN: f64 = 48.0;
const TITLE_HEIGHT: f64 = 40.0;
const COLORS: [&str; 6] = ["#1f77b4", "#d62728", "#ff7f0e", "#2ca02c", "#9467bd", "#8c564b"];

struct Series {
    label: String,
    points: Vec<(f64, f64)>,
}

struct Panel {
    title: String,
    y_label: String,
    series: Vec<Series>,
}

impl Panel {
    fn new(title: impl Into<String>, y_label: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            y_label: y_label.into(),
            series: Vec::new(),
        }
    }

    fn with_series(mut self, label: impl Into<String>, points: Vec<(f64, f64)>) -> Self {
        if !points.is_empty() {
            self.series.push(Series {
                label: label.into(),
                points,
            });
        }
        self
    }

    fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self
            .series
            .iter()
            .flat_map(|s| s.points.iter())
            .filter(|(x, y)| x.is_finite() && y.is_finite());
        let &(x, y) = points.next()?;
        Some(points.fold((x, x, y, y), |(x0, x1, y0, y1), &(x, y)| {
            (x0.min(x), x1.max(x), y0.min(y), y1.max(y))
        }))
    }

    fn render(&self, out: &mut String, top: f64) -> std::fmt::Result {
        let (x0, x1, y0, y1) = match self.bounds() {
            Some(bounds) => bounds,
            None => return Ok(()),
        };
        let x_span = if x1 > x0 { x1 - x0 } else { 1.0 };
        let y_span = if y1 > y0 { y1 - y0 } else { 1.0 };
        let plot_w = PANEL_WIDTH - 2.0 * MARGIN;
        let plot_h = PANEL_HEIGHT - 2.0 * MARGIN;
        let to_x = |x: f64| MARGIN + (x - x0) / x_span * plot_w;
        let to_y = |y: f64| top + MARGIN + plot_h - (y - y0) / y_span * plot_h;

        writeln!(
            out,
            r#"<text x="{:.1}" y="{:.1}" font-size="14" text-anchor="middle">{}</text>"#,
            PANEL_WIDTH / 2.0,
            top + MARGIN / 2.0,
            escape(&self.title)
        )?;
        writeln!(
            out,
            r##"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="none" stroke="#999"/>"##,
            MARGIN,
            top + MARGIN,
            plot_w,
            plot_h
        )?;
        writeln!(
            out,
            r#"<text x="{:.1}" y="{:.1}" font-size="10">{} [{}, {}]</text>"#,
            4.0,
            top + MARGIN - 4.0,
            escape(&self.y_label),
            y0,
            y1
        )?;
        writeln!(
            out,
            r#"<text x="{:.1}" y="{:.1}" font-size="10" text-anchor="middle">Time (seconds) [{}, {}]</text>"#,
            PANEL_WIDTH / 2.0,
            top + PANEL_HEIGHT - MARGIN / 3.0,
            x0,
            x1
        )?;

        for (index, series) in self.series.iter().enumerate() {
            let color = COLORS[index % COLORS.len()];
            let points: Vec<String> = series
                .points
                .iter()
                .filter(|(x, y)| x.is_finite() && y.is_finite())
                .map(|&(x, y)| format!("{:.2},{:.2}", to_x(x), to_y(y)))
                .collect();
            writeln!(
                out,
                r#"<polyline fill="none" stroke="{}" stroke-width="1.5" points="{}"/>"#,
                color,
                points.join(" ")
            )?;
            writeln!(
                out,
                r#"<text x="{:.1}" y="{:.1}" font-size="10" fill="{}">{}</text>"#,
                PANEL_WIDTH - MARGIN - 120.0,
                top + MARGIN + 14.0 * (index as f64 + 1.0),
                color,
                escape(&series.label)
            )?;
        }
        Ok(())
    }
}

struct Chart {
    title: String,
    panels: Vec<Panel>,
}

impl Chart {
    fn render(&self) -> Result<String> {
        let panels: Vec<&Panel> = self.panels.iter().filter(|p| p.bounds().is_some()).collect();
        if panels.is_empty() {
            return Err(AnalyzerError::Chart(format!("'{}' has no plottable values", self.title)));
        }

        let mut out = String::new();
        self.write_svg(&panels, &mut out)
            .map_err(|e| AnalyzerError::Chart(e.to_string()))?;
        Ok(out)
    }

    fn write_svg(&self, panels: &[&Panel], out: &mut String) -> std::fmt::Result {
        let height = TITLE_HEIGHT + PANEL_HEIGHT * panels.len() as f64;
        writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}" font-family="sans-serif">"#,
            PANEL_WIDTH,
            height
        )?;
        writeln!(
            out,
            r#"<text x="{:.1}" y="26" font-size="18" text-anchor="middle">{}</text>"#,
            PANEL_WIDTH / 2.0,
            escape(&self.title)
        )?;
        for (index, panel) in panels.iter().enumerate() {
            panel.render(out, TITLE_HEIGHT + PANEL_HEIGHT * index as f64)?;
        }
        writeln!(out, "</svg>")
    }

    async fn save(&self, path: &Path) -> Result<()> {
        let svg = self.render()?;
        tokio::fs::write(path, svg).await?;
        Ok(())
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn performance_chart(table: &StatsTable<'_>) -> Option<Chart> {
    let panels: Vec<Panel> = table
        .performance_series()
        .into_iter()
        .map(|(metric, points)| {
            Panel::new(format!("{} Over Time", metric.to_uppercase()), metric).with_series(metric, points)
        })
        .collect();
    if panels.is_empty() {
        return None;
    }
    Some(Chart {
        title: "Klipper Performance Metrics Over Time".to_string(),
        panels,
    })
}

fn temperature_chart(table: &StatsTable<'_>) -> Option<Chart> {
    let mut panel = Panel::new("Temperature Monitoring Over Time", "Temperature (°C)");
    for column in table.temperature_columns() {
        panel = panel.with_series(capitalize(sensor_name(column)), table.series(column));
    }
    if panel.series.is_empty() {
        return None;
    }
    Some(Chart {
        title: "Klipper Temperatures".to_string(),
        panels: vec![panel],
    })
}

fn communication_chart(table: &StatsTable<'_>) -> Option<Chart> {
    if !(table.has_column("rx_error") && table.has_column("tx_error")) {
        return None;
    }
    let mut panels = vec![Panel::new("MCU Communication Errors", "Error Count")
        .with_series("RX Errors", table.series("rx_error"))
        .with_series("TX Errors", table.series("tx_error"))];
    if table.has_column("bytes_write") && table.has_column("bytes_read") {
        panels.push(
            Panel::new("MCU Data Transfer", "Bytes")
                .with_series("Bytes Written", table.series("bytes_write"))
                .with_series("Bytes Read", table.series("bytes_read")),
        );
    }
    Some(Chart {
        title: "Klipper MCU Communication".to_string(),
        panels,
    })
}

/// Write every chart the data supports and return the files created.
pub async fn create_visualizations(table: &StatsTable<'_>, output_dir: &Path) -> Result<Vec<PathBuf>> {
    if table.is_empty() {
        info!("No stats data available for visualization");
        return Ok(Vec::new());
    }

    let charts = [
        (PERFORMANCE_CHART_FILE, performance_chart(table)),
        (TEMPERATURE_CHART_FILE, temperature_chart(table)),
        (COMMUNICATION_CHART_FILE, communication_chart(table)),
    ];

    let mut written = Vec::new();
    for (file_name, chart) in charts {
        if let Some(chart) = chart {
            let path = output_dir.join(file_name);
            chart.save(&path).await?;
            written.push(path);
        }
    }

    info!("Visualizations saved to {}", output_dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::LogAnalyzer;

    fn analyze(lines: &[&str]) -> LogAnalyzer {
        let mut analyzer = LogAnalyzer::new().unwrap();
        for (index, line) in lines.iter().enumerate() {
            analyzer.ingest_line(index + 1, line);
        }
        analyzer
    }

    #[tokio::test]
    async fn writes_charts_for_available_columns() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = analyze(&[
            "Stats 1.0: sysload=0.5 rx_error=0 tx_error=0 extruder: temp=200.0",
            "Stats 2.0: sysload=0.9 rx_error=1 tx_error=0 extruder: temp=205.0",
        ]);
        let table = StatsTable::new(analyzer.snapshots());

        let written = create_visualizations(&table, dir.path()).await.unwrap();
        assert_eq!(written.len(), 3);

        let svg = std::fs::read_to_string(dir.path().join(TEMPERATURE_CHART_FILE)).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Extruder"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[tokio::test]
    async fn communication_chart_needs_both_counters() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = analyze(&["Stats 1.0: rx_error=0", "Stats 2.0: rx_error=3"]);
        let table = StatsTable::new(analyzer.snapshots());

        let written = create_visualizations(&table, dir.path()).await.unwrap();
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn no_snapshots_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = analyze(&["Start printer"]);
        let table = StatsTable::new(analyzer.snapshots());
        assert!(create_visualizations(&table, dir.path()).await.unwrap().is_empty());
    }

    #[test]
    fn chart_without_values_is_an_error() {
        let chart = Chart {
            title: "Empty".to_string(),
            panels: vec![Panel::new("nothing", "n/a")],
        };
        assert!(matches!(chart.render(), Err(AnalyzerError::Chart(_))));
    }

    #[test]
    fn sensor_labels_are_capitalized() {
        assert_eq!(capitalize("heater_bed"), "Heater_bed");
        assert_eq!(capitalize(""), "");
    }
}
