use crate::aggregator::{sensor_name, StatsTable, Summary};
use crate::types::{ErrorCategory, ErrorEntry, McuDescriptor};
use chrono::NaiveDateTime;
use std::fmt::{self, Write};

const HIGH_LOAD_MAX: f64 = 1.0;
const LOW_MEMORY_MIN: f64 = 100_000.0;
const HIGH_EXTRUDER_TEMP: f64 = 250.0;
const HIGH_BED_TEMP: f64 = 100.0;

const RECOMMEND_LOAD_MEAN: f64 = 0.8;
const RECOMMEND_MEMORY_MIN: f64 = 200_000.0;
const RECOMMEND_ERROR_COUNT: usize = 10;
const RECOMMEND_RX_ERRORS: f64 = 5.0;

const VERSION_DISPLAY_CHARS: usize = 50;
const ERROR_DISPLAY_CHARS: usize = 80;
const RECENT_ERRORS: usize = 5;
const MEMORY_UNIT_DIVISOR: f64 = 1024.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    HighSystemLoad { max: f64 },
    LowMemory { min: f64 },
    CommunicationErrors { rx: f64, tx: f64 },
    HighExtruderTemperature { sensor: String, max: f64 },
    HighBedTemperature { sensor: String, max: f64 },
}

impl Warning {
    fn message(&self) -> &'static str {
        match self {
            Warning::HighSystemLoad { .. } => "High system load detected!",
            Warning::LowMemory { .. } => "Low memory detected!",
            Warning::CommunicationErrors { .. } => "Communication errors detected!",
            Warning::HighExtruderTemperature { .. } => "High extruder temperature!",
            Warning::HighBedTemperature { .. } => "High bed temperature!",
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::HighSystemLoad { max } => write!(f, "{} (max={:.2})", self.message(), max),
            Warning::LowMemory { min } => write!(f, "{} (min={})", self.message(), min),
            Warning::CommunicationErrors { rx, tx } => write!(f, "{} (rx={}, tx={})", self.message(), rx, tx),
            Warning::HighExtruderTemperature { sensor, max } | Warning::HighBedTemperature { sensor, max } => {
                write!(f, "{} ({} max={:.1})", self.message(), sensor, max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    ReduceLoad,
    MonitorMemory,
    ReviewConfiguration,
    CheckConnections,
    Healthy,
}

impl Recommendation {
    pub fn message(self) -> &'static str {
        match self {
            Recommendation::ReduceLoad => "Consider reducing print complexity or upgrading hardware",
            Recommendation::MonitorMemory => "Monitor memory usage - consider closing unnecessary processes",
            Recommendation::ReviewConfiguration => "High error count detected - review printer configuration",
            Recommendation::CheckConnections => "Communication errors detected - check cables and connections",
            Recommendation::Healthy => "System appears healthy - no immediate concerns",
        }
    }
}

/// Threshold rules over the parsed collections and the stats table.
pub struct HealthEvaluator<'a> {
    mcus: &'a [McuDescriptor],
    errors: &'a [ErrorEntry],
    table: &'a StatsTable<'a>,
}

impl<'a> HealthEvaluator<'a> {
    pub fn new(mcus: &'a [McuDescriptor], errors: &'a [ErrorEntry], table: &'a StatsTable<'a>) -> Self {
        Self { mcus, errors, table }
    }

    fn sysload(&self) -> Option<Summary> {
        Summary::of(&self.table.numeric("sysload"))
    }

    fn memavail(&self) -> Option<Summary> {
        Summary::of(&self.table.numeric("memavail"))
    }

    /// RX/TX counter growth; `None` when the log never reports `rx_error`.
    fn communication_errors(&self) -> Option<(f64, f64)> {
        let rx = self.table.counter_delta("rx_error")?;
        let tx = self.table.counter_delta("tx_error").unwrap_or(0.0);
        Some((rx, tx))
    }

    fn temperatures(&self) -> Vec<(&'a str, Summary)> {
        self.table
            .temperature_columns()
            .filter_map(|column| Summary::of(&self.table.numeric(column)).map(|s| (sensor_name(column), s)))
            .collect()
    }

    fn temperature_warnings(sensor: &str, max: f64) -> Vec<Warning> {
        let mut warnings = Vec::new();
        if sensor.contains("extruder") && max > HIGH_EXTRUDER_TEMP {
            warnings.push(Warning::HighExtruderTemperature {
                sensor: sensor.to_string(),
                max,
            });
        }
        if sensor.contains("bed") && max > HIGH_BED_TEMP {
            warnings.push(Warning::HighBedTemperature {
                sensor: sensor.to_string(),
                max,
            });
        }
        warnings
    }

    /// Every warning flag raised by the report, in report order.
    pub fn warnings(&self) -> Vec<Warning> {
        let mut warnings = Vec::new();
        if self.table.is_empty() {
            return warnings;
        }

        if let Some(load) = self.sysload() {
            if load.max > HIGH_LOAD_MAX {
                warnings.push(Warning::HighSystemLoad { max: load.max });
            }
        }
        if let Some(memory) = self.memavail() {
            if memory.min < LOW_MEMORY_MIN {
                warnings.push(Warning::LowMemory { min: memory.min });
            }
        }
        if let Some((rx, tx)) = self.communication_errors() {
            if rx > 0.0 || tx > 0.0 {
                warnings.push(Warning::CommunicationErrors { rx, tx });
            }
        }
        for (sensor, temps) in self.temperatures() {
            warnings.extend(Self::temperature_warnings(sensor, temps.max));
        }
        warnings
    }

    pub fn recommendations(&self) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        if self.sysload().is_some_and(|load| load.mean > RECOMMEND_LOAD_MEAN) {
            recommendations.push(Recommendation::ReduceLoad);
        }
        if self.memavail().is_some_and(|memory| memory.min < RECOMMEND_MEMORY_MIN) {
            recommendations.push(Recommendation::MonitorMemory);
        }
        if self.errors.len() > RECOMMEND_ERROR_COUNT {
            recommendations.push(Recommendation::ReviewConfiguration);
        }
        if self
            .communication_errors()
            .is_some_and(|(rx, _)| rx > RECOMMEND_RX_ERRORS)
        {
            recommendations.push(Recommendation::CheckConnections);
        }

        if recommendations.is_empty() {
            recommendations.push(Recommendation::Healthy);
        }
        recommendations
    }

    /// Error counts per category, in order of first appearance.
    pub fn error_counts(&self) -> Vec<(ErrorCategory, usize)> {
        let mut counts: Vec<(ErrorCategory, usize)> = Vec::new();
        for error in self.errors {
            match counts.iter_mut().find(|(category, _)| *category == error.category) {
                Some((_, count)) => *count += 1,
                None => counts.push((error.category, 1)),
            }
        }
        counts
    }

    /// Render the text report. The generation time is passed in so identical
    /// input renders identical text.
    pub fn render(&self, generated_at: NaiveDateTime) -> String {
        let mut out = String::new();
        let _ = self.write_report(&mut out, generated_at);
        out
    }

    fn write_report(&self, out: &mut String, generated_at: NaiveDateTime) -> fmt::Result {
        writeln!(out, "🔍 KLIPPER LOG HEALTH REPORT")?;
        write!(out, "{}", "=".repeat(50))?;

        writeln!(out, "\n\n🖥️  MCU INFORMATION:")?;
        for mcu in self.mcus {
            let moves = mcu.moves.map_or_else(|| "N/A".to_string(), |m| m.to_string());
            writeln!(out, "  • {}:", mcu.name)?;
            writeln!(out, "    - Commands: {}", mcu.commands)?;
            writeln!(out, "    - Moves: {}", moves)?;
            writeln!(out, "    - Version: {}...", truncate(&mcu.version_info, VERSION_DISPLAY_CHARS))?;
        }

        if !self.table.is_empty() {
            writeln!(out, "\n📊 PERFORMANCE SUMMARY:")?;
            writeln!(out, "  • Runtime: {:.1} seconds", self.table.runtime())?;
            writeln!(out, "  • Stats frequency: {:.2} Hz", self.table.stats_frequency())?;

            if let Some(load) = self.sysload() {
                writeln!(out, "  • System load: avg={:.2}, max={:.2}", load.mean, load.max)?;
                if load.max > HIGH_LOAD_MAX {
                    writeln!(out, "    ⚠️  {}", Warning::HighSystemLoad { max: load.max }.message())?;
                }
            }

            if let Some(memory) = self.memavail() {
                writeln!(
                    out,
                    "  • Memory: min={:.1}MB, avg={:.1}MB",
                    memory.min / MEMORY_UNIT_DIVISOR,
                    memory.mean / MEMORY_UNIT_DIVISOR
                )?;
                if memory.min < LOW_MEMORY_MIN {
                    writeln!(out, "    ⚠️  {}", Warning::LowMemory { min: memory.min }.message())?;
                }
            }
        }

        writeln!(out, "\n⚠️  ERROR ANALYSIS:")?;
        if self.errors.is_empty() {
            writeln!(out, "  ✅ No errors detected!")?;
        } else {
            for (category, count) in self.error_counts() {
                writeln!(out, "  • {}: {} occurrences", category, count)?;
            }
            writeln!(out, "\n📝 Recent errors:")?;
            let start = self.errors.len().saturating_sub(RECENT_ERRORS);
            for error in &self.errors[start..] {
                writeln!(
                    out,
                    "  Line {}: {}...",
                    error.line_number,
                    truncate(&error.message, ERROR_DISPLAY_CHARS)
                )?;
            }
        }

        if !self.table.is_empty() {
            writeln!(out, "\n📡 COMMUNICATION HEALTH:")?;
            if let Some((rx, tx)) = self.communication_errors() {
                writeln!(out, "  • RX errors: {}", rx)?;
                writeln!(out, "  • TX errors: {}", tx)?;
                if rx > 0.0 || tx > 0.0 {
                    writeln!(out, "    ⚠️  {}", Warning::CommunicationErrors { rx, tx }.message())?;
                } else {
                    writeln!(out, "    ✅ No communication errors!")?;
                }
            }
        }

        let temperatures = self.temperatures();
        if !temperatures.is_empty() {
            writeln!(out, "\n🌡️  TEMPERATURE ANALYSIS:")?;
            for (sensor, temps) in temperatures {
                writeln!(
                    out,
                    "  • {}: min={:.1}°C, max={:.1}°C, avg={:.1}°C",
                    sensor, temps.min, temps.max, temps.mean
                )?;
                for warning in Self::temperature_warnings(sensor, temps.max) {
                    writeln!(out, "    ⚠️  {}", warning.message())?;
                }
            }
        }

        writeln!(out, "\n📈 RECOMMENDATIONS:")?;
        for (index, recommendation) in self.recommendations().into_iter().enumerate() {
            writeln!(out, "  {}. {}", index + 1, recommendation.message())?;
        }

        write!(
            out,
            "\n📅 Report generated: {}",
            generated_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::LogAnalyzer;
    use chrono::NaiveDate;

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(8, 15, 42)
            .unwrap()
    }

    fn analyze(lines: &[&str]) -> LogAnalyzer {
        let mut analyzer = LogAnalyzer::new().unwrap();
        for (index, line) in lines.iter().enumerate() {
            analyzer.ingest_line(index + 1, line);
        }
        analyzer
    }

    fn render(analyzer: &LogAnalyzer) -> String {
        let table = StatsTable::new(analyzer.snapshots());
        HealthEvaluator::new(analyzer.mcus(), analyzer.errors(), &table).render(fixed_time())
    }

    #[test]
    fn end_to_end_scenario_flags_load_memory_and_error() {
        let analyzer = analyze(&[
            "Loaded MCU 'mcu' 945 commands (v0.11.0)",
            "Stats 1.0: sysload=0.5 memavail=500000",
            "Stats 2.0: sysload=1.5 memavail=50000",
            "ERROR: thermal runaway",
        ]);
        let table = StatsTable::new(analyzer.snapshots());
        let evaluator = HealthEvaluator::new(analyzer.mcus(), analyzer.errors(), &table);
        let report = evaluator.render(fixed_time());

        assert!(report.contains("  • mcu:\n    - Commands: 945\n    - Moves: N/A\n    - Version: v0.11.0...\n"));
        assert!(report.contains("  • System load: avg=1.00, max=1.50\n    ⚠️  High system load detected!"));
        assert!(report.contains("  • Memory: min=48.8MB, avg=268.6MB\n    ⚠️  Low memory detected!"));
        assert!(report.contains("  • error: 1 occurrences"));
        assert!(report.contains("  Line 4: ERROR: thermal runaway..."));
        assert!(report.ends_with("📅 Report generated: 2024-05-17 08:15:42"));

        assert_eq!(
            evaluator.warnings(),
            vec![
                Warning::HighSystemLoad { max: 1.5 },
                Warning::LowMemory { min: 50000.0 }
            ]
        );
        assert_eq!(
            evaluator.recommendations(),
            vec![Recommendation::ReduceLoad, Recommendation::MonitorMemory]
        );
    }

    async fn analyze_file(path: &std::path::Path) -> String {
        let mut analyzer = LogAnalyzer::new().unwrap();
        crate::log_reader::parse_log(path, &mut analyzer).await.unwrap();
        render(&analyzer)
    }

    #[tokio::test]
    async fn same_file_renders_identical_reports() {
        use std::io::Write;

        let mut log = tempfile::NamedTempFile::new().unwrap();
        write!(
            log,
            "Loaded MCU 'mcu' 945 commands (v0.11.0)\n\
             Stats 1.0: sysload=0.5 heater_bed: target=60 temp=59.0 extruder: temp=200.0\n\
             Stats 2.0: sysload=0.6 heater_bed: target=60 temp=60.5 extruder: temp=210.0\n\
             Warning: something odd\n"
        )
        .unwrap();
        log.flush().unwrap();

        let first = analyze_file(log.path()).await;
        let second = analyze_file(log.path()).await;
        assert_eq!(first, second);
        assert!(first.contains("  • warning: 1 occurrences"));
    }

    #[test]
    fn temperatures_follow_log_order() {
        let report = render(&analyze(&["Stats 1.0: heater_bed: temp=60.0 extruder: temp=200.0"]));
        let bed = report.find("  • heater_bed:").unwrap();
        let extruder = report.find("  • extruder:").unwrap();
        assert!(bed < extruder);
    }

    #[test]
    fn nan_load_sample_is_ignored() {
        let analyzer = analyze(&[
            "Stats 1.0: sysload=0.5",
            "Stats 2.0: sysload=nan",
            "Stats 3.0: sysload=0.7",
        ]);
        let report = render(&analyzer);
        assert!(report.contains("  • System load: avg=0.60, max=0.70\n"));

        let analyzer = analyze(&["Stats 1.0: sysload=0.9", "Stats 2.0: sysload=nan"]);
        let table = StatsTable::new(analyzer.snapshots());
        let evaluator = HealthEvaluator::new(analyzer.mcus(), analyzer.errors(), &table);
        assert_eq!(evaluator.recommendations(), vec![Recommendation::ReduceLoad]);
    }

    #[test]
    fn empty_log_reports_clean_health() {
        let report = render(&analyze(&[]));
        assert!(report.contains("  ✅ No errors detected!"));
        assert!(report.contains("  1. System appears healthy - no immediate concerns"));
        assert!(!report.contains("PERFORMANCE SUMMARY"));
        assert!(!report.contains("COMMUNICATION HEALTH"));
    }

    #[test]
    fn single_snapshot_reports_zero_runtime() {
        let report = render(&analyze(&["Stats 7.0: sysload=0.1"]));
        assert!(report.contains("  • Runtime: 0.0 seconds\n  • Stats frequency: 0.00 Hz"));
    }

    #[test]
    fn version_and_messages_are_truncated() {
        let version = "v".repeat(70);
        let message = format!("error {}", "x".repeat(100));
        let load = format!("Loaded MCU 'mcu' 1 commands ({})", version);
        let analyzer = analyze(&[load.as_str(), message.as_str()]);
        let report = render(&analyzer);

        assert!(report.contains(&format!("    - Version: {}...\n", "v".repeat(50))));
        let shown: String = message.chars().take(80).collect();
        assert!(report.contains(&format!("  Line 2: {}...\n", shown)));
    }

    #[test]
    fn only_last_five_errors_are_listed() {
        let lines: Vec<String> = (1..=7).map(|n| format!("failed attempt {}", n)).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let report = render(&analyze(&refs));

        assert!(report.contains("  • failed: 7 occurrences"));
        assert!(!report.contains("Line 2: failed attempt 2"));
        assert!(report.contains("Line 3: failed attempt 3..."));
        assert!(report.contains("Line 7: failed attempt 7..."));
    }

    #[test]
    fn communication_counters_use_growth() {
        let analyzer = analyze(&[
            "Stats 1.0: mcu: bytes_write=10 rx_error=2 tx_error=0",
            "Stats 2.0: mcu: bytes_write=20 rx_error=9 tx_error=0",
        ]);
        let table = StatsTable::new(analyzer.snapshots());
        let evaluator = HealthEvaluator::new(analyzer.mcus(), analyzer.errors(), &table);
        let report = evaluator.render(fixed_time());

        assert!(report.contains("  • RX errors: 7\n  • TX errors: 0\n    ⚠️  Communication errors detected!"));
        assert_eq!(evaluator.recommendations(), vec![Recommendation::CheckConnections]);
    }

    #[test]
    fn clean_communication_without_tx_column() {
        let report = render(&analyze(&["Stats 1.0: rx_error=3", "Stats 2.0: rx_error=3"]));
        assert!(report.contains("  • RX errors: 0\n  • TX errors: 0\n    ✅ No communication errors!"));
    }

    #[test]
    fn hot_sensors_are_flagged() {
        let analyzer = analyze(&[
            "Stats 1.0: extruder: temp=255.0 heater_bed: temp=105.0 chamber: temp=40.0",
        ]);
        let table = StatsTable::new(analyzer.snapshots());
        let evaluator = HealthEvaluator::new(analyzer.mcus(), analyzer.errors(), &table);
        let report = evaluator.render(fixed_time());

        assert!(report.contains("  • extruder: min=255.0°C, max=255.0°C, avg=255.0°C\n    ⚠️  High extruder temperature!"));
        assert!(report.contains("  • heater_bed: min=105.0°C, max=105.0°C, avg=105.0°C\n    ⚠️  High bed temperature!"));
        assert!(report.contains("  • chamber: min=40.0°C, max=40.0°C, avg=40.0°C\n"));
        assert_eq!(evaluator.warnings().len(), 2);
    }

    #[test]
    fn many_errors_recommend_reviewing_configuration() {
        let lines: Vec<String> = (0..11).map(|n| format!("exception {}", n)).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let analyzer = analyze(&refs);
        let table = StatsTable::new(analyzer.snapshots());
        let evaluator = HealthEvaluator::new(analyzer.mcus(), analyzer.errors(), &table);
        assert_eq!(evaluator.recommendations(), vec![Recommendation::ReviewConfiguration]);
    }
}
