use crate::classifier::{LineClassifier, LineMatch};
use crate::error::Result;
use crate::types::{ConfigSection, ErrorEntry, LogLine, McuDescriptor, StatsSnapshot};
use log::debug;

/// Accumulated state of one analysis run.
///
/// Built once, fed every line of the log in order, then queried read-only by
/// the aggregation, reporting and export stages.
pub struct LogAnalyzer {
    classifier: LineClassifier,
    mcus: Vec<McuDescriptor>,
    snapshots: Vec<StatsSnapshot>,
    errors: Vec<ErrorEntry>,
    config_sections: Vec<ConfigSection>,
    lines_read: usize,
}

impl LogAnalyzer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            classifier: LineClassifier::new()?,
            mcus: Vec::new(),
            snapshots: Vec::new(),
            errors: Vec::new(),
            config_sections: Vec::new(),
            lines_read: 0,
        })
    }

    /// Feed one raw line. Blank lines only advance the line counter.
    pub fn ingest_line(&mut self, number: usize, raw: &str) {
        self.lines_read = number;

        let text = raw.trim();
        if text.is_empty() {
            return;
        }

        let line = LogLine::new(number, text);
        for found in self.classifier.classify(&line) {
            self.apply(&line, found);
        }
    }

    fn apply(&mut self, line: &LogLine<'_>, found: LineMatch) {
        match found {
            LineMatch::McuLoaded {
                name,
                commands,
                version_info,
            } => {
                let descriptor = McuDescriptor::new(name, commands, version_info, line.number);
                // A repeated load of the same MCU replaces the earlier descriptor.
                match self.mcus.iter_mut().find(|mcu| mcu.name == descriptor.name) {
                    Some(existing) => *existing = descriptor,
                    None => self.mcus.push(descriptor),
                }
            }
            LineMatch::McuConfig { name, config } => match self.mcu_mut(&name) {
                Some(mcu) => mcu.config = Some(config),
                None => debug!("Ignoring config for unknown MCU '{}' at line {}", name, line.number),
            },
            LineMatch::McuConfigured { name, moves } => match self.mcu_mut(&name) {
                Some(mcu) => mcu.moves = Some(moves),
                None => debug!("Ignoring moves for unknown MCU '{}' at line {}", name, line.number),
            },
            LineMatch::Stats { timestamp, fields } => {
                let mut snapshot = StatsSnapshot::new(timestamp, line.number);
                for (key, value) in fields {
                    snapshot.insert(key, value);
                }
                self.snapshots.push(snapshot);
            }
            LineMatch::ConfigSection { name } => {
                if !self.config_sections.iter().any(|section| section.name == name) {
                    self.config_sections.push(ConfigSection {
                        name,
                        line_number: line.number,
                    });
                }
            }
            LineMatch::Error { category } => {
                self.errors.push(ErrorEntry {
                    line_number: line.number,
                    category,
                    message: line.text.to_string(),
                });
            }
        }
    }

    fn mcu_mut(&mut self, name: &str) -> Option<&mut McuDescriptor> {
        self.mcus.iter_mut().find(|mcu| mcu.name == name)
    }

    pub fn mcus(&self) -> &[McuDescriptor] {
        &self.mcus
    }

    pub fn snapshots(&self) -> &[StatsSnapshot] {
        &self.snapshots
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    pub fn config_sections(&self) -> &[ConfigSection] {
        &self.config_sections
    }

    pub fn lines_read(&self) -> usize {
        self.lines_read
    }
}
