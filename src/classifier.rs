use crate::types::{ErrorCategory, LogLine, StatValue};
use regex::Regex;

const MCU_LOAD_PATTERN: &str = r"^Loaded MCU '(\w+)' (\d+) commands \((.*?)\)";
const MCU_CONFIG_PATTERN: &str = r"^MCU '(\w+)' config: (.*)";
const MCU_CONFIGURED_PATTERN: &str = r"^Configured MCU '(\w+)' \((\d+) moves\)";
const STATS_PATTERN: &str = r"^Stats (\d+\.?\d*): (.*)";
const CONFIG_SECTION_PATTERN: &str = r"^\[([^\]]+)\]$";

/// Something recognised on a single line. One line may yield several.
#[derive(Debug, Clone, PartialEq)]
pub enum LineMatch {
    McuLoaded {
        name: String,
        commands: u64,
        version_info: String,
    },
    McuConfig {
        name: String,
        config: String,
    },
    McuConfigured {
        name: String,
        moves: u64,
    },
    Stats {
        timestamp: f64,
        fields: Vec<(String, StatValue)>,
    },
    ConfigSection {
        name: String,
    },
    Error {
        category: ErrorCategory,
    },
}

/// One sub-scan over the content of a stats line.
///
/// Every rule runs over the full content; captures are emitted in rule
/// order so a later rule overwrites an earlier one on the same key.
struct ExtractionRule {
    pattern: Regex,
    key_suffix: Option<&'static str>,
}

impl ExtractionRule {
    fn key_value() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(r"(\w+)=([0-9.-]+|active|inactive|\w+)")?,
            key_suffix: None,
        })
    }

    /// `sensor: ... <key>=<number>`, stored as `<sensor>_<key>`. The lazy span may
    /// skip other pairs of the same sensor but never crosses the `:` that opens the
    /// next sensor block.
    fn sensor(key: &'static str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(&format!(r"(\w+): [^:]*?\b{}=([0-9.-]+)", key))?,
            key_suffix: Some(key),
        })
    }

    fn extract(&self, content: &str, fields: &mut Vec<(String, StatValue)>) {
        for caps in self.pattern.captures_iter(content) {
            let key = match self.key_suffix {
                Some(suffix) => format!("{}_{}", &caps[1], suffix),
                None => caps[1].to_string(),
            };
            fields.push((key, StatValue::parse(&caps[2])));
        }
    }
}

pub struct LineClassifier {
    mcu_load: Regex,
    mcu_config: Regex,
    mcu_configured: Regex,
    stats: Regex,
    config_section: Regex,
    stats_rules: Vec<ExtractionRule>,
}

impl LineClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        let stats_rules = vec![
            ExtractionRule::key_value()?,
            ExtractionRule::sensor("temp")?,
            ExtractionRule::sensor("target")?,
            ExtractionRule::sensor("pwm")?,
        ];

        Ok(Self {
            mcu_load: Regex::new(MCU_LOAD_PATTERN)?,
            mcu_config: Regex::new(MCU_CONFIG_PATTERN)?,
            mcu_configured: Regex::new(MCU_CONFIGURED_PATTERN)?,
            stats: Regex::new(STATS_PATTERN)?,
            config_section: Regex::new(CONFIG_SECTION_PATTERN)?,
            stats_rules,
        })
    }

    /// Run every recogniser against the line independently.
    pub fn classify(&self, line: &LogLine<'_>) -> Vec<LineMatch> {
        let text = line.text;
        let mut matches = Vec::new();

        if let Some(caps) = self.mcu_load.captures(text) {
            if let Ok(commands) = caps[2].parse::<u64>() {
                matches.push(LineMatch::McuLoaded {
                    name: caps[1].to_string(),
                    commands,
                    version_info: caps[3].to_string(),
                });
            }
        }

        if let Some(caps) = self.mcu_config.captures(text) {
            matches.push(LineMatch::McuConfig {
                name: caps[1].to_string(),
                config: caps[2].to_string(),
            });
        }

        if let Some(caps) = self.mcu_configured.captures(text) {
            if let Ok(moves) = caps[2].parse::<u64>() {
                matches.push(LineMatch::McuConfigured {
                    name: caps[1].to_string(),
                    moves,
                });
            }
        }

        if let Some(caps) = self.stats.captures(text) {
            if let Ok(timestamp) = caps[1].parse::<f64>() {
                matches.push(LineMatch::Stats {
                    timestamp,
                    fields: self.extract_stats_fields(&caps[2]),
                });
            }
        }

        if let Some(caps) = self.config_section.captures(text) {
            matches.push(LineMatch::ConfigSection {
                name: caps[1].to_string(),
            });
        }

        if let Some(category) = classify_error(text) {
            matches.push(LineMatch::Error { category });
        }

        matches
    }

    fn extract_stats_fields(&self, content: &str) -> Vec<(String, StatValue)> {
        let mut fields = Vec::new();
        for rule in &self.stats_rules {
            rule.extract(content, &mut fields);
        }
        fields
    }
}

/// Case-insensitive keyword search; the first category in priority order wins.
pub fn classify_error(text: &str) -> Option<ErrorCategory> {
    let lowered = text.to_lowercase();
    ErrorCategory::PRIORITY
        .into_iter()
        .find(|category| lowered.contains(category.keyword()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Vec<LineMatch> {
        let classifier = LineClassifier::new().unwrap();
        classifier.classify(&LogLine::new(1, text))
    }

    fn stats_fields(text: &str) -> (f64, Vec<(String, StatValue)>) {
        match classify(text).into_iter().next() {
            Some(LineMatch::Stats { timestamp, fields }) => (timestamp, fields),
            other => panic!("expected stats match, got {:?}", other),
        }
    }

    fn field<'a>(fields: &'a [(String, StatValue)], key: &str) -> Option<&'a StatValue> {
        fields.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[test]
    fn recognises_mcu_load() {
        let matches = classify("Loaded MCU 'mcu' 945 commands (v0.11.0-123-gabc / gcc: (GCC) 10.3.1)");
        assert_eq!(
            matches,
            vec![LineMatch::McuLoaded {
                name: "mcu".to_string(),
                commands: 945,
                version_info: "v0.11.0-123-gabc / gcc: (GCC".to_string(),
            }]
        );
    }

    #[test]
    fn recognises_mcu_config_and_moves() {
        assert_eq!(
            classify("MCU 'EBBCan' config: ADC_MAX=4095 BUS_PINS_i2c1=PB8,PB9"),
            vec![LineMatch::McuConfig {
                name: "EBBCan".to_string(),
                config: "ADC_MAX=4095 BUS_PINS_i2c1=PB8,PB9".to_string(),
            }]
        );
        assert_eq!(
            classify("Configured MCU 'mcu' (1024 moves)"),
            vec![LineMatch::McuConfigured {
                name: "mcu".to_string(),
                moves: 1024,
            }]
        );
    }

    #[test]
    fn patterns_are_anchored_at_line_start() {
        assert!(classify("info: Loaded MCU 'mcu' 10 commands (v1)").is_empty());
        assert!(classify("x Stats 1.0: sysload=0.1").is_empty());
    }

    #[test]
    fn stats_line_extracts_sensor_fields() {
        let (timestamp, fields) = stats_fields("Stats 12.5: extruder: temp=205.3 target=210.0 pwm=0.45");
        assert_eq!(timestamp, 12.5);
        assert_eq!(field(&fields, "extruder_temp"), Some(&StatValue::Number(205.3)));
        assert_eq!(field(&fields, "extruder_target"), Some(&StatValue::Number(210.0)));
        assert_eq!(field(&fields, "extruder_pwm"), Some(&StatValue::Number(0.45)));
        assert_eq!(field(&fields, "pwm"), Some(&StatValue::Number(0.45)));
    }

    #[test]
    fn stats_line_keeps_literal_and_bare_word_values() {
        let (_, fields) = stats_fields("Stats 3.0: print_stats: state=active idle=inactive mode=printing sysload=0.5");
        assert_eq!(field(&fields, "state"), Some(&StatValue::Text("active".to_string())));
        assert_eq!(field(&fields, "idle"), Some(&StatValue::Text("inactive".to_string())));
        assert_eq!(field(&fields, "mode"), Some(&StatValue::Text("printing".to_string())));
        assert_eq!(field(&fields, "sysload"), Some(&StatValue::Number(0.5)));
    }

    #[test]
    fn malformed_number_is_kept_as_text() {
        let (_, fields) = stats_fields("Stats 1: version=1.2.3");
        assert_eq!(field(&fields, "version"), Some(&StatValue::Text("1.2.3".to_string())));
    }

    #[test]
    fn pwm_does_not_leak_across_sensor_blocks() {
        let (_, fields) = stats_fields(
            "Stats 5.0: mcu: mcu_awake=0.004 bytes_write=100 heater_bed: target=60 temp=59.8 pwm=0.312",
        );
        assert_eq!(field(&fields, "mcu_pwm"), None);
        assert_eq!(field(&fields, "heater_bed_pwm"), Some(&StatValue::Number(0.312)));
        assert_eq!(field(&fields, "heater_bed_temp"), Some(&StatValue::Number(59.8)));
        assert_eq!(field(&fields, "mcu_awake"), Some(&StatValue::Number(0.004)));
    }

    #[test]
    fn config_section_must_be_standalone() {
        assert_eq!(
            classify("[printer]"),
            vec![LineMatch::ConfigSection {
                name: "printer".to_string()
            }]
        );
        assert!(classify("[printer] kinematics").is_empty());
        assert!(classify("value [x]").is_empty());
    }

    #[test]
    fn error_priority_is_honoured() {
        assert_eq!(classify_error("Error and a WARNING"), Some(ErrorCategory::Error));
        assert_eq!(classify_error("Warning: probe failed"), Some(ErrorCategory::Warning));
        assert_eq!(classify_error("Unhandled EXCEPTION"), Some(ErrorCategory::Exception));
        assert_eq!(classify_error("homing FAILED"), Some(ErrorCategory::Failed));
        assert_eq!(classify_error("all good"), None);
    }

    #[test]
    fn independent_checks_can_both_match() {
        let matches = classify("Loaded MCU 'error_board' 12 commands (v1)");
        assert_eq!(matches.len(), 2);
        assert!(matches!(matches[1], LineMatch::Error { category: ErrorCategory::Error }));
    }
}
