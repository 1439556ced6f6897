use serde::Serialize;
use std::fmt;

/// One trimmed, non-empty line of the input log with its 1-based position.
#[derive(Debug, Clone, Copy)]
pub struct LogLine<'a> {
    pub number: usize,
    pub text: &'a str,
}

impl<'a> LogLine<'a> {
    pub fn new(number: usize, text: &'a str) -> Self {
        Self { number, text }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct McuDescriptor {
    #[serde(skip)]
    pub name: String,
    pub commands: u64,
    pub version_info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moves: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    pub line_number: usize,
}

impl McuDescriptor {
    pub fn new(name: String, commands: u64, version_info: String, line_number: usize) -> Self {
        Self {
            name,
            commands,
            version_info,
            moves: None,
            config: None,
            line_number,
        }
    }
}

/// A single metric cell of a stats line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Number(f64),
    Text(String),
}

impl StatValue {
    /// Numbers are parsed as `f64`; anything that does not parse is kept verbatim.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<f64>() {
            Ok(value) => StatValue::Number(value),
            Err(_) => StatValue::Text(raw.to_string()),
        }
    }

    /// Numeric value of the cell; `NaN` counts as missing.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StatValue::Number(value) if value.is_nan() => None,
            StatValue::Number(value) => Some(*value),
            StatValue::Text(_) => None,
        }
    }
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Number(value) => write!(f, "{}", value),
            StatValue::Text(text) => f.write_str(text),
        }
    }
}

/// Metric cells of one stats line, kept in the order the line gives them.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub timestamp: f64,
    pub line_number: usize,
    values: Vec<(String, StatValue)>,
}

impl StatsSnapshot {
    pub fn new(timestamp: f64, line_number: usize) -> Self {
        Self {
            timestamp,
            line_number,
            values: Vec::new(),
        }
    }

    /// A repeated key overwrites the earlier value but keeps its position.
    pub fn insert(&mut self, key: String, value: StatValue) {
        match self.values.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.values.push((key, value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(key, _)| key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&StatValue> {
        self.values.iter().find(|(existing, _)| existing == key).map(|(_, value)| value)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(StatValue::as_f64)
    }
}

/// Keyword category of an error/warning line, in match priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Error,
    Warning,
    Exception,
    Failed,
}

impl ErrorCategory {
    pub const PRIORITY: [ErrorCategory; 4] = [
        ErrorCategory::Error,
        ErrorCategory::Warning,
        ErrorCategory::Exception,
        ErrorCategory::Failed,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            ErrorCategory::Error => "error",
            ErrorCategory::Warning => "warning",
            ErrorCategory::Exception => "exception",
            ErrorCategory::Failed => "failed",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    pub line_number: usize,
    #[serde(rename = "type")]
    pub category: ErrorCategory,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSection {
    #[serde(skip)]
    pub name: String,
    pub line_number: usize,
}
