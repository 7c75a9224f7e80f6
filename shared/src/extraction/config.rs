//! Typed form of a template's `extraction_config` JSON.
//!
//! ```json
//! {
//!   "priority": 5,
//!   "timeframe_one_m": "minute",
//!   "fields": {
//!     "symbol": { "extraction_method": "regex", "regex_pattern": "(\\w+USD)", "required": true },
//!     "entry_price": { "extraction_method": "line", "line_number": 1, "marker_after": "Entry:" }
//!   }
//! }
//! ```

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::error::{Result, SignalError};
use crate::models::OneMUnit;

pub const SUPPORTED_METHODS: [&str; 4] = ["regex", "line", "marker", "position"];

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Fields in document order.
    #[serde(deserialize_with = "deserialize_fields")]
    pub fields: Vec<(String, FieldConfig)>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub timeframe_one_m: Option<OneMUnit>,
}

impl ExtractionConfig {
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn field(&self, name: &str) -> Option<&FieldConfig> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, config)| config)
    }
}

/// Priority as stored in a raw config. Anything that is not an integer counts as 0.
pub fn template_priority(value: &Value) -> i64 {
    value.get("priority").and_then(Value::as_i64).unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawFieldConfig")]
pub struct FieldConfig {
    pub strategy: ExtractionStrategy,
    pub required: bool,
    pub data_type: Option<DataType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStrategy {
    Regex {
        pattern: String,
    },
    Line {
        line_number: i64,
        marker_after: Option<String>,
    },
    Marker {
        marker_start: Option<String>,
        marker_end: Option<String>,
    },
    Position {
        start_pos: i64,
        end_pos: Option<i64>,
    },
    /// Method name nobody knows how to run. Extraction logs and yields nothing.
    Unsupported(String),
}

impl ExtractionStrategy {
    pub fn method_name(&self) -> &str {
        match self {
            ExtractionStrategy::Regex { .. } => "regex",
            ExtractionStrategy::Line { .. } => "line",
            ExtractionStrategy::Marker { .. } => "marker",
            ExtractionStrategy::Position { .. } => "position",
            ExtractionStrategy::Unsupported(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[serde(alias = "str", alias = "text")]
    String,
    #[serde(alias = "float", alias = "number")]
    Decimal,
    #[serde(alias = "int")]
    Integer,
}

#[derive(Deserialize)]
struct RawFieldConfig {
    #[serde(default = "default_method")]
    extraction_method: String,
    regex_pattern: Option<String>,
    line_number: Option<i64>,
    marker_after: Option<String>,
    marker_start: Option<String>,
    marker_end: Option<String>,
    start_pos: Option<i64>,
    end_pos: Option<i64>,
    #[serde(default)]
    required: bool,
    data_type: Option<DataType>,
}

fn default_method() -> String {
    "regex".to_string()
}

impl TryFrom<RawFieldConfig> for FieldConfig {
    type Error = String;

    fn try_from(raw: RawFieldConfig) -> std::result::Result<Self, Self::Error> {
        let strategy = match raw.extraction_method.as_str() {
            "regex" => match raw.regex_pattern {
                Some(pattern) if !pattern.is_empty() => ExtractionStrategy::Regex { pattern },
                _ => return Err("regex extraction requires 'regex_pattern'".to_string()),
            },
            "line" => ExtractionStrategy::Line {
                line_number: raw.line_number.unwrap_or(0),
                marker_after: raw.marker_after.filter(|m| !m.is_empty()),
            },
            "marker" => ExtractionStrategy::Marker {
                marker_start: raw.marker_start.filter(|m| !m.is_empty()),
                marker_end: raw.marker_end.filter(|m| !m.is_empty()),
            },
            "position" => {
                let start_pos = raw.start_pos.unwrap_or(0);
                if start_pos < 0 || raw.end_pos.is_some_and(|end| end < 0) {
                    return Err("position extraction requires non-negative 'start_pos' and 'end_pos'".to_string());
                }
                ExtractionStrategy::Position {
                    start_pos,
                    end_pos: raw.end_pos,
                }
            }
            other => ExtractionStrategy::Unsupported(other.to_string()),
        };

        Ok(FieldConfig {
            strategy,
            required: raw.required,
            data_type: raw.data_type,
        })
    }
}

fn deserialize_fields<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, FieldConfig)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct FieldsVisitor;

    impl<'de> Visitor<'de> for FieldsVisitor {
        type Value = Vec<(String, FieldConfig)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of field name to field configuration")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut fields = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, config)) = map.next_entry::<String, FieldConfig>()? {
                fields.push((name, config));
            }
            Ok(fields)
        }
    }

    deserializer.deserialize_map(FieldsVisitor)
}

/// Checks a template's extraction config before it is stored.
///
/// Stricter than deserialization: an unknown method is rejected here, while
/// a stored template carrying one only gets a warning at extraction time.
pub fn validate_template_config(value: &Value) -> Result<ExtractionConfig> {
    if !value.is_object() {
        return Err(SignalError::Template(
            "Extraction config must be a JSON object".to_string(),
        ));
    }

    let config = ExtractionConfig::from_value(value)
        .map_err(|e| SignalError::Template(format!("Invalid extraction config: {}", e)))?;

    if config.fields.is_empty() {
        return Err(SignalError::Template(
            "Extraction config must define at least one field".to_string(),
        ));
    }

    for (name, field) in &config.fields {
        if let ExtractionStrategy::Unsupported(method) = &field.strategy {
            return Err(SignalError::Template(format!(
                "Invalid extraction method '{}' for field '{}'. Must be one of: {}",
                method,
                name,
                SUPPORTED_METHODS.join(", ")
            )));
        }
    }

    Ok(config)
}
