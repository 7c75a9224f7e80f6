//! Template-driven field extraction.
//!
//! Each field of a template names one strategy (regex, line, marker, position)
//! that pulls a single string value out of the raw message text.

pub mod config;

use regex::RegexBuilder;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, error, warn};

use crate::error::{Result, SignalError};

pub use config::{
    template_priority, validate_template_config, DataType, ExtractionConfig, ExtractionStrategy,
    FieldConfig,
};

/// Field name to extracted value. Only successfully extracted fields are present.
pub type ExtractedData = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedField {
    pub name: String,
    pub value: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionResult {
    pub data: ExtractedData,
    pub errors: Vec<String>,
}

/// Outcome of a dry run against a sample message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    pub success: bool,
    pub extracted_data: ExtractedData,
    pub errors: Vec<String>,
}

impl ExtractionStrategy {
    /// Runs the strategy over `message`. `Ok(None)` means the message does not
    /// carry the value; `Err` means the strategy itself is broken.
    pub fn apply(&self, message: &str) -> Result<Option<String>> {
        let value = match self {
            ExtractionStrategy::Regex { pattern } => extract_regex(message, pattern)?,
            ExtractionStrategy::Line {
                line_number,
                marker_after,
            } => extract_line(message, *line_number, marker_after.as_deref()),
            ExtractionStrategy::Marker {
                marker_start,
                marker_end,
            } => extract_marker(message, marker_start.as_deref(), marker_end.as_deref()),
            ExtractionStrategy::Position { start_pos, end_pos } => {
                extract_position(message, *start_pos, *end_pos)
            }
            ExtractionStrategy::Unsupported(method) => {
                warn!("Unknown extraction method: {}", method);
                None
            }
        };

        Ok(value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }
}

fn extract_regex(message: &str, pattern: &str) -> Result<Option<String>> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .map_err(|e| {
            error!("Invalid regex pattern '{}': {}", pattern, e);
            SignalError::Extraction {
                message: format!("Invalid regex pattern: {}", pattern),
                reason: Some(e.to_string()),
            }
        })?;

    let Some(captures) = regex.captures(message) else {
        return Ok(None);
    };

    let group = if captures.len() > 1 {
        captures.get(1)
    } else {
        captures.get(0)
    };
    Ok(group.map(|m| m.as_str().to_string()))
}

fn extract_line(message: &str, line_number: i64, marker_after: Option<&str>) -> Option<String> {
    let index = usize::try_from(line_number).ok()?;
    let line = message.split('\n').nth(index)?.trim();

    if let Some(marker) = marker_after {
        if let Some((_, after)) = line.split_once(marker) {
            return Some(after.trim().to_string());
        }
    }

    Some(line.to_string())
}

fn extract_marker(message: &str, marker_start: Option<&str>, marker_end: Option<&str>) -> Option<String> {
    let (start_marker, end_marker) = (marker_start?, marker_end?);
    let start = message.find(start_marker)? + start_marker.len();
    let rest = &message[start..];

    // an end marker missing from the text runs to the end of the message
    let end = rest.find(end_marker).unwrap_or(rest.len());

    Some(rest[..end].trim().to_string())
}

fn extract_position(message: &str, start_pos: i64, end_pos: Option<i64>) -> Option<String> {
    let chars: Vec<char> = message.chars().collect();
    let start = usize::try_from(start_pos).ok()?;
    if start >= chars.len() {
        return None;
    }

    let end = match end_pos {
        Some(end) => usize::try_from(end).ok()?.min(chars.len()),
        None => chars[start..]
            .iter()
            .position(|c| *c == ' ' || *c == '\n')
            .map(|offset| start + offset)
            .unwrap_or(chars.len()),
    };

    if end <= start {
        return None;
    }

    Some(chars[start..end].iter().collect())
}

fn matches_data_type(value: &str, data_type: Option<DataType>) -> bool {
    match data_type {
        Some(DataType::Decimal) => {
            Decimal::from_str(value).is_ok() || Decimal::from_scientific(value).is_ok()
        }
        Some(DataType::Integer) => value.parse::<i64>().is_ok(),
        Some(DataType::String) | None => true,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionEngine;

impl ExtractionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Extracts one field. An absent optional value still counts as success;
    /// a required field must yield a value, and an unsupported method never succeeds.
    pub fn extract_field(
        &self,
        message: &str,
        field: &FieldConfig,
        field_name: &str,
    ) -> Result<ExtractedField> {
        let mut value = field.strategy.apply(message)?;

        if let Some(v) = &value {
            if !matches_data_type(v, field.data_type) {
                debug!(
                    "Field '{}' value '{}' does not parse as {:?}, treating as absent",
                    field_name, v, field.data_type
                );
                value = None;
            }
        }

        let success = match field.strategy {
            ExtractionStrategy::Unsupported(_) => false,
            _ => value.is_some() || !field.required,
        };

        Ok(ExtractedField {
            name: field_name.to_string(),
            success,
            value,
        })
    }

    /// Attempts every configured field. Missing required fields are reported in
    /// `errors`; a broken strategy aborts with an error.
    pub fn extract_all_fields(&self, message: &str, config: &ExtractionConfig) -> Result<ExtractionResult> {
        let mut result = ExtractionResult::default();

        for (name, field) in &config.fields {
            let extracted = self.extract_field(message, field, name)?;
            match extracted.value {
                Some(value) => {
                    result.data.insert(extracted.name, value);
                }
                None if field.required => {
                    result
                        .errors
                        .push(format!("Required field '{}' could not be extracted", name));
                }
                None => {}
            }
        }

        Ok(result)
    }

    /// Dry run of a raw config against a sample message. Never fails; every
    /// problem ends up in the report's `errors`.
    pub fn test_extraction(&self, sample_message: &str, extraction_config: &Value) -> ExtractionReport {
        let outcome = ExtractionConfig::from_value(extraction_config)
            .map_err(|e| SignalError::Template(format!("Invalid extraction config: {}", e)))
            .and_then(|config| self.extract_all_fields(sample_message, &config));

        match outcome {
            Ok(result) => ExtractionReport {
                success: result.errors.is_empty(),
                extracted_data: result.data,
                errors: result.errors,
            },
            Err(e) => ExtractionReport {
                success: false,
                extracted_data: ExtractedData::new(),
                errors: vec![e.to_string()],
            },
        }
    }
}
