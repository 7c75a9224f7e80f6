//! Template-based signal parsing.
//!
//! `ParserEngine` tries a channel's active templates in descending priority
//! and turns the first successful extraction into a `ParsedSignal`.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::cmp::Reverse;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::entity::{messages, templates};
use crate::error::{Result, SignalError};
use crate::extraction::{template_priority, ExtractedData, ExtractionConfig, ExtractionEngine};
use crate::models::{
    BatchStats, ExtractionMetadata, ParsedSignal, SignalStatus, SignalType, StopLoss,
    TakeProfit,
};
use crate::validator::SignalValidator;

pub const EXTRACTION_METHOD: &str = "template_based";

/// Source of the templates a channel can be parsed with.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Active templates of `channel_id`, in no particular order.
    async fn active_templates(&self, channel_id: Uuid) -> Result<Vec<templates::Model>>;
}

/// Fixed template set, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTemplateStore {
    templates: Vec<templates::Model>,
}

impl InMemoryTemplateStore {
    pub fn new(templates: Vec<templates::Model>) -> Self {
        Self { templates }
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn active_templates(&self, channel_id: Uuid) -> Result<Vec<templates::Model>> {
        Ok(self
            .templates
            .iter()
            .filter(|t| t.channel_id == channel_id && t.is_active)
            .cloned()
            .collect())
    }
}

/// Data-level result of parsing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(Box<ParsedSignal>),
    /// No template produced a signal; carries the reason.
    Unparsed(String),
}

impl ParseOutcome {
    pub fn signal(&self) -> Option<&ParsedSignal> {
        match self {
            ParseOutcome::Parsed(signal) => Some(signal),
            ParseOutcome::Unparsed(_) => None,
        }
    }
}

/// Extracted fields after normalization, before a signal is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSignal {
    pub symbol: String,
    pub entry_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profits: Vec<TakeProfit>,
    pub signal_type: SignalType,
    pub timeframe: Option<String>,
}

pub struct ParserEngine {
    extraction_engine: ExtractionEngine,
    signal_validator: SignalValidator,
    templates: Arc<dyn TemplateStore>,
}

impl ParserEngine {
    pub fn new(templates: Arc<dyn TemplateStore>) -> Self {
        Self {
            extraction_engine: ExtractionEngine::new(),
            signal_validator: SignalValidator::new(),
            templates,
        }
    }

    /// Parses a single message using the channel's active templates.
    ///
    /// `Err` is reserved for broken templates and store failures. A message
    /// that simply does not match any template is `Ok(ParseOutcome::Unparsed)`.
    pub async fn parse_message(
        &self,
        message: &messages::Model,
        channel_id: Uuid,
        user_id: &str,
    ) -> Result<ParseOutcome> {
        let templates = self.templates.active_templates(channel_id).await?;
        self.parse_with_templates(message, templates, channel_id, user_id)
    }

    pub fn parse_with_templates(
        &self,
        message: &messages::Model,
        templates: Vec<templates::Model>,
        channel_id: Uuid,
        user_id: &str,
    ) -> Result<ParseOutcome> {
        if templates.is_empty() {
            warn!("No active templates found for channel {}", channel_id);
            return Ok(ParseOutcome::Unparsed(format!(
                "No active templates found for channel {}",
                channel_id
            )));
        }

        for template in order_by_priority(templates) {
            match self.extract_from_template(message, &template, channel_id, user_id) {
                Ok(signal) => {
                    info!(
                        "✅ Extracted signal {} from message {} using template '{}'",
                        signal.id, message.id, template.name
                    );
                    return Ok(ParseOutcome::Parsed(Box::new(signal)));
                }
                Err(e) if e.is_configuration() => {
                    error!("❌ Template '{}' ({}) is broken: {}", template.name, template.id, e);
                    return Err(e);
                }
                Err(e) => {
                    debug!(
                        "Template '{}' failed: {}. Trying next template...",
                        template.name, e
                    );
                }
            }
        }

        Ok(ParseOutcome::Unparsed(format!(
            "No template successfully extracted signal from message {}",
            message.id
        )))
    }

    /// Parses every message; one bad message never stops the batch.
    pub async fn parse_batch(
        &self,
        messages: &[messages::Model],
        channel_id: Uuid,
        user_id: &str,
    ) -> (Vec<ParsedSignal>, BatchStats) {
        let mut signals = Vec::new();
        let mut stats = BatchStats {
            total_messages: messages.len(),
            ..Default::default()
        };

        for message in messages {
            match self.parse_message(message, channel_id, user_id).await {
                Ok(ParseOutcome::Parsed(signal)) => {
                    signals.push(*signal);
                    stats.successful_extractions += 1;
                }
                Ok(ParseOutcome::Unparsed(reason)) => {
                    stats.failed_extractions += 1;
                    stats.errors.push(format!("Message {}: {}", message.id, reason));
                }
                Err(e) => {
                    error!("Parser error on message {}: {}", message.id, e);
                    stats.failed_extractions += 1;
                    stats.errors.push(format!("Message {}: {}", message.id, e));
                }
            }
        }

        info!(
            "Batch parsing complete: {}/{} signals extracted",
            stats.successful_extractions, stats.total_messages
        );

        (signals, stats)
    }

    fn extract_from_template(
        &self,
        message: &messages::Model,
        template: &templates::Model,
        channel_id: Uuid,
        user_id: &str,
    ) -> Result<ParsedSignal> {
        let config = ExtractionConfig::from_value(&template.extraction_config).map_err(|e| {
            SignalError::Template(format!(
                "Template {} has a malformed extraction config: {}",
                template.id, e
            ))
        })?;

        let extraction = self
            .extraction_engine
            .extract_all_fields(&message.text, &config)?;

        if !extraction.errors.is_empty() {
            return Err(SignalError::validation(
                "extraction",
                extraction.errors.join("; "),
            ));
        }
        if extraction.data.is_empty() {
            return Err(SignalError::validation(
                "extraction",
                "No data extracted from message",
            ));
        }

        let validated = self.validate_extracted_data(&extraction.data)?;
        self.check_price_logic(&validated);

        let confidence_score = Self::calculate_confidence_score(&validated);
        let risk_reward_ratio = self.risk_reward(&validated);
        let metadata = build_metadata(template, &config, &extraction.data, validated.timeframe.as_deref());

        Ok(ParsedSignal {
            id: Uuid::new_v4(),
            channel_id,
            template_id: template.id,
            user_id: user_id.to_string(),
            original_message_id: Some(message.telegram_message_id),
            original_message_text: message.text.clone(),
            symbol: validated.symbol,
            entry_price: validated.entry_price,
            stop_loss: validated.stop_loss.map(StopLoss::new),
            take_profits: validated.take_profits,
            signal_type: validated.signal_type,
            timeframe: validated.timeframe,
            status: SignalStatus::Pending,
            confidence_score,
            risk_reward_ratio,
            extraction_metadata: metadata,
            created_at: Utc::now(),
        })
    }

    /// Normalizes raw extracted strings. Symbol and entry price are mandatory;
    /// everything else is dropped when unusable.
    fn validate_extracted_data(&self, data: &ExtractedData) -> Result<ValidatedSignal> {
        let symbol = match data.get("symbol") {
            Some(raw) if !raw.trim().is_empty() => raw.trim().to_uppercase().replace('/', ""),
            _ => return Err(SignalError::validation("symbol", "Symbol is required")),
        };

        let entry_price = match data.get("entry_price") {
            Some(raw) => self.signal_validator.validate_price(raw, "entry_price")?,
            None => return Err(SignalError::validation("entry_price", "Entry price is required")),
        };

        let signal_type = match data.get("signal_type") {
            Some(raw) => self.signal_validator.validate_signal_type(raw).unwrap_or_else(|e| {
                debug!("{}; defaulting to BUY", e);
                SignalType::Buy
            }),
            None => SignalType::Buy,
        };

        let timeframe = data.get("timeframe").and_then(|raw| {
            self.signal_validator
                .validate_timeframe(raw)
                .map_err(|e| debug!("Dropping timeframe: {}", e))
                .ok()
        });

        let stop_loss = data.get("stop_loss").and_then(|raw| {
            self.signal_validator
                .validate_price(raw, "stop_loss")
                .map_err(|e| warn!("Dropping stop loss: {}", e))
                .ok()
        });

        let take_profits = normalize_take_profits(&take_profit_input(data)).unwrap_or_else(|e| {
            warn!("Dropping take profits: {}", e);
            Vec::new()
        });

        Ok(ValidatedSignal {
            symbol,
            entry_price,
            stop_loss,
            take_profits,
            signal_type,
            timeframe,
        })
    }

    /// Price relationships are advisory: violations are logged, never fatal.
    fn check_price_logic(&self, signal: &ValidatedSignal) {
        let Some(stop_loss) = signal.stop_loss else {
            return;
        };

        let prices: Vec<Decimal> = signal.take_profits.iter().map(|tp| tp.price).collect();
        let (valid, errors) = self.signal_validator.validate_price_levels(
            signal.entry_price,
            stop_loss,
            &prices,
            signal.signal_type,
        );

        if !valid {
            warn!(
                "Price logic validation failed for {} {}: {}",
                signal.signal_type,
                signal.symbol,
                errors.join("; ")
            );
        }
    }

    fn risk_reward(&self, signal: &ValidatedSignal) -> Option<Decimal> {
        let stop_loss = signal.stop_loss?;
        let first_tp = signal.take_profits.first()?;
        self.signal_validator
            .calculate_risk_reward_ratio(signal.entry_price, stop_loss, first_tp.price, signal.signal_type)
            .map_err(|e| debug!("No risk/reward ratio: {}", e))
            .ok()
    }

    /// Completeness heuristic: starts at 1.0 and loses points for each
    /// missing piece of a full signal.
    pub fn calculate_confidence_score(signal: &ValidatedSignal) -> Decimal {
        let mut score = dec!(1.00);

        if signal.stop_loss.is_none() {
            score -= dec!(0.15);
        }
        if signal.take_profits.is_empty() {
            score -= dec!(0.15);
        }
        if signal.timeframe.is_none() {
            score -= dec!(0.05);
        }
        // BUY is also what an unreadable type falls back to
        if signal.signal_type == SignalType::Buy {
            score -= dec!(0.05);
        }

        score.clamp(Decimal::ZERO, Decimal::ONE)
    }
}

fn order_by_priority(mut templates: Vec<templates::Model>) -> Vec<templates::Model> {
    templates.sort_by_key(|t| Reverse(template_priority(&t.extraction_config)));
    templates
}

fn build_metadata(
    template: &templates::Model,
    config: &ExtractionConfig,
    data: &ExtractedData,
    timeframe: Option<&str>,
) -> ExtractionMetadata {
    let mut metadata = ExtractionMetadata {
        template_id: template.id,
        template_name: template.name.clone(),
        template_version: template.version,
        extraction_method: EXTRACTION_METHOD.to_string(),
        extracted_fields: data.keys().cloned().collect(),
        timeframe_unit: None,
        timeframe_ambiguous: false,
    };

    if timeframe == Some("1M") {
        match config.timeframe_one_m {
            Some(unit) => metadata.timeframe_unit = Some(unit),
            None => {
                warn!(
                    "Template '{}' yields timeframe 1M without declaring timeframe_one_m (minute|month)",
                    template.name
                );
                metadata.timeframe_ambiguous = true;
            }
        }
    }

    metadata
}

/// Gathers take-profit input from extracted fields: a `take_profits` list
/// wins, otherwise numbered `take_profit_<n>` fields keep their own levels.
fn take_profit_input(data: &ExtractedData) -> Value {
    if let Some(raw) = data.get("take_profits") {
        let items = raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .collect();
        return Value::Array(items);
    }

    let mut numbered: Vec<(u32, &String)> = data
        .iter()
        .filter_map(|(key, value)| {
            let n = key.strip_prefix("take_profit_")?.parse().ok()?;
            Some((n, value))
        })
        .collect();
    numbered.sort_by_key(|(n, _)| *n);

    Value::Array(
        numbered
            .into_iter()
            .map(|(n, value)| serde_json::json!({ "level": format!("TP{}", n), "price": value }))
            .collect(),
    )
}

/// Normalizes take-profit data into ordered `TakeProfit`s.
///
/// Accepts a bare scalar, a list of scalars, or a list of partial objects
/// (`level` defaults to `TP<index>`, `price` to 0).
pub fn normalize_take_profits(value: &Value) -> Result<Vec<TakeProfit>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        Value::String(_) | Value::Number(_) => Ok(vec![TakeProfit::new("TP1", price_from_value(value)?)]),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let default_level = format!("TP{}", i + 1);
                match item {
                    Value::Object(obj) => {
                        let level = obj
                            .get("level")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or(default_level);
                        let price = match obj.get("price") {
                            Some(price) if !price.is_null() => price_from_value(price)?,
                            _ => Decimal::ZERO,
                        };
                        Ok(TakeProfit::new(level, price))
                    }
                    other => Ok(TakeProfit::new(default_level, price_from_value(other)?)),
                }
            })
            .collect(),
        other => Err(SignalError::validation(
            "take_profits",
            format!("Unsupported take profit format: {}", other),
        )),
    }
}

fn price_from_value(value: &Value) -> Result<Decimal> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(SignalError::validation(
                "take_profits",
                format!("Invalid take profit price: {}", other),
            ))
        }
    };

    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| SignalError::validation("take_profits", format!("Invalid take profit price: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validated(
        stop_loss: Option<Decimal>,
        take_profits: Vec<TakeProfit>,
        signal_type: SignalType,
        timeframe: Option<&str>,
    ) -> ValidatedSignal {
        ValidatedSignal {
            symbol: "EURUSD".to_string(),
            entry_price: dec!(1.0850),
            stop_loss,
            take_profits,
            signal_type,
            timeframe: timeframe.map(str::to_string),
        }
    }

    #[test]
    fn test_confidence_minimal_signal() {
        let signal = validated(None, vec![], SignalType::Buy, None);
        assert_eq!(ParserEngine::calculate_confidence_score(&signal), dec!(0.60));
    }

    #[test]
    fn test_confidence_complete_signal() {
        let signal = validated(
            Some(dec!(1.0900)),
            vec![TakeProfit::new("TP1", dec!(1.0800))],
            SignalType::Sell,
            Some("4H"),
        );
        assert_eq!(ParserEngine::calculate_confidence_score(&signal), dec!(1.0));
    }

    #[test]
    fn test_normalize_scalar_take_profit() {
        let tps = normalize_take_profits(&json!("1.1000")).unwrap();
        assert_eq!(tps, vec![TakeProfit::new("TP1", dec!(1.1000))]);
        assert!(!tps[0].hit);
        assert!(tps[0].hit_at.is_none());
    }

    #[test]
    fn test_normalize_take_profit_lists() {
        let tps = normalize_take_profits(&json!(["1.09", 1.1])).unwrap();
        assert_eq!(tps[0].level, "TP1");
        assert_eq!(tps[1].level, "TP2");
        assert_eq!(tps[1].price, dec!(1.1));

        let partial = normalize_take_profits(&json!([
            { "level": "Target A", "price": "2.5" },
            { "price": 3 },
            { "level": "Runner" }
        ]))
        .unwrap();
        assert_eq!(partial[0].level, "Target A");
        assert_eq!(partial[1].level, "TP2");
        assert_eq!(partial[2].price, Decimal::ZERO);

        assert!(normalize_take_profits(&Value::Null).unwrap().is_empty());
        assert!(normalize_take_profits(&json!(true)).is_err());
        assert!(normalize_take_profits(&json!(["soon"])).is_err());
    }

    #[test]
    fn test_take_profit_input_prefers_list_field() {
        let mut data = ExtractedData::new();
        data.insert("take_profit_2".to_string(), "1.10".to_string());
        data.insert("take_profit_1".to_string(), "1.09".to_string());
        let tps = normalize_take_profits(&take_profit_input(&data)).unwrap();
        assert_eq!(tps.len(), 2);
        assert_eq!(tps[0].level, "TP1");
        assert_eq!(tps[1].price, dec!(1.10));

        data.insert("take_profits".to_string(), "1.2, 1.3 1.4".to_string());
        let tps = normalize_take_profits(&take_profit_input(&data)).unwrap();
        assert_eq!(tps.len(), 3);
        assert_eq!(tps[2].price, dec!(1.4));
    }

    #[test]
    fn test_validate_extracted_data_defaults() {
        let parser = ParserEngine::new(Arc::new(InMemoryTemplateStore::default()));
        let mut data = ExtractedData::new();
        data.insert("symbol".to_string(), "eur/usd".to_string());
        data.insert("entry_price".to_string(), "1.0850".to_string());
        data.insert("signal_type".to_string(), "HOLD".to_string());
        data.insert("timeframe".to_string(), "2H".to_string());
        data.insert("stop_loss".to_string(), "n/a".to_string());

        let validated = parser.validate_extracted_data(&data).unwrap();
        assert_eq!(validated.symbol, "EURUSD");
        assert_eq!(validated.signal_type, SignalType::Buy);
        assert!(validated.timeframe.is_none());
        assert!(validated.stop_loss.is_none());
    }

    #[test]
    fn test_validate_extracted_data_requires_symbol_and_entry() {
        let parser = ParserEngine::new(Arc::new(InMemoryTemplateStore::default()));
        let mut data = ExtractedData::new();
        data.insert("entry_price".to_string(), "1.0850".to_string());
        let err = parser.validate_extracted_data(&data).unwrap_err();
        assert_eq!(err.field(), Some("symbol"));

        let mut data = ExtractedData::new();
        data.insert("symbol".to_string(), "EURUSD".to_string());
        data.insert("entry_price".to_string(), "-1".to_string());
        let err = parser.validate_extracted_data(&data).unwrap_err();
        assert_eq!(err.field(), Some("entry_price"));
    }
}
