//! Price-logic and field validation for trading signals

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::error::{Result, SignalError};
use crate::extraction::ExtractedData;
use crate::models::SignalType;

pub const VALID_TIMEFRAMES: [&str; 8] = ["1M", "5M", "15M", "30M", "1H", "4H", "1D", "1W"];

/// Prices above this are accepted but logged as suspicious.
pub const PRICE_SANITY_THRESHOLD: Decimal = dec!(1000000);

static TIMEFRAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+[MHDWmhdw](?:in)?)\b").expect("valid timeframe pattern"));

#[derive(Debug, Clone, Copy, Default)]
pub struct SignalValidator;

impl SignalValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_signal_type(&self, value: &str) -> Result<SignalType> {
        value.parse()
    }

    pub fn validate_timeframe(&self, value: &str) -> Result<String> {
        let normalized = value.trim().to_uppercase();
        if VALID_TIMEFRAMES.contains(&normalized.as_str()) {
            Ok(normalized)
        } else {
            Err(SignalError::validation(
                "timeframe",
                format!(
                    "Invalid timeframe: '{}'. Must be one of: {}",
                    value,
                    VALID_TIMEFRAMES.join(", ")
                ),
            ))
        }
    }

    /// Buy side: stop-loss below entry, take-profit above it.
    pub fn validate_buy_signal(&self, entry: Decimal, stop_loss: Decimal, take_profit: Option<Decimal>) -> Result<()> {
        if entry <= stop_loss {
            return Err(SignalError::validation(
                "price_logic",
                format!(
                    "BUY signal: entry price ({}) must be greater than stop loss ({})",
                    entry, stop_loss
                ),
            ));
        }

        if let Some(tp) = take_profit {
            if tp <= entry {
                return Err(SignalError::validation(
                    "price_logic",
                    format!(
                        "BUY signal: take profit ({}) must be greater than entry price ({})",
                        tp, entry
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Sell side: stop-loss above entry, take-profit below it.
    pub fn validate_sell_signal(&self, entry: Decimal, stop_loss: Decimal, take_profit: Option<Decimal>) -> Result<()> {
        if entry >= stop_loss {
            return Err(SignalError::validation(
                "price_logic",
                format!(
                    "SELL signal: entry price ({}) must be less than stop loss ({})",
                    entry, stop_loss
                ),
            ));
        }

        if let Some(tp) = take_profit {
            if tp >= entry {
                return Err(SignalError::validation(
                    "price_logic",
                    format!(
                        "SELL signal: take profit ({}) must be less than entry price ({})",
                        tp, entry
                    ),
                ));
            }
        }

        Ok(())
    }

    fn validate_side(
        &self,
        signal_type: SignalType,
        entry: Decimal,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
    ) -> Result<()> {
        if signal_type.is_long_side() {
            self.validate_buy_signal(entry, stop_loss, take_profit)
        } else {
            self.validate_sell_signal(entry, stop_loss, take_profit)
        }
    }

    /// Checks entry against stop-loss, then every take-profit in turn.
    /// A bad entry/stop-loss pair stops the check early.
    pub fn validate_price_levels(
        &self,
        entry: Decimal,
        stop_loss: Decimal,
        take_profits: &[Decimal],
        signal_type: SignalType,
    ) -> (bool, Vec<String>) {
        if let Err(e) = self.validate_side(signal_type, entry, stop_loss, None) {
            return (false, vec![validation_message(e)]);
        }

        let errors: Vec<String> = take_profits
            .iter()
            .enumerate()
            .filter_map(|(i, tp)| {
                self.validate_side(signal_type, entry, stop_loss, Some(*tp))
                    .err()
                    .map(|e| format!("TP{}: {}", i + 1, validation_message(e)))
            })
            .collect();

        (errors.is_empty(), errors)
    }

    /// Reward distance over risk distance, rounded to two decimals.
    pub fn calculate_risk_reward_ratio(
        &self,
        entry: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        signal_type: SignalType,
    ) -> Result<Decimal> {
        let (risk, reward) = if signal_type.is_long_side() {
            (entry - stop_loss, take_profit - entry)
        } else {
            (stop_loss - entry, entry - take_profit)
        };

        if risk <= Decimal::ZERO {
            return Err(SignalError::validation(
                "risk_reward",
                "Risk must be positive (check stop loss placement)",
            ));
        }
        if reward <= Decimal::ZERO {
            return Err(SignalError::validation(
                "risk_reward",
                "Reward must be positive (check take profit placement)",
            ));
        }

        let mut ratio = (reward / risk).round_dp(2);
        ratio.rescale(2);
        Ok(ratio)
    }

    /// Keyword scan for direction. BUY and SELL win over LONG and SHORT.
    pub fn detect_signal_type(&self, message: &str) -> Option<SignalType> {
        let upper = message.to_uppercase();
        let has_buy = upper.contains("BUY");
        let has_sell = upper.contains("SELL");

        let mut found = Vec::new();
        if has_buy {
            found.push(SignalType::Buy);
        }
        if has_sell {
            found.push(SignalType::Sell);
        }
        if upper.contains("LONG") && !has_buy {
            found.push(SignalType::Long);
        }
        if upper.contains("SHORT") && !has_sell {
            found.push(SignalType::Short);
        }

        if found.len() > 1 {
            warn!("Ambiguous signal type detected: {:?}, using {}", found, found[0]);
        }

        found.first().copied()
    }

    /// Finds the first timeframe token (`4H`, `15m`, `5min`) in free text.
    /// A token outside the supported set counts as no timeframe.
    pub fn detect_timeframe(&self, message: &str) -> Option<String> {
        let token = TIMEFRAME_RE.captures(message)?.get(1)?.as_str();
        let normalized = token.to_uppercase().replace("MIN", "M");
        self.validate_timeframe(&normalized)
            .map_err(|e| debug!("Ignoring detected timeframe: {}", e))
            .ok()
    }

    pub fn validate_symbol(&self, symbol: &str) -> Result<String> {
        let normalized = symbol.trim().to_uppercase().replace('/', "");
        let normalized = normalized.trim().to_string();

        if normalized.is_empty() {
            return Err(SignalError::validation("symbol", "Symbol cannot be empty"));
        }

        if normalized.chars().count() < 3 || normalized.chars().count() > 20 {
            return Err(SignalError::validation(
                "symbol",
                format!("Invalid symbol length: '{}'", normalized),
            ));
        }

        Ok(normalized)
    }

    pub fn validate_price(&self, value: &str, field_name: &str) -> Result<Decimal> {
        let trimmed = value.trim();
        let price = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| SignalError::validation(field_name, format!("Invalid price format: {}", value)))?;

        if price <= Decimal::ZERO {
            return Err(SignalError::validation(
                field_name,
                format!("Price must be positive: {}", price),
            ));
        }

        if price > PRICE_SANITY_THRESHOLD {
            warn!("Unusually high price detected for {}: {}", field_name, price);
        }

        Ok(price)
    }

    /// Reports what keeps extracted data from forming a signal. Missing
    /// stop-loss or take-profits are tolerated.
    pub fn validate_partial_signal(&self, data: &ExtractedData) -> (bool, Vec<String>) {
        let mut errors = Vec::new();

        let present = |key: &str| data.get(key).is_some_and(|v| !v.trim().is_empty());

        if !present("symbol") {
            errors.push("Symbol is required".to_string());
        }
        if !present("entry_price") {
            errors.push("Entry price is required".to_string());
        }

        if !present("stop_loss") {
            debug!("Signal missing stop loss - will be saved as incomplete");
        }
        let has_tp = present("take_profits") || data.keys().any(|k| k.starts_with("take_profit_"));
        if !has_tp {
            debug!("Signal missing take profits - will be saved as incomplete");
        }

        (errors.is_empty(), errors)
    }
}

fn validation_message(error: SignalError) -> String {
    match error {
        SignalError::Validation { message, .. } => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_reward_buy() {
        let validator = SignalValidator::new();
        let ratio = validator
            .calculate_risk_reward_ratio(dec!(100), dec!(95), dec!(110), SignalType::Buy)
            .unwrap();
        assert_eq!(ratio, dec!(2.00));
        assert_eq!(ratio.to_string(), "2.00");
    }

    #[test]
    fn test_risk_reward_sell() {
        let validator = SignalValidator::new();
        let ratio = validator
            .calculate_risk_reward_ratio(dec!(1.0950), dec!(1.1000), dec!(1.0900), SignalType::Sell)
            .unwrap();
        assert_eq!(ratio, dec!(1.00));
    }

    #[test]
    fn test_risk_reward_rejects_inverted_levels() {
        let validator = SignalValidator::new();
        let err = validator
            .calculate_risk_reward_ratio(dec!(100), dec!(105), dec!(110), SignalType::Long)
            .unwrap_err();
        assert_eq!(err.field(), Some("risk_reward"));

        let err = validator
            .calculate_risk_reward_ratio(dec!(100), dec!(95), dec!(90), SignalType::Buy)
            .unwrap_err();
        assert_eq!(err.field(), Some("risk_reward"));
    }

    #[test]
    fn test_buy_requires_entry_above_stop_loss() {
        let validator = SignalValidator::new();
        let err = validator
            .validate_buy_signal(dec!(1.0900), dec!(1.0950), None)
            .unwrap_err();
        assert_eq!(err.field(), Some("price_logic"));
        assert!(validator
            .validate_buy_signal(dec!(1.0900), dec!(1.0850), Some(dec!(1.0950)))
            .is_ok());
        assert!(validator
            .validate_buy_signal(dec!(1.0900), dec!(1.0850), Some(dec!(1.0900)))
            .is_err());
    }

    #[test]
    fn test_sell_rules() {
        let validator = SignalValidator::new();
        assert!(validator
            .validate_sell_signal(dec!(1.2650), dec!(1.2700), Some(dec!(1.2600)))
            .is_ok());
        assert!(validator
            .validate_sell_signal(dec!(1.2650), dec!(1.2600), None)
            .is_err());
    }

    #[test]
    fn test_price_levels_prefix_take_profit_errors() {
        let validator = SignalValidator::new();
        let (ok, errors) = validator.validate_price_levels(
            dec!(100),
            dec!(95),
            &[dec!(110), dec!(99), dec!(120)],
            SignalType::Buy,
        );
        assert!(!ok);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("TP2: "));
    }

    #[test]
    fn test_price_levels_short_circuit_on_stop_loss() {
        let validator = SignalValidator::new();
        let (ok, errors) = validator.validate_price_levels(
            dec!(100),
            dec!(105),
            &[dec!(90), dec!(80)],
            SignalType::Buy,
        );
        assert!(!ok);
        assert_eq!(errors.len(), 1);
        assert!(!errors[0].starts_with("TP"));
    }

    #[test]
    fn test_short_uses_sell_rules() {
        let validator = SignalValidator::new();
        let (ok, errors) =
            validator.validate_price_levels(dec!(50), dec!(55), &[dec!(40)], SignalType::Short);
        assert!(ok, "{:?}", errors);
    }

    #[test]
    fn test_timeframe_validation() {
        let validator = SignalValidator::new();
        assert_eq!(validator.validate_timeframe("4h").unwrap(), "4H");
        assert_eq!(validator.validate_timeframe(" 1w ").unwrap(), "1W");
        assert!(validator.validate_timeframe("2H").is_err());
    }

    #[test]
    fn test_detect_signal_type() {
        let validator = SignalValidator::new();
        assert_eq!(validator.detect_signal_type("buy eurusd"), Some(SignalType::Buy));
        assert_eq!(validator.detect_signal_type("Going SHORT gold"), Some(SignalType::Short));
        assert_eq!(validator.detect_signal_type("long BTC"), Some(SignalType::Long));
        assert_eq!(validator.detect_signal_type("BUY and go long"), Some(SignalType::Buy));
        assert_eq!(validator.detect_signal_type("sell now, buy later"), Some(SignalType::Buy));
        assert_eq!(validator.detect_signal_type("market update"), None);
    }

    #[test]
    fn test_detect_timeframe() {
        let validator = SignalValidator::new();
        assert_eq!(validator.detect_timeframe("EURUSD 4h setup"), Some("4H".to_string()));
        assert_eq!(validator.detect_timeframe("scalp on 5min chart"), Some("5M".to_string()));
        assert_eq!(validator.detect_timeframe("Entry 1.0850"), None);
        assert_eq!(validator.detect_timeframe("EURUSD 2h setup"), None);
        assert_eq!(validator.detect_timeframe("target 100m away"), None);
    }

    #[test]
    fn test_validate_symbol() {
        let validator = SignalValidator::new();
        assert_eq!(validator.validate_symbol(" eur/usd ").unwrap(), "EURUSD");
        assert!(validator.validate_symbol("FX").is_err());
        assert!(validator.validate_symbol("   ").is_err());
        assert!(validator.validate_symbol(&"A".repeat(21)).is_err());
    }

    #[test]
    fn test_validate_price() {
        let validator = SignalValidator::new();
        assert_eq!(validator.validate_price(" 1.0850 ", "entry_price").unwrap(), dec!(1.0850));
        assert_eq!(validator.validate_price("2000000", "entry_price").unwrap(), dec!(2000000));

        let err = validator.validate_price("0", "stop_loss").unwrap_err();
        assert_eq!(err.field(), Some("stop_loss"));
        assert!(validator.validate_price("-3", "entry_price").is_err());
        assert!(validator.validate_price("abc", "entry_price").is_err());
    }

    #[test]
    fn test_validate_partial_signal() {
        let validator = SignalValidator::new();
        let mut data = ExtractedData::new();
        data.insert("symbol".to_string(), "EURUSD".to_string());

        let (ok, errors) = validator.validate_partial_signal(&data);
        assert!(!ok);
        assert_eq!(errors, vec!["Entry price is required".to_string()]);

        data.insert("entry_price".to_string(), "1.0850".to_string());
        assert_eq!(validator.validate_partial_signal(&data), (true, vec![]));
    }
}
