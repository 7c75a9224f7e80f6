//! End-to-end parsing through an in-memory template store

use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use shared::entity::{messages, templates};
use shared::{InMemoryTemplateStore, OneMUnit, ParseOutcome, ParserEngine, SignalError, SignalType};
use std::sync::Arc;
use uuid::Uuid;

/// Helper function to create a stored template
fn template(channel_id: Uuid, name: &str, config: Value) -> templates::Model {
    let now = Utc::now();
    templates::Model {
        id: Uuid::new_v4(),
        channel_id,
        name: name.to_string(),
        description: None,
        version: 1,
        extraction_config: config,
        test_message: None,
        is_active: true,
        extraction_success_rate: 0,
        last_used_at: None,
        created_by: "1001".to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn message(channel_id: Uuid, telegram_id: i64, text: &str) -> messages::Model {
    let now = Utc::now();
    messages::Model {
        id: Uuid::new_v4(),
        channel_id,
        telegram_message_id: telegram_id,
        telegram_chat_id: -1001234567890,
        telegram_sender_id: None,
        text: text.to_string(),
        is_signal: false,
        processed: false,
        processed_at: None,
        extraction_attempts: 0,
        extracted_signal_id: None,
        created_at: now,
        updated_at: now,
    }
}

fn forex_config(priority: i32) -> Value {
    json!({
        "priority": priority,
        "fields": {
            "signal_type": { "extraction_method": "regex", "regex_pattern": "^(BUY|SELL)" },
            "symbol": { "extraction_method": "regex", "regex_pattern": "(?:BUY|SELL)\\s+([A-Z]{6})", "required": true },
            "entry_price": { "extraction_method": "regex", "regex_pattern": "Entry:\\s*([\\d.]+)", "required": true },
            "stop_loss": { "extraction_method": "regex", "regex_pattern": "SL:\\s*([\\d.]+)" },
            "take_profit_1": { "extraction_method": "regex", "regex_pattern": "TP1:\\s*([\\d.]+)" }
        }
    })
}

fn parser_for(templates: Vec<templates::Model>) -> ParserEngine {
    ParserEngine::new(Arc::new(InMemoryTemplateStore::new(templates)))
}

#[tokio::test]
async fn test_full_buy_signal() {
    let channel_id = Uuid::new_v4();
    let parser = parser_for(vec![template(channel_id, "Forex", forex_config(0))]);
    let msg = message(channel_id, 10, "BUY EURUSD Entry: 1.0850 SL: 1.0800 TP1: 1.0900");

    let outcome = parser.parse_message(&msg, channel_id, "1001").await.unwrap();
    let signal = outcome.signal().expect("signal parsed");

    assert_eq!(signal.symbol, "EURUSD");
    assert_eq!(signal.entry_price, dec!(1.0850));
    assert_eq!(signal.stop_loss.as_ref().map(|sl| sl.price), Some(dec!(1.0800)));
    assert_eq!(signal.take_profits.len(), 1);
    assert_eq!(signal.take_profits[0].level, "TP1");
    assert_eq!(signal.take_profits[0].price, dec!(1.0900));
    assert_eq!(signal.signal_type, SignalType::Buy);
    assert_eq!(signal.risk_reward_ratio, Some(dec!(1.00)));
    assert_eq!(signal.original_message_id, Some(10));
    // no timeframe, BUY: 1.0 - 0.05 - 0.05
    assert_eq!(signal.confidence_score, dec!(0.90));
    assert_eq!(signal.extraction_metadata.extraction_method, "template_based");
    assert_eq!(
        signal.extraction_metadata.extracted_fields,
        vec!["entry_price", "signal_type", "stop_loss", "symbol", "take_profit_1"]
    );
}

#[tokio::test]
async fn test_higher_priority_template_wins() {
    let channel_id = Uuid::new_v4();
    let low = template(channel_id, "P1", forex_config(1));
    let high = template(channel_id, "P2", forex_config(5));
    let high_id = high.id;
    let parser = parser_for(vec![low, high]);

    let msg = message(channel_id, 11, "SELL GBPUSD Entry: 1.2650 SL: 1.2700 TP1: 1.2600");
    let outcome = parser.parse_message(&msg, channel_id, "1001").await.unwrap();

    let signal = outcome.signal().expect("signal parsed");
    assert_eq!(signal.template_id, high_id);
    assert_eq!(signal.signal_type, SignalType::Sell);
}

#[tokio::test]
async fn test_falls_through_to_next_template() {
    let channel_id = Uuid::new_v4();
    let strict = template(
        channel_id,
        "Needs timeframe",
        json!({
            "priority": 9,
            "fields": {
                "symbol": { "regex_pattern": "([A-Z]{6})", "required": true },
                "entry_price": { "regex_pattern": "Entry:\\s*([\\d.]+)", "required": true },
                "timeframe": { "regex_pattern": "TF:\\s*(\\w+)", "required": true }
            }
        }),
    );
    let fallback = template(channel_id, "Forex", forex_config(0));
    let fallback_id = fallback.id;
    let parser = parser_for(vec![strict, fallback]);

    let msg = message(channel_id, 12, "BUY EURUSD Entry: 1.0850");
    let outcome = parser.parse_message(&msg, channel_id, "1001").await.unwrap();
    let signal = outcome.signal().expect("signal parsed");

    assert_eq!(signal.template_id, fallback_id);
    assert_eq!(signal.confidence_score, dec!(0.60));
    assert!(signal.stop_loss.is_none());
    assert!(signal.risk_reward_ratio.is_none());
}

#[tokio::test]
async fn test_no_templates_is_unparsed() {
    let channel_id = Uuid::new_v4();
    let parser = parser_for(vec![template(Uuid::new_v4(), "Elsewhere", forex_config(0))]);
    let msg = message(channel_id, 13, "BUY EURUSD Entry: 1.0850");

    let outcome = parser.parse_message(&msg, channel_id, "1001").await.unwrap();
    assert_eq!(
        outcome,
        ParseOutcome::Unparsed(format!("No active templates found for channel {}", channel_id))
    );
}

#[tokio::test]
async fn test_bad_price_logic_is_still_parsed() {
    let channel_id = Uuid::new_v4();
    let parser = parser_for(vec![template(channel_id, "Forex", forex_config(0))]);
    // stop loss above entry on a BUY
    let msg = message(channel_id, 14, "BUY EURUSD Entry: 1.0850 SL: 1.0900 TP1: 1.0950");

    let outcome = parser.parse_message(&msg, channel_id, "1001").await.unwrap();
    let signal = outcome.signal().expect("advisory check must not reject");
    assert!(signal.risk_reward_ratio.is_none());
}

#[tokio::test]
async fn test_broken_regex_propagates() {
    let channel_id = Uuid::new_v4();
    let parser = parser_for(vec![template(
        channel_id,
        "Broken",
        json!({ "fields": { "symbol": { "regex_pattern": "([A-Z" } } }),
    )]);
    let msg = message(channel_id, 15, "BUY EURUSD Entry: 1.0850");

    let err = parser.parse_message(&msg, channel_id, "1001").await.unwrap_err();
    assert!(matches!(err, SignalError::Extraction { .. }));
}

#[tokio::test]
async fn test_one_m_timeframe_needs_declared_unit() {
    let channel_id = Uuid::new_v4();
    let fields = json!({
        "symbol": { "regex_pattern": "([A-Z]{6})", "required": true },
        "entry_price": { "regex_pattern": "@\\s*([\\d.]+)", "required": true },
        "timeframe": { "regex_pattern": "\\b(\\d+[MHDW])\\b" }
    });
    let declared = template(
        channel_id,
        "Scalper",
        json!({ "priority": 2, "timeframe_one_m": "minute", "fields": fields.clone() }),
    );
    let parser = parser_for(vec![declared]);
    let msg = message(channel_id, 16, "SELL XAUUSD @ 2350.5 1M");

    let outcome = parser.parse_message(&msg, channel_id, "1001").await.unwrap();
    let signal = outcome.signal().expect("signal parsed");
    assert_eq!(signal.timeframe.as_deref(), Some("1M"));
    assert_eq!(signal.extraction_metadata.timeframe_unit, Some(OneMUnit::Minute));
    assert!(!signal.extraction_metadata.timeframe_ambiguous);

    let undeclared = template(channel_id, "Scalper", json!({ "fields": fields }));
    let parser = parser_for(vec![undeclared]);
    let outcome = parser.parse_message(&msg, channel_id, "1001").await.unwrap();
    let signal = outcome.signal().expect("signal parsed");
    assert!(signal.extraction_metadata.timeframe_unit.is_none());
    assert!(signal.extraction_metadata.timeframe_ambiguous);
}

#[tokio::test]
async fn test_batch_counts_failures() {
    let channel_id = Uuid::new_v4();
    let parser = parser_for(vec![template(channel_id, "Forex", forex_config(0))]);
    let batch = vec![
        message(channel_id, 20, "BUY EURUSD Entry: 1.0850 SL: 1.0800 TP1: 1.0900"),
        message(channel_id, 21, "Good morning traders!"),
        message(channel_id, 22, "SELL USDJPY Entry: 151.20 SL: 151.80"),
        message(channel_id, 23, "BUY EURUSD no entry given"),
    ];

    let (signals, stats) = parser.parse_batch(&batch, channel_id, "1001").await;

    assert_eq!(signals.len(), 2);
    assert_eq!(stats.total_messages, 4);
    assert_eq!(stats.successful_extractions, 2);
    assert_eq!(stats.failed_extractions, 2);
    assert_eq!(stats.errors.len(), 2);
}

#[tokio::test]
async fn test_batch_survives_broken_template() {
    let channel_id = Uuid::new_v4();
    let parser = parser_for(vec![template(
        channel_id,
        "Broken",
        json!({ "fields": { "symbol": { "regex_pattern": "(" } } }),
    )]);
    let batch = vec![
        message(channel_id, 30, "BUY EURUSD Entry: 1.0850"),
        message(channel_id, 31, "SELL GBPUSD Entry: 1.2650"),
    ];

    let (signals, stats) = parser.parse_batch(&batch, channel_id, "1001").await;
    assert!(signals.is_empty());
    assert_eq!(stats.failed_extractions, 2);
    assert_eq!(stats.errors.len(), 2);
}

#[tokio::test]
async fn test_parsed_signal_maps_to_active_model() {
    let channel_id = Uuid::new_v4();
    let parser = parser_for(vec![template(channel_id, "Forex", forex_config(0))]);
    let msg = message(channel_id, 40, "BUY EURUSD Entry: 1.0850 SL: 1.0800 TP1: 1.0900");

    let outcome = parser.parse_message(&msg, channel_id, "1001").await.unwrap();
    let ParseOutcome::Parsed(signal) = outcome else {
        panic!("expected a parsed signal");
    };
    let model = signal.into_active_model().unwrap();

    assert_eq!(model.symbol.clone().unwrap(), "EURUSD");
    assert_eq!(model.status.clone().unwrap(), "PENDING");
    assert_eq!(model.signal_type.clone().unwrap(), "BUY");
    assert_eq!(model.take_profits.clone().unwrap()[0]["level"], "TP1");
}
