//! Duplicate message detection

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::entity::{messages, signals};
use crate::error::{Result, SignalError};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.90;
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// Relative entry-price tolerance for the signal-data check (0.1%).
pub const PRICE_TOLERANCE: Decimal = dec!(0.001);

static SYMBOL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Z]{3}USD|XAU/USD|XAUUSD)\b").expect("valid symbol pattern")
});
static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:entry|@|\()\s*([0-9]+\.[0-9]+)").expect("valid entry pattern")
});

/// Read access to what a channel has already seen.
#[async_trait]
pub trait MessageHistory: Send + Sync {
    async fn exists_with_telegram_id(
        &self,
        channel_id: Uuid,
        telegram_message_id: i64,
        exclude_id: Uuid,
    ) -> Result<bool>;

    async fn recent_messages(
        &self,
        channel_id: Uuid,
        since: DateTime<Utc>,
        exclude_id: Uuid,
    ) -> Result<Vec<messages::Model>>;

    /// Signals for `symbol` that are still PENDING or OPEN.
    async fn recent_active_signals(
        &self,
        channel_id: Uuid,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<signals::Model>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    TelegramId,
    SimilarText,
    SignalData,
}

pub struct DuplicateDetectionService {
    history: Arc<dyn MessageHistory>,
    similarity_threshold: f64,
    lookback_hours: i64,
}

impl DuplicateDetectionService {
    pub fn new(history: Arc<dyn MessageHistory>, similarity_threshold: f64, lookback_hours: i64) -> Self {
        Self {
            history,
            similarity_threshold,
            lookback_hours,
        }
    }

    pub fn with_defaults(history: Arc<dyn MessageHistory>) -> Self {
        Self::new(history, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_LOOKBACK_HOURS)
    }

    pub async fn is_duplicate(&self, message: &messages::Model, channel_id: Uuid) -> Result<bool> {
        Ok(self.find_duplicate(message, channel_id).await?.is_some())
    }

    /// Runs the checks in order (Telegram id, text similarity, signal data)
    /// and reports the first that matches.
    pub async fn find_duplicate(
        &self,
        message: &messages::Model,
        channel_id: Uuid,
    ) -> Result<Option<DuplicateKind>> {
        if self
            .history
            .exists_with_telegram_id(channel_id, message.telegram_message_id, message.id)
            .await?
        {
            info!("Duplicate detected by Telegram message ID: {}", message.telegram_message_id);
            return Ok(Some(DuplicateKind::TelegramId));
        }

        let since = Utc::now() - Duration::hours(self.lookback_hours);

        let recent = self.history.recent_messages(channel_id, since, message.id).await?;
        for other in &recent {
            let score = similarity(&message.text, &other.text);
            if score >= self.similarity_threshold {
                info!(
                    "Duplicate detected by text similarity: {:.2} (message {})",
                    score, other.id
                );
                return Ok(Some(DuplicateKind::SimilarText));
            }
        }

        if let Some((symbol, entry)) = parse_signal_hint(&message.text) {
            let candidates = self
                .history
                .recent_active_signals(channel_id, &symbol, since)
                .await?;
            if let Some(existing) = candidates.iter().find(|s| prices_match(s.entry_price, entry)) {
                info!(
                    "Duplicate detected by signal data: {} @ {} (signal {})",
                    symbol, entry, existing.id
                );
                return Ok(Some(DuplicateKind::SignalData));
            }
        }

        debug!("Message {} is not a duplicate", message.id);
        Ok(None)
    }

    /// Like `find_duplicate`, but a match becomes `SignalError::Duplicate`.
    pub async fn detect_or_reject(&self, message: &messages::Model, channel_id: Uuid) -> Result<()> {
        match self.find_duplicate(message, channel_id).await? {
            Some(kind) => Err(SignalError::Duplicate(format!(
                "Message {} matches an earlier message ({:?})",
                message.telegram_message_id, kind
            ))),
            None => Ok(()),
        }
    }
}

/// Ratcliff/Obershelp similarity of two texts, case-insensitive, in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    // longest common block, earliest on ties
    let (mut best_len, mut best_a, mut best_b) = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut row = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                row[j + 1] = prev[j] + 1;
                if row[j + 1] > best_len {
                    best_len = row[j + 1];
                    best_a = i + 1 - best_len;
                    best_b = j + 1 - best_len;
                }
            }
        }
        prev = row;
    }

    if best_len == 0 {
        return 0;
    }

    best_len
        + matching_chars(&a[..best_a], &b[..best_b])
        + matching_chars(&a[best_a + best_len..], &b[best_b + best_len..])
}

/// Rough symbol and entry guess straight from text, no template needed.
pub fn parse_signal_hint(text: &str) -> Option<(String, Decimal)> {
    let symbol = SYMBOL_RE.captures(text)?.get(1)?.as_str().to_uppercase().replace('/', "");
    let entry = Decimal::from_str(ENTRY_RE.captures(text)?.get(1)?.as_str()).ok()?;
    Some((symbol, entry))
}

fn prices_match(existing: Decimal, candidate: Decimal) -> bool {
    if existing.is_zero() {
        return candidate.is_zero();
    }
    ((existing - candidate).abs() / existing.abs()) <= PRICE_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeHistory {
        telegram_ids: Vec<i64>,
        messages: Vec<messages::Model>,
        signals: Vec<signals::Model>,
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl MessageHistory for FakeHistory {
        async fn exists_with_telegram_id(&self, _: Uuid, telegram_message_id: i64, _: Uuid) -> Result<bool> {
            self.calls.lock().unwrap().push("telegram_id");
            Ok(self.telegram_ids.contains(&telegram_message_id))
        }

        async fn recent_messages(&self, _: Uuid, _: DateTime<Utc>, exclude_id: Uuid) -> Result<Vec<messages::Model>> {
            self.calls.lock().unwrap().push("recent_messages");
            Ok(self.messages.iter().filter(|m| m.id != exclude_id).cloned().collect())
        }

        async fn recent_active_signals(&self, _: Uuid, symbol: &str, _: DateTime<Utc>) -> Result<Vec<signals::Model>> {
            self.calls.lock().unwrap().push("recent_signals");
            Ok(self.signals.iter().filter(|s| s.symbol == symbol).cloned().collect())
        }
    }

    fn message(telegram_id: i64, text: &str) -> messages::Model {
        let now = Utc::now();
        messages::Model {
            id: Uuid::new_v4(),
            channel_id: Uuid::nil(),
            telegram_message_id: telegram_id,
            telegram_chat_id: -100,
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

    fn pending_signal(symbol: &str, entry: Decimal) -> signals::Model {
        let now = Utc::now();
        signals::Model {
            id: Uuid::new_v4(),
            channel_id: Uuid::nil(),
            template_id: Uuid::new_v4(),
            user_id: "42".to_string(),
            original_message_id: Some(1),
            original_message_text: String::new(),
            symbol: symbol.to_string(),
            entry_price: entry,
            take_profits: serde_json::json!([]),
            stop_loss: None,
            signal_type: "BUY".to_string(),
            timeframe: None,
            status: "PENDING".to_string(),
            confidence_score: dec!(0.60),
            extraction_metadata: None,
            risk_reward_ratio: None,
            user_notes: None,
            performance_outcome: None,
            close_price: None,
            pnl: None,
            pnl_percent: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("BUY EURUSD", "buy eurusd"), 1.0);
        assert_eq!(similarity("abcd", "wxyz"), 0.0);
    }

    #[test]
    fn test_similarity_ratio() {
        // "abcd" vs "bcde": one block of 3 -> 2*3/8
        assert!((similarity("abcd", "bcde") - 0.75).abs() < 1e-9);
        let a = "BUY EURUSD Entry: 1.0850 SL: 1.0800 TP1: 1.0900";
        let b = "BUY EURUSD Entry: 1.0851 SL: 1.0800 TP1: 1.0900";
        assert!(similarity(a, b) > 0.95);
    }

    #[test]
    fn test_parse_signal_hint() {
        assert_eq!(
            parse_signal_hint("BUY XAU/USD Entry 2350.50"),
            Some(("XAUUSD".to_string(), dec!(2350.50)))
        );
        assert_eq!(parse_signal_hint("GBPUSD short"), None);
    }

    #[test]
    fn test_prices_match_tolerance() {
        assert!(prices_match(dec!(1.0850), dec!(1.0855)));
        assert!(!prices_match(dec!(1.0850), dec!(1.0900)));
    }

    #[tokio::test]
    async fn test_telegram_id_short_circuits() {
        let history = Arc::new(FakeHistory {
            telegram_ids: vec![7],
            ..Default::default()
        });
        let service = DuplicateDetectionService::with_defaults(history.clone());

        let kind = service.find_duplicate(&message(7, "hello"), Uuid::nil()).await.unwrap();
        assert_eq!(kind, Some(DuplicateKind::TelegramId));
        assert_eq!(*history.calls.lock().unwrap(), vec!["telegram_id"]);
    }

    #[tokio::test]
    async fn test_similar_text_is_duplicate() {
        let history = Arc::new(FakeHistory {
            messages: vec![message(1, "SELL GBPUSD entry 1.2650 sl 1.2700")],
            ..Default::default()
        });
        let service = DuplicateDetectionService::with_defaults(history);

        let candidate = message(2, "SELL GBPUSD Entry 1.2650 SL 1.2700!");
        assert!(service.is_duplicate(&candidate, Uuid::nil()).await.unwrap());
    }

    #[tokio::test]
    async fn test_signal_data_match() {
        let history = Arc::new(FakeHistory {
            signals: vec![pending_signal("EURUSD", dec!(1.0850))],
            ..Default::default()
        });
        let service = DuplicateDetectionService::with_defaults(history);

        let candidate = message(3, "New idea on EURUSD, entry 1.0851, targets later");
        let err = service.detect_or_reject(&candidate, Uuid::nil()).await.unwrap_err();
        assert!(matches!(err, SignalError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_fresh_message_passes() {
        let history = Arc::new(FakeHistory {
            messages: vec![message(1, "Weekly market recap")],
            signals: vec![pending_signal("EURUSD", dec!(1.2000))],
            ..Default::default()
        });
        let service = DuplicateDetectionService::with_defaults(history);

        let candidate = message(4, "BUY EURUSD Entry 1.0850");
        assert!(service.detect_or_reject(&candidate, Uuid::nil()).await.is_ok());
    }
}
