//! Per-message processing: rate limit, duplicate check, parsing,
//! persistence and bookkeeping.

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use sea_orm::prelude::*;
use shared::entity::{channels, messages};
use shared::{DuplicateDetectionService, ParseOutcome, ParsedSignal, ParserEngine, SignalError, SignalValidator};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::repositories::{ChannelRepository, MessageRepository, SignalRepository};
use crate::services::extraction_history::{ExtractionAttempt, ExtractionHistoryService};
use crate::services::rate_limiter::RateLimiter;
use crate::services::template_manager::TemplateManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Success,
    RateLimited,
    Duplicate,
    ExtractionFailed,
    ValidationFailed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    RateLimit,
    DuplicateCheck,
    Extraction,
    Validation,
    Persistence,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::RateLimit => "rate_limit",
            PipelineStage::DuplicateCheck => "duplicate_check",
            PipelineStage::Extraction => "extraction",
            PipelineStage::Validation => "validation",
            PipelineStage::Persistence => "persistence",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub message_id: Uuid,
    pub status: PipelineStatus,
    pub signal_id: Option<Uuid>,
    pub error: Option<String>,
    pub error_stage: Option<PipelineStage>,
}

impl PipelineResult {
    fn success(message_id: Uuid, signal_id: Uuid) -> Self {
        Self {
            message_id,
            status: PipelineStatus::Success,
            signal_id: Some(signal_id),
            error: None,
            error_stage: None,
        }
    }

    fn failed(message_id: Uuid, status: PipelineStatus, stage: PipelineStage, error: impl Into<String>) -> Self {
        Self {
            message_id,
            status,
            signal_id: None,
            error: Some(error.into()),
            error_stage: Some(stage),
        }
    }
}

/// A message turned away before anything is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub status: PipelineStatus,
    pub stage: PipelineStage,
    pub reason: String,
    pub template_id: Option<Uuid>,
}

impl Rejection {
    fn new(status: PipelineStatus, stage: PipelineStage, reason: impl Into<String>) -> Self {
        Self {
            status,
            stage,
            reason: reason.into(),
            template_id: None,
        }
    }

    fn into_result(self, message_id: Uuid) -> PipelineResult {
        PipelineResult::failed(message_id, self.status, self.stage, self.reason)
    }
}

/// The stages that decide whether a message becomes a signal. Works only
/// through the template and history seams, so nothing here writes.
pub struct SignalScreen {
    parser: ParserEngine,
    duplicates: DuplicateDetectionService,
    rate_limiter: Option<Arc<RateLimiter>>,
    validator: SignalValidator,
}

impl SignalScreen {
    pub fn new(
        parser: ParserEngine,
        duplicates: DuplicateDetectionService,
        rate_limiter: Option<Arc<RateLimiter>>,
    ) -> Self {
        Self {
            parser,
            duplicates,
            rate_limiter,
            validator: SignalValidator::new(),
        }
    }

    /// Rate limit, then duplicate check.
    pub async fn admit(&self, message: &messages::Model, channel: &channels::Model) -> Result<(), Rejection> {
        if let Some(limiter) = &self.rate_limiter {
            let sender = message.telegram_sender_id.map(|id| id.to_string());
            if let Err(limited) = limiter.acquire(&channel.id.to_string(), sender.as_deref()).await {
                let err = SignalError::RateLimited {
                    message: limited.to_string(),
                    retry_after_secs: limited.retry_after_secs,
                };
                warn!("{}", err);
                return Err(Rejection::new(PipelineStatus::RateLimited, PipelineStage::RateLimit, err.to_string()));
            }
        }

        match self.duplicates.detect_or_reject(message, channel.id).await {
            Ok(()) => Ok(()),
            Err(SignalError::Duplicate(reason)) => {
                Err(Rejection::new(PipelineStatus::Duplicate, PipelineStage::DuplicateCheck, reason))
            }
            Err(e) => Err(Rejection::new(PipelineStatus::Error, PipelineStage::DuplicateCheck, e.to_string())),
        }
    }

    /// Template parsing, then the structural check.
    pub async fn extract(&self, message: &messages::Model, channel: &channels::Model) -> Result<ParsedSignal, Rejection> {
        let signal = match self.parser.parse_message(message, channel.id, &channel.user_id).await {
            Ok(ParseOutcome::Parsed(signal)) => *signal,
            Ok(ParseOutcome::Unparsed(reason)) => {
                return Err(Rejection::new(PipelineStatus::ExtractionFailed, PipelineStage::Extraction, reason));
            }
            Err(e) => return Err(Rejection::new(PipelineStatus::Error, PipelineStage::Extraction, e.to_string())),
        };

        match self.structural_check(&signal) {
            Ok(()) => Ok(signal),
            Err(reason) => Err(Rejection {
                template_id: Some(signal.template_id),
                ..Rejection::new(PipelineStatus::ValidationFailed, PipelineStage::Validation, reason)
            }),
        }
    }

    /// Last gate before persistence.
    fn structural_check(&self, signal: &ParsedSignal) -> Result<(), String> {
        self.validator
            .validate_symbol(&signal.symbol)
            .map_err(|e| e.to_string())?;
        if signal.entry_price <= Decimal::ZERO {
            return Err(format!("Entry price must be positive: {}", signal.entry_price));
        }
        if signal.confidence_score < Decimal::ZERO || signal.confidence_score > Decimal::ONE {
            return Err(format!("Confidence score out of range: {}", signal.confidence_score));
        }
        Ok(())
    }
}

pub struct SignalProcessingPipeline {
    screen: SignalScreen,
    channels: ChannelRepository,
    messages: Arc<MessageRepository>,
    signals: SignalRepository,
    templates: Arc<TemplateManager>,
    history: ExtractionHistoryService,
}

impl SignalProcessingPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parser: ParserEngine,
        duplicates: DuplicateDetectionService,
        rate_limiter: Option<Arc<RateLimiter>>,
        channels: ChannelRepository,
        messages: Arc<MessageRepository>,
        signals: SignalRepository,
        templates: Arc<TemplateManager>,
        history: ExtractionHistoryService,
    ) -> Self {
        Self {
            screen: SignalScreen::new(parser, duplicates, rate_limiter),
            channels,
            messages,
            signals,
            templates,
            history,
        }
    }

    /// Queue entry point: loads the owning channel, then processes.
    pub async fn process_stored_message(&self, message: messages::Model) -> Result<PipelineResult> {
        let channel = self
            .channels
            .find_by_id(message.channel_id)
            .await?
            .ok_or_else(|| anyhow!("Channel {} not found for message {}", message.channel_id, message.id))?;

        let result = self.process_message(&message, &channel).await;
        match result.status {
            PipelineStatus::Success => info!(
                "✅ Message {} -> signal {:?}",
                message.id, result.signal_id
            ),
            PipelineStatus::Error => error!(
                "❌ Message {} failed at {:?}: {:?}",
                message.id, result.error_stage, result.error
            ),
            _ => debug!(
                "Message {} not turned into a signal ({:?}): {:?}",
                message.id, result.status, result.error
            ),
        }
        Ok(result)
    }

    pub async fn process_message(&self, message: &messages::Model, channel: &channels::Model) -> PipelineResult {
        let message_id = message.id;

        if let Err(rejected) = self.screen.admit(message, channel).await {
            if rejected.status == PipelineStatus::Duplicate {
                self.finish_unparsed(message, channel, None, &rejected.reason).await;
            }
            return rejected.into_result(message_id);
        }

        if let Err(e) = self.messages.record_attempt(message).await {
            warn!("Could not record extraction attempt for {}: {:#}", message_id, e);
        }

        let signal = match self.screen.extract(message, channel).await {
            Ok(signal) => signal,
            Err(rejected) => {
                self.finish_unparsed(message, channel, rejected.template_id, &rejected.reason).await;
                return rejected.into_result(message_id);
            }
        };

        let template_id = signal.template_id;
        let confidence = signal.confidence_score;
        let extracted_fields = serde_json::json!(signal.extraction_metadata.extracted_fields);

        let stored = match self.signals.insert(signal).await {
            Ok(stored) => stored,
            Err(e) => {
                error!("Failed to store signal from message {}: {:#}", message_id, e);
                return PipelineResult::failed(message_id, PipelineStatus::Error, PipelineStage::Persistence, e.to_string());
            }
        };

        if let Err(e) = self.channels.record_signal(channel, stored.created_at).await {
            warn!("Could not update counters for channel {}: {:#}", channel.id, e);
        }
        if let Err(e) = self.messages.mark_processed(message_id, Some(stored.id)).await {
            warn!("Could not mark message {} processed: {:#}", message_id, e);
        }

        let attempt = ExtractionAttempt {
            channel_id: channel.id,
            message_id: Some(message_id),
            signal_id: Some(stored.id),
            was_successful: true,
            extracted_data: Some(extracted_fields),
            original_message: Some(message.text.clone()),
            confidence_score: confidence,
            ..Default::default()
        };
        if let Err(e) = self.templates.update_extraction_stats(template_id, attempt).await {
            warn!("Could not update extraction stats for template {}: {:#}", template_id, e);
        }

        PipelineResult::success(message_id, stored.id)
    }

    async fn finish_unparsed(
        &self,
        message: &messages::Model,
        channel: &channels::Model,
        template_id: Option<Uuid>,
        reason: &str,
    ) {
        if let Err(e) = self.messages.mark_processed(message.id, None).await {
            warn!("Could not mark message {} processed: {:#}", message.id, e);
        }

        let attempt = ExtractionAttempt {
            channel_id: channel.id,
            template_id,
            message_id: Some(message.id),
            was_successful: false,
            error_message: Some(reason.to_string()),
            original_message: Some(message.text.clone()),
            ..Default::default()
        };
        if let Err(e) = self.history.log_attempt(attempt).await {
            warn!("Could not record extraction history for {}: {:#}", message.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use shared::entity::{signals, templates};
    use shared::{MessageHistory, TemplateStore};
    use std::sync::Mutex;
    use std::time::Duration;

    type CallLog = Arc<Mutex<Vec<&'static str>>>;

    struct FakeTemplates {
        inner: shared::InMemoryTemplateStore,
        calls: CallLog,
    }

    #[async_trait]
    impl TemplateStore for FakeTemplates {
        async fn active_templates(&self, channel_id: Uuid) -> shared::Result<Vec<templates::Model>> {
            self.calls.lock().unwrap().push("templates");
            self.inner.active_templates(channel_id).await
        }
    }

    struct FakeHistory {
        seen_telegram_ids: Vec<i64>,
        calls: CallLog,
    }

    #[async_trait]
    impl MessageHistory for FakeHistory {
        async fn exists_with_telegram_id(&self, _: Uuid, telegram_message_id: i64, _: Uuid) -> shared::Result<bool> {
            self.calls.lock().unwrap().push("history");
            Ok(self.seen_telegram_ids.contains(&telegram_message_id))
        }

        async fn recent_messages(&self, _: Uuid, _: DateTime<Utc>, _: Uuid) -> shared::Result<Vec<messages::Model>> {
            Ok(Vec::new())
        }

        async fn recent_active_signals(&self, _: Uuid, _: &str, _: DateTime<Utc>) -> shared::Result<Vec<signals::Model>> {
            Ok(Vec::new())
        }
    }

    fn channel() -> channels::Model {
        let now = Utc::now();
        channels::Model {
            id: Uuid::new_v4(),
            user_id: "1001".to_string(),
            name: "Forex VIP".to_string(),
            description: None,
            telegram_chat_id: -1001234567890,
            provider_name: None,
            is_active: true,
            signal_count: 0,
            last_signal_at: None,
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
            telegram_sender_id: Some(42),
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

    fn forex_template(channel_id: Uuid) -> templates::Model {
        let now = Utc::now();
        templates::Model {
            id: Uuid::new_v4(),
            channel_id,
            name: "Forex".to_string(),
            description: None,
            version: 1,
            extraction_config: json!({
                "fields": {
                    "signal_type": { "extraction_method": "regex", "regex_pattern": "^(BUY|SELL)" },
                    "symbol": { "extraction_method": "regex", "regex_pattern": "(?:BUY|SELL)\\s+([A-Z]{6})", "required": true },
                    "entry_price": { "extraction_method": "regex", "regex_pattern": "Entry:\\s*([\\d.]+)", "required": true },
                    "stop_loss": { "extraction_method": "regex", "regex_pattern": "SL:\\s*([\\d.]+)" },
                    "take_profit_1": { "extraction_method": "regex", "regex_pattern": "TP1:\\s*([\\d.]+)" },
                    "timeframe": { "extraction_method": "regex", "regex_pattern": "\\b(\\d+[mhdw])\\b" }
                }
            }),
            test_message: None,
            is_active: true,
            extraction_success_rate: 0,
            last_used_at: None,
            created_by: "1001".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn screen_for(
        channel_id: Uuid,
        seen_telegram_ids: Vec<i64>,
        rate_limiter: Option<Arc<RateLimiter>>,
    ) -> (SignalScreen, CallLog) {
        let calls = CallLog::default();
        let templates = FakeTemplates {
            inner: shared::InMemoryTemplateStore::new(vec![forex_template(channel_id)]),
            calls: calls.clone(),
        };
        let history = FakeHistory {
            seen_telegram_ids,
            calls: calls.clone(),
        };
        let screen = SignalScreen::new(
            ParserEngine::new(Arc::new(templates)),
            DuplicateDetectionService::new(Arc::new(history), 0.90, 24),
            rate_limiter,
        );
        (screen, calls)
    }

    /// Runs the screen the way `process_message` does.
    async fn screen_message(screen: &SignalScreen, msg: &messages::Model, channel: &channels::Model) -> Result<ParsedSignal, Rejection> {
        screen.admit(msg, channel).await?;
        screen.extract(msg, channel).await
    }

    const SIGNAL: &str = "BUY EURUSD Entry: 1.0850 SL: 1.0800 TP1: 1.0900";

    #[test]
    fn test_result_constructors() {
        let id = Uuid::new_v4();
        let signal_id = Uuid::new_v4();

        let ok = PipelineResult::success(id, signal_id);
        assert_eq!(ok.status, PipelineStatus::Success);
        assert_eq!(ok.signal_id, Some(signal_id));
        assert!(ok.error_stage.is_none());

        let failed = PipelineResult::failed(id, PipelineStatus::Duplicate, PipelineStage::DuplicateCheck, "seen");
        assert_eq!(failed.error.as_deref(), Some("seen"));
        assert_eq!(failed.error_stage.map(|s| s.to_string()).as_deref(), Some("duplicate_check"));
    }

    #[tokio::test]
    async fn test_clean_message_checks_history_before_templates() {
        let channel = channel();
        let (screen, calls) = screen_for(channel.id, vec![], None);

        let signal = screen_message(&screen, &message(channel.id, 10, SIGNAL), &channel).await.unwrap();

        assert_eq!(signal.symbol, "EURUSD");
        assert_eq!(*calls.lock().unwrap(), vec!["history", "templates"]);
    }

    #[tokio::test]
    async fn test_duplicate_never_reaches_parsing() {
        let channel = channel();
        let (screen, calls) = screen_for(channel.id, vec![10], None);

        let rejected = screen_message(&screen, &message(channel.id, 10, SIGNAL), &channel).await.unwrap_err();

        assert_eq!(rejected.status, PipelineStatus::Duplicate);
        assert_eq!(rejected.stage, PipelineStage::DuplicateCheck);
        assert_eq!(*calls.lock().unwrap(), vec!["history"]);

        let result = rejected.into_result(Uuid::new_v4());
        assert!(result.signal_id.is_none());
    }

    #[tokio::test]
    async fn test_unparsed_message_is_extraction_failure() {
        let channel = channel();
        let (screen, _) = screen_for(channel.id, vec![], None);

        let rejected = screen_message(&screen, &message(channel.id, 11, "Good morning traders"), &channel)
            .await
            .unwrap_err();

        assert_eq!(rejected.status, PipelineStatus::ExtractionFailed);
        assert_eq!(rejected.stage, PipelineStage::Extraction);
        assert!(rejected.template_id.is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_runs_before_duplicate_check() {
        let channel = channel();
        let limiter = Arc::new(RateLimiter::new(100, 1, 100, Duration::from_secs(60)));
        let (screen, calls) = screen_for(channel.id, vec![], Some(limiter));

        screen_message(&screen, &message(channel.id, 12, SIGNAL), &channel).await.unwrap();
        calls.lock().unwrap().clear();

        let rejected = screen_message(&screen, &message(channel.id, 13, SIGNAL), &channel).await.unwrap_err();

        assert_eq!(rejected.status, PipelineStatus::RateLimited);
        assert_eq!(rejected.stage, PipelineStage::RateLimit);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_set_timeframe_is_dropped() {
        let channel = channel();
        let (screen, _) = screen_for(channel.id, vec![], None);

        let msg = message(channel.id, 14, "BUY EURUSD 4h Entry: 1.0850 SL: 1.0800 TP1: 1.0900");
        let signal = screen_message(&screen, &msg, &channel).await.unwrap();
        assert_eq!(signal.timeframe.as_deref(), Some("4H"));

        let msg = message(channel.id, 15, "BUY EURUSD 2h Entry: 1.0850 SL: 1.0800 TP1: 1.0900");
        let signal = screen_message(&screen, &msg, &channel).await.unwrap();
        assert_eq!(signal.timeframe, None);
    }
}
