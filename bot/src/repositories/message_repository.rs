use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::prelude::*;
use sea_orm::{ActiveValue::Set, QueryOrder};
use shared::duplicate::MessageHistory;
use shared::entity::{messages, signals};
use std::sync::Arc;

const ACTIVE_SIGNAL_STATUSES: [&str; 2] = ["PENDING", "OPEN"];

/// Incoming Telegram post, before it is stored.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub channel_id: Uuid,
    pub telegram_message_id: i64,
    pub telegram_chat_id: i64,
    pub telegram_sender_id: Option<i64>,
    pub text: String,
}

#[derive(Clone)]
pub struct MessageRepository {
    db: Arc<DatabaseConnection>,
}

impl MessageRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create(&self, incoming: IncomingMessage) -> Result<messages::Model> {
        let now = Utc::now();
        let message = messages::ActiveModel {
            id: Set(Uuid::new_v4()),
            channel_id: Set(incoming.channel_id),
            telegram_message_id: Set(incoming.telegram_message_id),
            telegram_chat_id: Set(incoming.telegram_chat_id),
            telegram_sender_id: Set(incoming.telegram_sender_id),
            text: Set(incoming.text),
            is_signal: Set(false),
            processed: Set(false),
            processed_at: Set(None),
            extraction_attempts: Set(0),
            extracted_signal_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(message)
    }

    pub async fn record_attempt(&self, message: &messages::Model) -> Result<messages::Model> {
        let mut active: messages::ActiveModel = message.clone().into();
        active.extraction_attempts = Set(message.extraction_attempts + 1);
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Marks the message handled; `signal_id` is set when a signal came out of it.
    pub async fn mark_processed(&self, message_id: Uuid, signal_id: Option<Uuid>) -> Result<()> {
        let Some(message) = messages::Entity::find_by_id(message_id)
            .one(self.db.as_ref())
            .await?
        else {
            return Ok(());
        };

        let now = Utc::now();
        let mut active: messages::ActiveModel = message.into();
        active.processed = Set(true);
        active.processed_at = Set(Some(now));
        active.is_signal = Set(signal_id.is_some());
        active.extracted_signal_id = Set(signal_id);
        active.updated_at = Set(now);
        active.update(self.db.as_ref()).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageHistory for MessageRepository {
    async fn exists_with_telegram_id(
        &self,
        channel_id: Uuid,
        telegram_message_id: i64,
        exclude_id: Uuid,
    ) -> shared::Result<bool> {
        let existing = messages::Entity::find()
            .filter(messages::Column::ChannelId.eq(channel_id))
            .filter(messages::Column::TelegramMessageId.eq(telegram_message_id))
            .filter(messages::Column::Id.ne(exclude_id))
            .one(self.db.as_ref())
            .await?;
        Ok(existing.is_some())
    }

    async fn recent_messages(
        &self,
        channel_id: Uuid,
        since: DateTime<Utc>,
        exclude_id: Uuid,
    ) -> shared::Result<Vec<messages::Model>> {
        let messages = messages::Entity::find()
            .filter(messages::Column::ChannelId.eq(channel_id))
            .filter(messages::Column::CreatedAt.gte(since))
            .filter(messages::Column::Id.ne(exclude_id))
            .order_by_desc(messages::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(messages)
    }

    async fn recent_active_signals(
        &self,
        channel_id: Uuid,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> shared::Result<Vec<signals::Model>> {
        let signals = signals::Entity::find()
            .filter(signals::Column::ChannelId.eq(channel_id))
            .filter(signals::Column::Symbol.eq(symbol))
            .filter(signals::Column::Status.is_in(ACTIVE_SIGNAL_STATUSES))
            .filter(signals::Column::CreatedAt.gte(since))
            .all(self.db.as_ref())
            .await?;
        Ok(signals)
    }
}
