use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::prelude::*;
use sea_orm::{ActiveValue::Set, QueryOrder};
use shared::entity::channels;
use std::sync::Arc;

#[derive(Clone)]
pub struct ChannelRepository {
    db: Arc<DatabaseConnection>,
}

impl ChannelRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, channel_id: Uuid) -> Result<Option<channels::Model>> {
        let channel = channels::Entity::find_by_id(channel_id)
            .one(self.db.as_ref())
            .await?;
        Ok(channel)
    }

    pub async fn find_by_chat_id(&self, telegram_chat_id: i64) -> Result<Option<channels::Model>> {
        let channel = channels::Entity::find()
            .filter(channels::Column::TelegramChatId.eq(telegram_chat_id))
            .one(self.db.as_ref())
            .await?;
        Ok(channel)
    }

    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<channels::Model>> {
        let channels = channels::Entity::find()
            .filter(channels::Column::UserId.eq(user_id))
            .order_by_asc(channels::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(channels)
    }

    pub async fn create(
        &self,
        user_id: &str,
        telegram_chat_id: i64,
        name: &str,
        provider_name: Option<String>,
    ) -> Result<channels::Model> {
        let now = Utc::now();
        let channel = channels::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id.to_string()),
            name: Set(name.to_string()),
            description: Set(None),
            telegram_chat_id: Set(telegram_chat_id),
            provider_name: Set(provider_name),
            is_active: Set(true),
            signal_count: Set(0),
            last_signal_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(channel)
    }

    /// Bumps the signal counter after a signal was stored.
    pub async fn record_signal(&self, channel: &channels::Model, at: DateTime<Utc>) -> Result<channels::Model> {
        let mut active: channels::ActiveModel = channel.clone().into();
        active.signal_count = Set(channel.signal_count + 1);
        active.last_signal_at = Set(Some(at));
        active.updated_at = Set(at);
        Ok(active.update(self.db.as_ref()).await?)
    }
}
