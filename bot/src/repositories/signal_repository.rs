use anyhow::{Context, Result};
use sea_orm::prelude::*;
use sea_orm::{QueryOrder, QuerySelect};
use shared::entity::signals;
use shared::ParsedSignal;
use std::sync::Arc;

#[derive(Clone)]
pub struct SignalRepository {
    db: Arc<DatabaseConnection>,
}

impl SignalRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn insert(&self, signal: ParsedSignal) -> Result<signals::Model> {
        let signal_id = signal.id;
        let active = signal.into_active_model()?;
        active
            .insert(self.db.as_ref())
            .await
            .with_context(|| format!("Failed to insert signal {}", signal_id))
    }

    pub async fn recent_for_channels(&self, channel_ids: &[Uuid], limit: u64) -> Result<Vec<signals::Model>> {
        if channel_ids.is_empty() {
            return Ok(Vec::new());
        }
        let signals = signals::Entity::find()
            .filter(signals::Column::ChannelId.is_in(channel_ids.iter().copied()))
            .order_by_desc(signals::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        Ok(signals)
    }
}
