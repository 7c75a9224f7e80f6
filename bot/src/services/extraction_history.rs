use anyhow::Result;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::prelude::*;
use sea_orm::ActiveValue::Set;
use serde_json::Value;
use shared::entity::extraction_history;
use std::collections::HashMap;
use std::sync::Arc;

/// One extraction attempt, successful or not.
#[derive(Debug, Clone, Default)]
pub struct ExtractionAttempt {
    pub channel_id: Uuid,
    pub template_id: Option<Uuid>,
    pub message_id: Option<Uuid>,
    pub signal_id: Option<Uuid>,
    pub was_successful: bool,
    pub error_message: Option<String>,
    pub extracted_data: Option<Value>,
    pub original_message: Option<String>,
    pub confidence_score: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage 0..=100
    pub success_rate: f64,
    pub average_confidence: Decimal,
}

#[derive(Clone)]
pub struct ExtractionHistoryService {
    db: Arc<DatabaseConnection>,
}

impl ExtractionHistoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn log_attempt(&self, attempt: ExtractionAttempt) -> Result<extraction_history::Model> {
        let record = extraction_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            channel_id: Set(attempt.channel_id),
            template_id: Set(attempt.template_id),
            message_id: Set(attempt.message_id),
            signal_id: Set(attempt.signal_id),
            was_successful: Set(attempt.was_successful),
            error_message: Set(attempt.error_message),
            extracted_data: Set(attempt.extracted_data),
            original_message: Set(attempt.original_message),
            confidence_score: Set(attempt.confidence_score),
            created_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(record)
    }

    async fn recent(
        &self,
        channel_id: Option<Uuid>,
        template_id: Option<Uuid>,
        days: i64,
    ) -> Result<Vec<extraction_history::Model>> {
        let since = Utc::now() - Duration::days(days);
        let mut query = extraction_history::Entity::find().filter(extraction_history::Column::CreatedAt.gte(since));
        if let Some(channel_id) = channel_id {
            query = query.filter(extraction_history::Column::ChannelId.eq(channel_id));
        }
        if let Some(template_id) = template_id {
            query = query.filter(extraction_history::Column::TemplateId.eq(template_id));
        }
        Ok(query.all(self.db.as_ref()).await?)
    }

    pub async fn stats(&self, channel_id: Option<Uuid>, template_id: Option<Uuid>, days: i64) -> Result<ExtractionStats> {
        let records = self.recent(channel_id, template_id, days).await?;
        Ok(summarize(&records))
    }

    pub async fn common_errors(&self, channel_id: Option<Uuid>, days: i64, top_n: usize) -> Result<Vec<(String, usize)>> {
        let records = self.recent(channel_id, None, days).await?;
        Ok(rank_errors(&records, top_n))
    }

    /// Lifetime success rate of a template, as an integer percentage.
    pub async fn template_success_rate(&self, template_id: Uuid) -> Result<i32> {
        let records = extraction_history::Entity::find()
            .filter(extraction_history::Column::TemplateId.eq(template_id))
            .all(self.db.as_ref())
            .await?;
        let stats = summarize(&records);
        Ok(stats.success_rate.round() as i32)
    }
}

pub fn summarize(records: &[extraction_history::Model]) -> ExtractionStats {
    let total = records.len();
    if total == 0 {
        return ExtractionStats::default();
    }

    let successful = records.iter().filter(|r| r.was_successful).count();
    let confidence_sum: Decimal = records
        .iter()
        .filter(|r| r.was_successful)
        .map(|r| r.confidence_score)
        .sum();
    let average_confidence = if successful > 0 {
        (confidence_sum / Decimal::from(successful)).round_dp(2)
    } else {
        Decimal::ZERO
    };

    ExtractionStats {
        total,
        successful,
        failed: total - successful,
        success_rate: successful as f64 * 100.0 / total as f64,
        average_confidence,
    }
}

/// Most frequent failure messages, most common first.
pub fn rank_errors(records: &[extraction_history::Model], top_n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for message in records
        .iter()
        .filter(|r| !r.was_successful)
        .filter_map(|r| r.error_message.as_deref())
    {
        *counts.entry(message).or_default() += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().map(|(m, c)| (m.to_string(), c)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(top_n);
    ranked
}
