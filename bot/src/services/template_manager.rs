use anyhow::{bail, Result};
use chrono::Utc;
use sea_orm::prelude::*;
use sea_orm::ActiveValue::Set;
use serde_json::Value;
use shared::entity::templates;
use shared::extraction::{validate_template_config, ExtractionEngine, ExtractionReport};
use std::sync::Arc;
use tracing::info;

use crate::repositories::TemplateRepository;
use crate::services::extraction_history::{ExtractionAttempt, ExtractionHistoryService};

pub const MAX_TEMPLATE_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub extraction_config: Option<Value>,
    pub test_message: Option<String>,
    pub is_active: Option<bool>,
}

pub struct TemplateManager {
    repo: TemplateRepository,
    history: ExtractionHistoryService,
    engine: ExtractionEngine,
}

impl TemplateManager {
    pub fn new(db: Arc<DatabaseConnection>, history: ExtractionHistoryService) -> Self {
        Self {
            repo: TemplateRepository::new(db),
            history,
            engine: ExtractionEngine::new(),
        }
    }

    pub fn store(&self) -> TemplateRepository {
        self.repo.clone()
    }

    pub async fn create_template(
        &self,
        channel_id: Uuid,
        name: &str,
        description: Option<String>,
        extraction_config: Value,
        test_message: Option<String>,
        created_by: &str,
    ) -> Result<templates::Model> {
        let name = validate_name(name)?;
        validate_template_config(&extraction_config)?;

        let now = Utc::now();
        let template = self
            .repo
            .create(templates::ActiveModel {
                id: Set(Uuid::new_v4()),
                channel_id: Set(channel_id),
                name: Set(name),
                description: Set(description),
                version: Set(1),
                extraction_config: Set(extraction_config),
                test_message: Set(test_message),
                is_active: Set(true),
                extraction_success_rate: Set(0),
                last_used_at: Set(None),
                created_by: Set(created_by.to_string()),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .await?;

        info!("✅ Created template '{}' ({}) for channel {}", template.name, template.id, channel_id);
        Ok(template)
    }

    /// Applies `update`; a changed extraction config is re-validated and bumps the version.
    pub async fn update_template(&self, template_id: Uuid, update: TemplateUpdate) -> Result<templates::Model> {
        let Some(existing) = self.repo.find_by_id(template_id).await? else {
            bail!("Template {} not found", template_id);
        };

        let version = existing.version;
        let mut active: templates::ActiveModel = existing.clone().into();

        if let Some(name) = update.name {
            active.name = Set(validate_name(&name)?);
        }
        if let Some(description) = update.description {
            active.description = Set(Some(description));
        }
        if let Some(config) = update.extraction_config {
            validate_template_config(&config)?;
            if config != existing.extraction_config {
                active.extraction_config = Set(config);
                active.version = Set(version + 1);
            }
        }
        if let Some(test_message) = update.test_message {
            active.test_message = Set(Some(test_message));
        }
        if let Some(is_active) = update.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let template = self.repo.update(active).await?;
        info!("Updated template '{}' to version {}", template.name, template.version);
        Ok(template)
    }

    /// Soft delete: the template is deactivated, its history is kept.
    pub async fn delete_template(&self, template_id: Uuid) -> Result<templates::Model> {
        self.update_template(
            template_id,
            TemplateUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn get_template(&self, template_id: Uuid) -> Result<Option<templates::Model>> {
        self.repo.find_by_id(template_id).await
    }

    pub async fn find_by_name(&self, channel_id: Uuid, name: &str) -> Result<Option<templates::Model>> {
        self.repo.find_by_name(channel_id, name).await
    }

    pub async fn list_templates(&self, channel_id: Uuid, include_inactive: bool) -> Result<Vec<templates::Model>> {
        self.repo.list_by_channel(channel_id, include_inactive).await
    }

    pub fn test_template(&self, extraction_config: &Value, sample_message: &str) -> ExtractionReport {
        self.engine.test_extraction(sample_message, extraction_config)
    }

    /// Records the attempt and refreshes the template's success rate.
    pub async fn update_extraction_stats(&self, template_id: Uuid, attempt: ExtractionAttempt) -> Result<()> {
        self.history
            .log_attempt(ExtractionAttempt {
                template_id: Some(template_id),
                ..attempt
            })
            .await?;

        let Some(template) = self.repo.find_by_id(template_id).await? else {
            return Ok(());
        };
        let rate = self.history.template_success_rate(template_id).await?;

        let mut active: templates::ActiveModel = template.into();
        active.extraction_success_rate = Set(rate);
        active.last_used_at = Set(Some(Utc::now()));
        self.repo.update(active).await?;
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_TEMPLATE_NAME_LEN {
        bail!("Template name must be between 1 and {} characters", MAX_TEMPLATE_NAME_LEN);
    }
    Ok(name.to_string())
}
