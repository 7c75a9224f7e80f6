use anyhow::Result;
use async_trait::async_trait;
use sea_orm::prelude::*;
use sea_orm::QueryOrder;
use shared::entity::templates;
use shared::parser::TemplateStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct TemplateRepository {
    db: Arc<DatabaseConnection>,
}

impl TemplateRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, template_id: Uuid) -> Result<Option<templates::Model>> {
        let template = templates::Entity::find_by_id(template_id)
            .one(self.db.as_ref())
            .await?;
        Ok(template)
    }

    pub async fn find_by_name(&self, channel_id: Uuid, name: &str) -> Result<Option<templates::Model>> {
        let template = templates::Entity::find()
            .filter(templates::Column::ChannelId.eq(channel_id))
            .filter(templates::Column::Name.eq(name))
            .one(self.db.as_ref())
            .await?;
        Ok(template)
    }

    pub async fn list_by_channel(&self, channel_id: Uuid, include_inactive: bool) -> Result<Vec<templates::Model>> {
        let mut query = templates::Entity::find().filter(templates::Column::ChannelId.eq(channel_id));
        if !include_inactive {
            query = query.filter(templates::Column::IsActive.eq(true));
        }
        let templates = query
            .order_by_asc(templates::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(templates)
    }

    pub async fn create(&self, active_model: templates::ActiveModel) -> Result<templates::Model> {
        Ok(active_model.insert(self.db.as_ref()).await?)
    }

    pub async fn update(&self, active_model: templates::ActiveModel) -> Result<templates::Model> {
        Ok(active_model.update(self.db.as_ref()).await?)
    }
}

#[async_trait]
impl TemplateStore for TemplateRepository {
    async fn active_templates(&self, channel_id: Uuid) -> shared::Result<Vec<templates::Model>> {
        let templates = templates::Entity::find()
            .filter(templates::Column::ChannelId.eq(channel_id))
            .filter(templates::Column::IsActive.eq(true))
            .all(self.db.as_ref())
            .await?;
        Ok(templates)
    }
}
