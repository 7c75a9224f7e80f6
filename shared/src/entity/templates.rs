//! `SeaORM` Entity, @generated manually

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "templates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub channel_id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub version: i32,
    /// Field extraction rules, see `extraction::ExtractionConfig`
    pub extraction_config: Json,
    #[sea_orm(column_type = "Text", nullable)]
    pub test_message: Option<String>,
    pub is_active: bool,
    /// Percentage 0..=100
    pub extraction_success_rate: i32,
    pub last_used_at: Option<DateTimeUtc>,
    pub created_by: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::channels::Entity",
        from = "Column::ChannelId",
        to = "super::channels::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Channels,
    #[sea_orm(has_many = "super::extraction_history::Entity")]
    ExtractionHistory,
}

impl Related<super::channels::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Channels.def()
    }
}

impl Related<super::extraction_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ExtractionHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
