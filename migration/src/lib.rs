pub use sea_orm_migration::prelude::*;

mod m20260101_000001_create_channels_and_templates;
mod m20260101_000002_create_messages_and_signals;
mod m20260101_000003_create_extraction_history;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_channels_and_templates::Migration),
            Box::new(m20260101_000002_create_messages_and_signals::Migration),
            Box::new(m20260101_000003_create_extraction_history::Migration),
        ]
    }
}
