use sea_orm_migration::prelude::*;

use crate::m20260101_000001_create_channels_and_templates::Channels;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Rows outlive their template and message, so those ids carry no foreign key
        manager
            .create_table(
                Table::create()
                    .table(ExtractionHistory::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ExtractionHistory::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(ExtractionHistory::ChannelId).uuid().not_null())
                    .col(ColumnDef::new(ExtractionHistory::TemplateId).uuid().null())
                    .col(ColumnDef::new(ExtractionHistory::MessageId).uuid().null())
                    .col(ColumnDef::new(ExtractionHistory::SignalId).uuid().null())
                    .col(ColumnDef::new(ExtractionHistory::WasSuccessful).boolean().not_null())
                    .col(ColumnDef::new(ExtractionHistory::ErrorMessage).text().null())
                    .col(ColumnDef::new(ExtractionHistory::ExtractedData).json().null())
                    .col(ColumnDef::new(ExtractionHistory::OriginalMessage).text().null())
                    .col(ColumnDef::new(ExtractionHistory::ConfidenceScore).decimal_len(3, 2).not_null().default(0))
                    .col(ColumnDef::new(ExtractionHistory::CreatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .index(
                        Index::create()
                            .name("idx_history_channel_created")
                            .table(ExtractionHistory::Table)
                            .col(ExtractionHistory::ChannelId)
                            .col(ExtractionHistory::CreatedAt)
                    )
                    .index(
                        Index::create()
                            .name("idx_history_template")
                            .table(ExtractionHistory::Table)
                            .col(ExtractionHistory::TemplateId)
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_history_channel")
                            .from(ExtractionHistory::Table, ExtractionHistory::ChannelId)
                            .to(Channels::Table, Channels::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExtractionHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ExtractionHistory {
    Table,
    Id,
    ChannelId,
    TemplateId,
    MessageId,
    SignalId,
    WasSuccessful,
    ErrorMessage,
    ExtractedData,
    OriginalMessage,
    ConfidenceScore,
    CreatedAt,
}
