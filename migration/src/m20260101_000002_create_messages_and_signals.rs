use sea_orm_migration::prelude::*;

use crate::m20260101_000001_create_channels_and_templates::{Channels, Templates};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Messages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Messages::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Messages::ChannelId).uuid().not_null())
                    .col(ColumnDef::new(Messages::TelegramMessageId).big_integer().not_null())
                    .col(ColumnDef::new(Messages::TelegramChatId).big_integer().not_null())
                    .col(ColumnDef::new(Messages::TelegramSenderId).big_integer().null())
                    .col(ColumnDef::new(Messages::Text).text().not_null())
                    .col(ColumnDef::new(Messages::IsSignal).boolean().not_null().default(false))
                    .col(ColumnDef::new(Messages::Processed).boolean().not_null().default(false))
                    .col(ColumnDef::new(Messages::ProcessedAt).timestamp().null())
                    .col(ColumnDef::new(Messages::ExtractionAttempts).integer().not_null().default(0))
                    .col(ColumnDef::new(Messages::ExtractedSignalId).uuid().null())
                    .col(ColumnDef::new(Messages::CreatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(Messages::UpdatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP")))
                    // Duplicate lookups by Telegram id and recent-text scans
                    .index(
                        Index::create()
                            .name("idx_messages_channel_telegram")
                            .table(Messages::Table)
                            .col(Messages::ChannelId)
                            .col(Messages::TelegramMessageId)
                    )
                    .index(
                        Index::create()
                            .name("idx_messages_channel_created")
                            .table(Messages::Table)
                            .col(Messages::ChannelId)
                            .col(Messages::CreatedAt)
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_messages_channel")
                            .from(Messages::Table, Messages::ChannelId)
                            .to(Channels::Table, Channels::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Signals::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Signals::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Signals::ChannelId).uuid().not_null())
                    .col(ColumnDef::new(Signals::TemplateId).uuid().not_null())
                    .col(ColumnDef::new(Signals::UserId).string().not_null())
                    .col(ColumnDef::new(Signals::OriginalMessageId).big_integer().null())
                    .col(ColumnDef::new(Signals::OriginalMessageText).text().not_null())
                    .col(ColumnDef::new(Signals::Symbol).string_len(20).not_null())
                    .col(ColumnDef::new(Signals::EntryPrice).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(Signals::TakeProfits).json().not_null())
                    .col(ColumnDef::new(Signals::StopLoss).json().null())
                    .col(ColumnDef::new(Signals::SignalType).string_len(10).not_null())
                    .col(ColumnDef::new(Signals::Timeframe).string_len(10).null())
                    .col(ColumnDef::new(Signals::Status).string_len(20).not_null().default("PENDING"))
                    .col(ColumnDef::new(Signals::ConfidenceScore).decimal_len(3, 2).not_null())
                    .col(ColumnDef::new(Signals::ExtractionMetadata).json().null())
                    .col(ColumnDef::new(Signals::RiskRewardRatio).decimal_len(10, 2).null())
                    .col(ColumnDef::new(Signals::UserNotes).text().null())
                    .col(ColumnDef::new(Signals::PerformanceOutcome).string_len(20).null())
                    .col(ColumnDef::new(Signals::ClosePrice).decimal_len(20, 8).null())
                    .col(ColumnDef::new(Signals::Pnl).decimal_len(20, 8).null())
                    .col(ColumnDef::new(Signals::PnlPercent).decimal_len(10, 4).null())
                    .col(ColumnDef::new(Signals::ClosedAt).timestamp().null())
                    .col(ColumnDef::new(Signals::CreatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(Signals::UpdatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP")))
                    .index(
                        Index::create()
                            .name("idx_signals_channel_status")
                            .table(Signals::Table)
                            .col(Signals::ChannelId)
                            .col(Signals::Status)
                    )
                    .index(
                        Index::create()
                            .name("idx_signals_symbol")
                            .table(Signals::Table)
                            .col(Signals::Symbol)
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_signals_channel")
                            .from(Signals::Table, Signals::ChannelId)
                            .to(Channels::Table, Channels::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_signals_template")
                            .from(Signals::Table, Signals::TemplateId)
                            .to(Templates::Table, Templates::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Signals::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Messages::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub enum Messages {
    Table,
    Id,
    ChannelId,
    TelegramMessageId,
    TelegramChatId,
    TelegramSenderId,
    Text,
    IsSignal,
    Processed,
    ProcessedAt,
    ExtractionAttempts,
    ExtractedSignalId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum Signals {
    Table,
    Id,
    ChannelId,
    TemplateId,
    UserId,
    OriginalMessageId,
    OriginalMessageText,
    Symbol,
    EntryPrice,
    TakeProfits,
    StopLoss,
    SignalType,
    Timeframe,
    Status,
    ConfidenceScore,
    ExtractionMetadata,
    RiskRewardRatio,
    UserNotes,
    PerformanceOutcome,
    ClosePrice,
    Pnl,
    PnlPercent,
    ClosedAt,
    CreatedAt,
    UpdatedAt,
}
