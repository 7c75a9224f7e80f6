use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Channels::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Channels::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Channels::UserId).string().not_null())
                    .col(ColumnDef::new(Channels::Name).string().not_null())
                    .col(ColumnDef::new(Channels::Description).text().null())
                    .col(ColumnDef::new(Channels::TelegramChatId).big_integer().not_null().unique_key())
                    .col(ColumnDef::new(Channels::ProviderName).string().null())
                    .col(ColumnDef::new(Channels::IsActive).boolean().not_null().default(true))
                    .col(ColumnDef::new(Channels::SignalCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Channels::LastSignalAt).timestamp().null())
                    .col(ColumnDef::new(Channels::CreatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(Channels::UpdatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP")))
                    .index(
                        Index::create()
                            .name("idx_channels_user")
                            .table(Channels::Table)
                            .col(Channels::UserId)
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Templates::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Templates::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Templates::ChannelId).uuid().not_null())
                    .col(ColumnDef::new(Templates::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Templates::Description).text().null())
                    .col(ColumnDef::new(Templates::Version).integer().not_null().default(1))
                    .col(ColumnDef::new(Templates::ExtractionConfig).json().not_null())
                    .col(ColumnDef::new(Templates::TestMessage).text().null())
                    .col(ColumnDef::new(Templates::IsActive).boolean().not_null().default(true))
                    .col(ColumnDef::new(Templates::ExtractionSuccessRate).integer().not_null().default(0))
                    .col(ColumnDef::new(Templates::LastUsedAt).timestamp().null())
                    .col(ColumnDef::new(Templates::CreatedBy).string().not_null())
                    .col(ColumnDef::new(Templates::CreatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(Templates::UpdatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP")))
                    .index(
                        Index::create()
                            .name("idx_templates_channel_active")
                            .table(Templates::Table)
                            .col(Templates::ChannelId)
                            .col(Templates::IsActive)
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_templates_channel")
                            .from(Templates::Table, Templates::ChannelId)
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
            .drop_table(Table::drop().table(Templates::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Channels::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub enum Channels {
    Table,
    Id,
    UserId,
    Name,
    Description,
    TelegramChatId,
    ProviderName,
    IsActive,
    SignalCount,
    LastSignalAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum Templates {
    Table,
    Id,
    ChannelId,
    Name,
    Description,
    Version,
    ExtractionConfig,
    TestMessage,
    IsActive,
    ExtractionSuccessRate,
    LastUsedAt,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}
