use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create outbox_status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(OutboxStatus::Enum)
                    .values([OutboxStatus::Pending, OutboxStatus::Processed])
                    .to_owned(),
            )
            .await?;

        // Create outbox table
        manager
            .create_table(
                Table::create()
                    .table(Outbox::Table)
                    .if_not_exists()
                    .col(pk_uuid(Outbox::Id))
                    .col(string(Outbox::Queue))
                    .col(json_binary(Outbox::Payload))
                    .col(
                        timestamp_with_time_zone(Outbox::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(Outbox::ProcessedAt))
                    .col(
                        ColumnDef::new(Outbox::Status)
                            .enumeration(
                                OutboxStatus::Enum,
                                [OutboxStatus::Pending, OutboxStatus::Processed],
                            )
                            .not_null()
                            .default("pending"),
                    )
                    .col(integer(Outbox::Attempts).default(0))
                    .col(string_null(Outbox::LastError))
                    .to_owned(),
            )
            .await?;

        // The relay scans pending rows oldest-first
        manager
            .create_index(
                Index::create()
                    .name("idx_outbox_status_created_at")
                    .table(Outbox::Table)
                    .col(Outbox::Status)
                    .col(Outbox::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_outbox_status_created_at")
                    .table(Outbox::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Outbox::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(OutboxStatus::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Outbox {
    Table,
    Id,
    Queue,
    Payload,
    CreatedAt,
    ProcessedAt,
    Status,
    Attempts,
    LastError,
}

#[derive(DeriveIden)]
enum OutboxStatus {
    #[sea_orm(iden = "outbox_status")]
    Enum,
    #[sea_orm(iden = "pending")]
    Pending,
    #[sea_orm(iden = "processed")]
    Processed,
}
