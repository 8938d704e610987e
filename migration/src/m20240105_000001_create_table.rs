use sea_orm_migration::prelude::*;

use entity::audit_logs as AuditLogs;
use entity::credentials as Credentials;
use entity::photos as Photos;
use entity::workers as Workers;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20240105_000001_create_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Workers::Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Workers::Column::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Workers::Column::InternalId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Workers::Column::FirstName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Workers::Column::LastName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Workers::Column::Cedula).string().not_null())
                    .col(ColumnDef::new(Workers::Column::PhotoUrl).string().null())
                    .col(
                        ColumnDef::new(Workers::Column::Position)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Workers::Column::Department)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Workers::Column::Phone).string().null())
                    .col(ColumnDef::new(Workers::Column::Email).string().null())
                    .col(
                        ColumnDef::new(Workers::Column::Status)
                            .string_len(16)
                            .not_null()
                            .default("ACTIVO"),
                    )
                    .col(ColumnDef::new(Workers::Column::ValidFrom).date().not_null())
                    .col(
                        ColumnDef::new(Workers::Column::ValidUntil)
                            .date()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Workers::Column::CreatedBy).string().null())
                    .col(
                        ColumnDef::new(Workers::Column::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Workers::Column::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Workers::Column::DeletedAt)
                            .big_integer()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Credentials::Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Credentials::Column::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Credentials::Column::WorkerId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Credentials::Column::Token)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Credentials::Column::IsRevoked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Credentials::Column::RevokedAt)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Credentials::Column::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Credentials::Column::CreatedBy)
                            .string()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_qr_codes_worker_id")
                            .from(Credentials::Entity, Credentials::Column::WorkerId)
                            .to(Workers::Entity, Workers::Column::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuditLogs::Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuditLogs::Column::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AuditLogs::Column::Action)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AuditLogs::Column::TableName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AuditLogs::Column::RecordId).string().null())
                    .col(ColumnDef::new(AuditLogs::Column::OldData).json().null())
                    .col(ColumnDef::new(AuditLogs::Column::NewData).json().null())
                    .col(
                        ColumnDef::new(AuditLogs::Column::PerformedBy)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AuditLogs::Column::PerformedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Photos::Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Photos::Column::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Photos::Column::Data).binary().not_null())
                    .col(
                        ColumnDef::new(Photos::Column::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Photos::Entity).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuditLogs::Entity).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(Credentials::Entity)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Workers::Entity).if_exists().to_owned())
            .await
    }
}
