use sea_orm::{ConnectionTrait, DbBackend};
use sea_orm_migration::prelude::*;

use entity::audit_logs as AuditLogs;
use entity::credentials as Credentials;
use entity::workers as Workers;
use log::warn;

pub struct Migration;

const ONE_ACTIVE_PER_WORKER: &str = "qr_codes_one_active_per_worker";

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20240105_000002_create_index"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                sea_query::Index::create()
                    .table(Workers::Entity)
                    .name("workers_cedula")
                    .col(Workers::Column::Cedula)
                    .unique()
                    .take(),
            )
            .await
            .ignore_exist()?;

        manager
            .create_index(
                sea_query::Index::create()
                    .table(Workers::Entity)
                    .name("workers_internal_id")
                    .col(Workers::Column::InternalId)
                    .unique()
                    .take(),
            )
            .await
            .ignore_exist()?;

        manager
            .create_index(
                sea_query::Index::create()
                    .table(Workers::Entity)
                    .name("workers_created_at")
                    .col(Workers::Column::CreatedAt)
                    .take(),
            )
            .await
            .ignore_exist()?;

        manager
            .create_index(
                sea_query::Index::create()
                    .table(Credentials::Entity)
                    .name("qr_codes_token")
                    .col(Credentials::Column::Token)
                    .unique()
                    .take(),
            )
            .await
            .ignore_exist()?;

        manager
            .create_index(
                sea_query::Index::create()
                    .table(Credentials::Entity)
                    .name("qr_codes_worker_id")
                    .col(Credentials::Column::WorkerId)
                    .take(),
            )
            .await
            .ignore_exist()?;

        manager
            .create_index(
                sea_query::Index::create()
                    .table(AuditLogs::Entity)
                    .name("audit_logs_performed_at")
                    .col(AuditLogs::Column::PerformedAt)
                    .take(),
            )
            .await
            .ignore_exist()?;

        // at most one non revoked credential per worker, enforced by the store where partial indexes exist
        let partial = match manager.get_database_backend() {
            DbBackend::Sqlite => Some(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON qr_codes (worker_id) WHERE is_revoked = 0",
                ONE_ACTIVE_PER_WORKER
            )),
            DbBackend::Postgres => Some(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON qr_codes (worker_id) WHERE NOT is_revoked",
                ONE_ACTIVE_PER_WORKER
            )),
            DbBackend::MySql => None,
        };
        match partial {
            Some(sql) => manager
                .get_connection()
                .execute_unprepared(sql.as_str())
                .await
                .map(|_| ()),
            None => {
                warn!("backend has no partial index, one active credential per worker is only checked in transaction");
                Ok(())
            }
        }
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.get_database_backend() != DbBackend::MySql {
            manager
                .get_connection()
                .execute_unprepared(
                    format!("DROP INDEX IF EXISTS {}", ONE_ACTIVE_PER_WORKER).as_str(),
                )
                .await?;
        }

        drop_index(manager, "audit_logs_performed_at", AuditLogs::Entity).await?;
        drop_index(manager, "qr_codes_worker_id", Credentials::Entity).await?;
        drop_index(manager, "qr_codes_token", Credentials::Entity).await?;
        drop_index(manager, "workers_created_at", Workers::Entity).await?;
        drop_index(manager, "workers_internal_id", Workers::Entity).await?;
        drop_index(manager, "workers_cedula", Workers::Entity).await?;
        Ok(())
    }
}

async fn drop_index<T>(manager: &SchemaManager<'_>, name: &str, table: T) -> Result<(), DbErr>
where
    T: IntoTableRef,
{
    manager
        .drop_index(sea_query::Index::drop().name(name).table(table).to_owned())
        .await
}

trait IgnoreExistDbResult {
    fn ignore_exist(self) -> Result<(), DbErr>;
}

impl IgnoreExistDbResult for Result<(), DbErr> {
    fn ignore_exist(self) -> Result<(), DbErr> {
        match self {
            Err(e) => {
                let e_str = e.to_string();
                if e_str.contains("Duplicate key name") || e_str.contains("already exists") {
                    warn!("ignore duplicate index {}", e_str);
                    Ok(())
                } else {
                    Err(e)
                }
            }
            _ => Ok(()),
        }
    }
}
