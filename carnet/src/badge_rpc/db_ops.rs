use entity::audit_logs as AuditLogs;
use entity::credentials as Credentials;
use entity::photos as Photos;
use entity::workers as Workers;
use AuditLogs::Model as AuditEntry;
use Credentials::Model as Credential;
use Photos::Model as Photo;
use Workers::Model as Worker;

use crate::error::{BadgeError, BadgeResult};
use crate::status::WorkerWithCredentials;
use crate::utils::*;
use chrono::NaiveDate;
use entity::{AuditAction, WorkerStatus};
use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use async_trait::async_trait;
use sea_orm::sea_query::Order;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    ModelTrait, NotSet, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};

pub const WORKERS_TABLE: &str = "workers";
pub const QR_CODES_TABLE: &str = "qr_codes";

pub const DEFAULT_AUDIT_LIMIT: u64 = 100;
pub const MAX_AUDIT_LIMIT: u64 = 1000;

const INTERNAL_ID_PREFIX: &str = "TRB-";
const INTERNAL_ID_LEN: usize = 8;
const INTERNAL_ID_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const MAX_INTERNAL_ID_DRAWS: usize = 8;

/// Fields an administrator supplies when creating or editing a worker.
/// Unknown keys are rejected at the boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkerInput {
    #[validate(length(min = 1, max = 100, message = "first name is required, at most 100 chars"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "last name is required, at most 100 chars"))]
    pub last_name: String,
    #[validate(length(min = 1, max = 20, message = "cedula is required, at most 20 chars"))]
    pub cedula: String,
    #[validate(length(min = 1, max = 100, message = "position is required, at most 100 chars"))]
    pub position: String,
    #[validate(length(min = 1, max = 100, message = "department is required, at most 100 chars"))]
    pub department: String,
    #[serde(default)]
    #[validate(length(max = 20, message = "phone is at most 20 chars"))]
    pub phone: Option<String>,
    #[serde(default)]
    #[validate(
        email(message = "email is not valid"),
        length(max = 255, message = "email is at most 255 chars")
    )]
    pub email: Option<String>,
    #[serde(default)]
    #[validate(length(max = 2048, message = "photo url is at most 2048 chars"))]
    pub photo_url: Option<String>,
    pub status: WorkerStatus,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
}

impl WorkerInput {
    /// Trim text fields and turn blank optional fields into null
    pub fn normalized(self) -> Self {
        fn optional(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
        }
        WorkerInput {
            first_name: self.first_name.trim().to_owned(),
            last_name: self.last_name.trim().to_owned(),
            cedula: self.cedula.trim().to_owned(),
            position: self.position.trim().to_owned(),
            department: self.department.trim().to_owned(),
            phone: optional(self.phone),
            email: optional(self.email),
            photo_url: optional(self.photo_url),
            ..self
        }
    }

    /// Normalize then validate, nothing may be written for input failing here
    pub fn check(self) -> BadgeResult<Self> {
        let input = self.normalized();
        input.validate()?;
        if input.valid_from > input.valid_until {
            return Err(BadgeError::validation(format!(
                "valid_from {} is after valid_until {}",
                input.valid_from, input.valid_until
            )));
        }
        Ok(input)
    }
}

/// Listing filter, every field optional
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerFilter {
    pub search: Option<String>,
    pub status: Option<WorkerStatus>,
}

/// Audit row about to be written
#[derive(Clone, Debug)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub table_name: &'static str,
    pub record_id: Option<String>,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub performed_by: Option<String>,
}

/// Append one audit entry through `db`, callers pass their open transaction
/// so the entry commits or rolls back with the mutation it describes
pub async fn record_audit<C>(db: &C, entry: NewAuditEntry) -> Result<AuditEntry, sea_orm::DbErr>
where
    C: ConnectionTrait,
{
    AuditLogs::ActiveModel {
        id: NotSet,
        action: Set(entry.action),
        table_name: Set(entry.table_name.to_owned()),
        record_id: Set(entry.record_id),
        old_data: Set(entry.old_data),
        new_data: Set(entry.new_data),
        performed_by: Set(entry.performed_by),
        performed_at: Set(now_millis()),
    }
    .insert(db)
    .await
}

#[async_trait]
pub trait WorkerRepo {
    async fn list_workers(&self, filter: WorkerFilter) -> BadgeResult<Vec<WorkerWithCredentials>>;
    async fn get_worker(&self, id: String) -> BadgeResult<WorkerWithCredentials>;
    /// Lookup including soft deleted rows, used by verification
    async fn find_worker(&self, id: String) -> BadgeResult<Option<Worker>>;
    async fn create_worker(&self, input: WorkerInput, actor: Option<String>) -> BadgeResult<Worker>;
    async fn update_worker(
        &self,
        id: String,
        input: WorkerInput,
        actor: Option<String>,
    ) -> BadgeResult<Worker>;
    async fn delete_worker(&self, id: String, actor: Option<String>) -> BadgeResult<Worker>;
}

#[async_trait]
pub trait CredentialRepo {
    async fn find_credential(&self, id: String) -> BadgeResult<Option<Credential>>;
    async fn find_credential_by_token(&self, token: String) -> BadgeResult<Option<Credential>>;
    async fn list_credentials(&self, worker_id: String) -> BadgeResult<Vec<Credential>>;
}

#[async_trait]
pub trait AuditRepo {
    async fn list_audit_logs(&self, limit: Option<u64>) -> BadgeResult<Vec<AuditEntry>>;
}

/// Persist photo blobs, implemented by the database and by the file system store
#[async_trait]
pub trait PhotoRepo {
    async fn has_photo(&self, photo_id: String) -> BadgeResult<bool>;
    async fn get_photo(&self, photo_id: String) -> BadgeResult<Vec<u8>>;
    async fn store_photo(&self, photo_id: String, data: Vec<u8>) -> BadgeResult<String>;
}

pub trait Repo: WorkerRepo + CredentialRepo + AuditRepo + PhotoRepo {}
impl<T> Repo for T where T: WorkerRepo + CredentialRepo + AuditRepo + PhotoRepo {}

pub struct DbOpsImpl {
    conn: DatabaseConnection,
}

impl DbOpsImpl {
    pub fn new(conn: DatabaseConnection) -> Self {
        DbOpsImpl { conn }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }
}

fn draw_internal_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..INTERNAL_ID_LEN)
        .map(|_| INTERNAL_ID_ALPHABET[rng.gen_range(0..INTERNAL_ID_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", INTERNAL_ID_PREFIX, suffix)
}

async fn next_internal_id<C: ConnectionTrait>(db: &C) -> BadgeResult<String> {
    for _ in 0..MAX_INTERNAL_ID_DRAWS {
        let candidate = draw_internal_id();
        let taken = Workers::Entity::find()
            .filter(Workers::Column::InternalId.eq(candidate.clone()))
            .count(db)
            .await?;
        if taken == 0 {
            return Ok(candidate);
        }
        warn!("internal id {} already taken, drawing again", candidate);
    }
    Err(BadgeError::storage("unable to draw a free internal id"))
}

async fn ensure_cedula_free<C: ConnectionTrait>(
    db: &C,
    cedula: &str,
    except_id: Option<&str>,
) -> BadgeResult<()> {
    let mut query = Workers::Entity::find().filter(Workers::Column::Cedula.eq(cedula));
    if let Some(id) = except_id {
        query = query.filter(Workers::Column::Id.ne(id));
    }
    if query.count(db).await? > 0 {
        return Err(BadgeError::conflict(format!(
            "cedula {} is already registered",
            cedula
        )));
    }
    Ok(())
}

async fn find_live_worker<C: ConnectionTrait>(db: &C, id: &str) -> BadgeResult<Worker> {
    Workers::Entity::find_by_id(id.to_owned())
        .filter(Workers::Column::DeletedAt.is_null())
        .one(db)
        .await?
        .if_not_found(format!("worker {}", id))
}

/// Case insensitive substring match on names, cedula and internal id.
/// `needle` is already lowercased. Matching happens here rather than in SQL
/// so accented letters fold and `%`/`_` stay literal.
fn matches_search(worker: &Worker, needle: &str) -> bool {
    [
        &worker.first_name,
        &worker.last_name,
        &worker.cedula,
        &worker.internal_id,
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(needle))
}

#[async_trait]
impl WorkerRepo for DbOpsImpl {
    async fn list_workers(&self, filter: WorkerFilter) -> BadgeResult<Vec<WorkerWithCredentials>> {
        let needle = filter
            .search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let mut query = Workers::Entity::find().filter(Workers::Column::DeletedAt.is_null());
        if let Some(status) = filter.status {
            query = query.filter(Workers::Column::Status.eq(status));
        }
        let rows = query
            .find_with_related(Credentials::Entity)
            .order_by(Workers::Column::CreatedAt, Order::Desc)
            .order_by(Workers::Column::Id, Order::Asc)
            .order_by(Credentials::Column::CreatedAt, Order::Desc)
            .all(&self.conn)
            .await?;

        Ok(rows
            .into_iter()
            .filter(|(worker, _)| {
                needle
                    .as_deref()
                    .map_or(true, |needle| matches_search(worker, needle))
            })
            .map(|(worker, qr_codes)| WorkerWithCredentials::new(worker, qr_codes))
            .collect())
    }

    async fn get_worker(&self, id: String) -> BadgeResult<WorkerWithCredentials> {
        let worker = find_live_worker(&self.conn, &id).await?;
        let qr_codes = worker
            .find_related(Credentials::Entity)
            .order_by(Credentials::Column::CreatedAt, Order::Desc)
            .all(&self.conn)
            .await?;
        Ok(WorkerWithCredentials::new(worker, qr_codes))
    }

    async fn find_worker(&self, id: String) -> BadgeResult<Option<Worker>> {
        Workers::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .map_err(BadgeError::from)
    }

    async fn create_worker(&self, input: WorkerInput, actor: Option<String>) -> BadgeResult<Worker> {
        let input = input.check()?;
        let worker = self
            .conn
            .transaction::<_, Worker, BadgeError>(|txn| {
                Box::pin(async move {
                    ensure_cedula_free(txn, &input.cedula, None).await?;
                    let internal_id = next_internal_id(txn).await?;
                    let now = now_millis();
                    let worker = Workers::ActiveModel {
                        id: Set(Uuid::new_v4().to_string()),
                        internal_id: Set(internal_id),
                        first_name: Set(input.first_name),
                        last_name: Set(input.last_name),
                        cedula: Set(input.cedula),
                        photo_url: Set(input.photo_url),
                        position: Set(input.position),
                        department: Set(input.department),
                        phone: Set(input.phone),
                        email: Set(input.email),
                        status: Set(input.status),
                        valid_from: Set(input.valid_from),
                        valid_until: Set(input.valid_until),
                        created_by: Set(actor.clone()),
                        created_at: Set(now),
                        updated_at: Set(now),
                        deleted_at: Set(None),
                    }
                    .insert(txn)
                    .await?;

                    record_audit(
                        txn,
                        NewAuditEntry {
                            action: AuditAction::Create,
                            table_name: WORKERS_TABLE,
                            record_id: Some(worker.id.clone()),
                            old_data: None,
                            new_data: Some(serde_json::to_value(&worker)?),
                            performed_by: actor,
                        },
                    )
                    .await?;
                    Ok(worker)
                })
            })
            .await?;

        info!("worker {} created as {}", worker.id, worker.internal_id);
        Ok(worker)
    }

    async fn update_worker(
        &self,
        id: String,
        input: WorkerInput,
        actor: Option<String>,
    ) -> BadgeResult<Worker> {
        let input = input.check()?;
        let worker = self
            .conn
            .transaction::<_, Worker, BadgeError>(|txn| {
                Box::pin(async move {
                    let before = find_live_worker(txn, &id).await?;
                    if before.cedula != input.cedula {
                        ensure_cedula_free(txn, &input.cedula, Some(id.as_str())).await?;
                    }

                    let mut active: Workers::ActiveModel = before.clone().into();
                    active.first_name = Set(input.first_name);
                    active.last_name = Set(input.last_name);
                    active.cedula = Set(input.cedula);
                    active.photo_url = Set(input.photo_url);
                    active.position = Set(input.position);
                    active.department = Set(input.department);
                    active.phone = Set(input.phone);
                    active.email = Set(input.email);
                    active.status = Set(input.status);
                    active.valid_from = Set(input.valid_from);
                    active.valid_until = Set(input.valid_until);
                    active.updated_at = Set(now_millis());
                    let after = active.update(txn).await?;

                    record_audit(
                        txn,
                        NewAuditEntry {
                            action: AuditAction::Update,
                            table_name: WORKERS_TABLE,
                            record_id: Some(after.id.clone()),
                            old_data: Some(serde_json::to_value(&before)?),
                            new_data: Some(serde_json::to_value(&after)?),
                            performed_by: actor,
                        },
                    )
                    .await?;
                    Ok(after)
                })
            })
            .await?;

        info!("worker {} updated", worker.id);
        Ok(worker)
    }

    async fn delete_worker(&self, id: String, actor: Option<String>) -> BadgeResult<Worker> {
        let worker = self
            .conn
            .transaction::<_, Worker, BadgeError>(|txn| {
                Box::pin(async move {
                    let before = find_live_worker(txn, &id).await?;
                    let now = now_millis();
                    let mut active: Workers::ActiveModel = before.clone().into();
                    active.deleted_at = Set(Some(now));
                    active.updated_at = Set(now);
                    let after = active.update(txn).await?;

                    record_audit(
                        txn,
                        NewAuditEntry {
                            action: AuditAction::Delete,
                            table_name: WORKERS_TABLE,
                            record_id: Some(after.id.clone()),
                            old_data: Some(serde_json::to_value(&before)?),
                            new_data: Some(serde_json::to_value(&after)?),
                            performed_by: actor,
                        },
                    )
                    .await?;
                    Ok(after)
                })
            })
            .await?;

        info!("worker {} soft deleted", worker.id);
        Ok(worker)
    }
}

#[async_trait]
impl CredentialRepo for DbOpsImpl {
    async fn find_credential(&self, id: String) -> BadgeResult<Option<Credential>> {
        Credentials::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .map_err(BadgeError::from)
    }

    async fn find_credential_by_token(&self, token: String) -> BadgeResult<Option<Credential>> {
        Credentials::Entity::find()
            .filter(Credentials::Column::Token.eq(token))
            .one(&self.conn)
            .await
            .map_err(BadgeError::from)
    }

    async fn list_credentials(&self, worker_id: String) -> BadgeResult<Vec<Credential>> {
        Credentials::Entity::find()
            .filter(Credentials::Column::WorkerId.eq(worker_id))
            .order_by(Credentials::Column::CreatedAt, Order::Desc)
            .all(&self.conn)
            .await
            .map_err(BadgeError::from)
    }
}

#[async_trait]
impl AuditRepo for DbOpsImpl {
    async fn list_audit_logs(&self, limit: Option<u64>) -> BadgeResult<Vec<AuditEntry>> {
        let limit = limit.unwrap_or(DEFAULT_AUDIT_LIMIT).clamp(1, MAX_AUDIT_LIMIT);
        AuditLogs::Entity::find()
            .order_by(AuditLogs::Column::PerformedAt, Order::Desc)
            .order_by(AuditLogs::Column::Id, Order::Desc)
            .limit(limit)
            .all(&self.conn)
            .await
            .map_err(BadgeError::from)
    }
}

#[async_trait]
impl PhotoRepo for DbOpsImpl {
    async fn has_photo(&self, photo_id: String) -> BadgeResult<bool> {
        Photos::Entity::find()
            .filter(Photos::Column::Id.eq(photo_id))
            .count(&self.conn)
            .await
            .map(|count| count > 0)
            .map_err(BadgeError::from)
    }

    async fn get_photo(&self, photo_id: String) -> BadgeResult<Vec<u8>> {
        Photos::Entity::find_by_id(photo_id.clone())
            .one(&self.conn)
            .await?
            .if_not_found(format!("photo {}", photo_id))
            .map(|val: Photo| val.data)
    }

    async fn store_photo(&self, photo_id: String, data: Vec<u8>) -> BadgeResult<String> {
        let photo = Photos::ActiveModel {
            id: Set(photo_id.clone()),
            data: Set(data),
            created_at: Set(now_millis()),
        };

        photo
            .insert(&self.conn)
            .await
            .map(|_| photo_id)
            .map_err(BadgeError::from)
    }
}
