//! Issuance and revocation of QR credentials. Every mutation here commits
//! together with its audit entry or not at all.

mod token;

pub use token::{RandomTokens, TokenSource, TOKEN_BYTES};

use crate::badge_rpc::db_ops::{record_audit, NewAuditEntry, QR_CODES_TABLE};
use crate::error::{BadgeError, BadgeResult};
use crate::utils::{now_millis, IfNotFound};
use async_trait::async_trait;
use entity::credentials as Credentials;
use entity::workers as Workers;
use entity::AuditAction;
use log::{info, warn};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;
use Credentials::Model as Credential;

/// Fresh draws allowed before issuance gives up on a colliding token source
pub const MAX_TOKEN_DRAWS: usize = 5;

#[async_trait]
pub trait LifecycleApi {
    /// Issue a new credential, fails with `Conflict` while the worker still holds an active one
    async fn issue(&self, worker_id: String, actor: Option<String>) -> BadgeResult<Credential>;
    /// Revoke a credential, revoking twice returns the row untouched
    async fn revoke(&self, credential_id: String, actor: Option<String>) -> BadgeResult<Credential>;
}

pub struct CredentialLifecycle {
    conn: DatabaseConnection,
    tokens: Arc<dyn TokenSource>,
}

impl CredentialLifecycle {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self::with_tokens(conn, Arc::new(RandomTokens))
    }

    pub fn with_tokens(conn: DatabaseConnection, tokens: Arc<dyn TokenSource>) -> Self {
        CredentialLifecycle { conn, tokens }
    }
}

#[async_trait]
impl LifecycleApi for CredentialLifecycle {
    async fn issue(&self, worker_id: String, actor: Option<String>) -> BadgeResult<Credential> {
        let tokens = self.tokens.clone();
        let issued = self
            .conn
            .transaction::<_, Credential, BadgeError>(|txn| {
                Box::pin(async move {
                    Workers::Entity::find_by_id(worker_id.clone())
                        .filter(Workers::Column::DeletedAt.is_null())
                        .one(txn)
                        .await?
                        .if_not_found(format!("worker {}", worker_id))?;

                    let active = Credentials::Entity::find()
                        .filter(Credentials::Column::WorkerId.eq(worker_id.clone()))
                        .filter(Credentials::Column::IsRevoked.eq(false))
                        .count(txn)
                        .await?;
                    if active > 0 {
                        return Err(BadgeError::conflict(format!(
                            "worker {} already has an active credential",
                            worker_id
                        )));
                    }

                    let mut token = None;
                    for _ in 0..MAX_TOKEN_DRAWS {
                        let candidate = tokens.draw();
                        let taken = Credentials::Entity::find()
                            .filter(Credentials::Column::Token.eq(candidate.clone()))
                            .count(txn)
                            .await?;
                        if taken == 0 {
                            token = Some(candidate);
                            break;
                        }
                        warn!("drawn token collides with an issued credential, drawing again");
                    }
                    let token = token.ok_or_else(|| {
                        BadgeError::storage("unable to draw an unused credential token")
                    })?;

                    let credential =
                        insert_credential(txn, &worker_id, token, actor.clone()).await?;

                    record_audit(
                        txn,
                        NewAuditEntry {
                            action: AuditAction::GenerateQr,
                            table_name: QR_CODES_TABLE,
                            record_id: Some(credential.id.clone()),
                            old_data: None,
                            new_data: Some(serde_json::to_value(&credential)?),
                            performed_by: actor,
                        },
                    )
                    .await?;
                    Ok(credential)
                })
            })
            .await?;

        info!(
            "credential {} issued for worker {}",
            issued.id, issued.worker_id
        );
        Ok(issued)
    }

    async fn revoke(&self, credential_id: String, actor: Option<String>) -> BadgeResult<Credential> {
        self.conn
            .transaction::<_, Credential, BadgeError>(|txn| {
                Box::pin(async move {
                    let before = Credentials::Entity::find_by_id(credential_id.clone())
                        .one(txn)
                        .await?
                        .if_not_found(format!("credential {}", credential_id))?;
                    if before.is_revoked {
                        info!("credential {} already revoked", before.id);
                        return Ok(before);
                    }

                    let mut active: Credentials::ActiveModel = before.clone().into();
                    active.is_revoked = Set(true);
                    active.revoked_at = Set(Some(now_millis()));
                    let after = active.update(txn).await?;

                    record_audit(
                        txn,
                        NewAuditEntry {
                            action: AuditAction::RevokeQr,
                            table_name: QR_CODES_TABLE,
                            record_id: Some(after.id.clone()),
                            old_data: Some(serde_json::to_value(&before)?),
                            new_data: Some(serde_json::to_value(&after)?),
                            performed_by: actor,
                        },
                    )
                    .await?;
                    info!("credential {} revoked", after.id);
                    Ok(after)
                })
            })
            .await
            .map_err(BadgeError::from)
    }
}

/// Insert an active credential. A unique violation on `worker_id` means a
/// concurrent issuance won the race, one on `token` means the draw clashed.
async fn insert_credential<C: ConnectionTrait>(
    db: &C,
    worker_id: &str,
    token: String,
    actor: Option<String>,
) -> BadgeResult<Credential> {
    Credentials::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        worker_id: Set(worker_id.to_owned()),
        token: Set(token),
        is_revoked: Set(false),
        revoked_at: Set(None),
        created_at: Set(now_millis()),
        created_by: Set(actor),
    }
    .insert(db)
    .await
    .map_err(|e| match BadgeError::from(e) {
        BadgeError::Conflict(msg) if msg.contains("token") => {
            BadgeError::conflict("credential token already issued, try again")
        }
        BadgeError::Conflict(_) => BadgeError::conflict(format!(
            "worker {} already has an active credential",
            worker_id
        )),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge_rpc::db_ops::fixtures::{input, memory_db};
    use crate::badge_rpc::db_ops::{AuditRepo, CredentialRepo, DbOpsImpl, WorkerRepo};
    use std::sync::Mutex;

    /// Replays a fixed list of tokens, then repeats the last one
    struct Scripted(Mutex<Vec<String>>);

    impl Scripted {
        fn new(tokens: &[&str]) -> Self {
            Scripted(Mutex::new(tokens.iter().rev().map(|t| t.to_string()).collect()))
        }
    }

    impl TokenSource for Scripted {
        fn draw(&self) -> String {
            let mut tokens = self.0.lock().unwrap();
            if tokens.len() > 1 {
                tokens.pop().unwrap()
            } else {
                tokens[0].clone()
            }
        }
    }

    async fn setup(tokens: Option<Scripted>) -> (DbOpsImpl, CredentialLifecycle, String) {
        let (_, ops, lifecycle, worker_id) = setup_with_conn(tokens).await;
        (ops, lifecycle, worker_id)
    }

    async fn setup_with_conn(
        tokens: Option<Scripted>,
    ) -> (DatabaseConnection, DbOpsImpl, CredentialLifecycle, String) {
        let conn = memory_db().await;
        let ops = DbOpsImpl::new(conn.clone());
        let lifecycle = match tokens {
            Some(tokens) => CredentialLifecycle::with_tokens(conn.clone(), Arc::new(tokens)),
            None => CredentialLifecycle::new(conn.clone()),
        };
        let worker = ops.create_worker(input("Ana", "V-1"), None).await.unwrap();
        (conn, ops, lifecycle, worker.id)
    }

    #[tokio::test]
    async fn issue_creates_active_credential_and_audits() {
        let (ops, lifecycle, worker_id) = setup(None).await;
        let credential = lifecycle
            .issue(worker_id.clone(), Some("admin".to_owned()))
            .await
            .unwrap();
        assert!(credential.is_active());
        assert_eq!(credential.worker_id, worker_id);
        assert_eq!(credential.token.len(), 43);
        assert_eq!(credential.created_by.as_deref(), Some("admin"));

        let logs = ops.list_audit_logs(None).await.unwrap();
        assert_eq!(logs[0].action, AuditAction::GenerateQr);
        assert_eq!(logs[0].table_name, QR_CODES_TABLE);
        assert_eq!(logs[0].record_id.as_deref(), Some(credential.id.as_str()));
    }

    #[tokio::test]
    async fn second_issue_conflicts_and_writes_nothing() {
        let (ops, lifecycle, worker_id) = setup(None).await;
        lifecycle.issue(worker_id.clone(), None).await.unwrap();
        let err = lifecycle.issue(worker_id.clone(), None).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(ops.list_credentials(worker_id).await.unwrap().len(), 1);
        let issued = ops
            .list_audit_logs(None)
            .await
            .unwrap()
            .into_iter()
            .filter(|l| l.action == AuditAction::GenerateQr)
            .count();
        assert_eq!(issued, 1);
    }

    #[tokio::test]
    async fn issue_after_revoke_succeeds() {
        let (ops, lifecycle, worker_id) = setup(None).await;
        let first = lifecycle.issue(worker_id.clone(), None).await.unwrap();
        lifecycle.revoke(first.id.clone(), None).await.unwrap();
        let second = lifecycle.issue(worker_id.clone(), None).await.unwrap();
        assert_ne!(first.token, second.token);

        let credentials = ops.list_credentials(worker_id).await.unwrap();
        assert_eq!(credentials.iter().filter(|c| c.is_active()).count(), 1);
    }

    #[tokio::test]
    async fn issue_for_missing_or_deleted_worker_is_not_found() {
        let (ops, lifecycle, worker_id) = setup(None).await;
        assert!(lifecycle
            .issue("missing".to_owned(), None)
            .await
            .unwrap_err()
            .is_not_found());

        ops.delete_worker(worker_id.clone(), None).await.unwrap();
        assert!(lifecycle
            .issue(worker_id, None)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn colliding_token_is_drawn_again() {
        let (ops, lifecycle, worker_id) = setup(Some(Scripted::new(&["t-1", "t-1", "t-2"]))).await;
        let first = lifecycle.issue(worker_id.clone(), None).await.unwrap();
        assert_eq!(first.token, "t-1");
        lifecycle.revoke(first.id, None).await.unwrap();

        let second = lifecycle.issue(worker_id.clone(), None).await.unwrap();
        assert_eq!(second.token, "t-2");
        assert_eq!(ops.list_credentials(worker_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_token_source_is_storage_error() {
        let (ops, lifecycle, worker_id) = setup(Some(Scripted::new(&["t-1"]))).await;
        let first = lifecycle.issue(worker_id.clone(), None).await.unwrap();
        lifecycle.revoke(first.id, None).await.unwrap();

        let err = lifecycle.issue(worker_id.clone(), None).await.unwrap_err();
        assert!(matches!(err, BadgeError::Storage(_)));
        assert_eq!(ops.list_credentials(worker_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let (ops, lifecycle, worker_id) = setup(None).await;
        let credential = lifecycle.issue(worker_id, None).await.unwrap();

        let revoked = lifecycle
            .revoke(credential.id.clone(), Some("admin".to_owned()))
            .await
            .unwrap();
        assert!(revoked.is_revoked);
        assert!(revoked.revoked_at.is_some());

        let again = lifecycle.revoke(credential.id.clone(), None).await.unwrap();
        assert_eq!(again.revoked_at, revoked.revoked_at);

        let revocations: Vec<_> = ops
            .list_audit_logs(None)
            .await
            .unwrap()
            .into_iter()
            .filter(|l| l.action == AuditAction::RevokeQr)
            .collect();
        assert_eq!(revocations.len(), 1);
        assert_eq!(revocations[0].old_data.as_ref().unwrap()["isRevoked"], false);
        assert_eq!(revocations[0].new_data.as_ref().unwrap()["isRevoked"], true);
        assert_eq!(revocations[0].performed_by.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn revoke_unknown_is_not_found() {
        let (_ops, lifecycle, _) = setup(None).await;
        assert!(lifecycle
            .revoke("missing".to_owned(), None)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn store_rejects_second_active_credential() {
        let (conn, ops, lifecycle, worker_id) = setup_with_conn(None).await;
        let first = lifecycle.issue(worker_id.clone(), None).await.unwrap();

        let err = insert_credential(&conn, &worker_id, "t-raced".to_owned(), None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("already has an active credential"));

        let revoked = Credentials::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            worker_id: Set(worker_id.clone()),
            token: Set("t-old".to_owned()),
            is_revoked: Set(true),
            revoked_at: Set(Some(now_millis())),
            created_at: Set(now_millis()),
            created_by: Set(None),
        }
        .insert(&conn)
        .await
        .unwrap();
        assert!(revoked.is_revoked);

        let credentials = ops.list_credentials(worker_id).await.unwrap();
        assert_eq!(credentials.len(), 2);
        assert_eq!(credentials.iter().filter(|c| c.is_active()).count(), 1);
        assert!(credentials.iter().any(|c| c.id == first.id && c.is_active()));
    }

    #[tokio::test]
    async fn clashing_token_conflict_names_the_token() {
        let (conn, ops, lifecycle, worker_id) = setup_with_conn(None).await;
        let first = lifecycle.issue(worker_id, None).await.unwrap();
        let other = ops.create_worker(input("Bea", "V-2"), None).await.unwrap();

        let err = insert_credential(&conn, &other.id, first.token, None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("token"));
        assert!(ops.list_credentials(other.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_audit_rolls_back_issue() {
        let (conn, ops, lifecycle, worker_id) = setup_with_conn(None).await;
        conn.execute_unprepared("DROP TABLE audit_logs").await.unwrap();

        assert!(lifecycle.issue(worker_id.clone(), None).await.is_err());
        assert!(ops.list_credentials(worker_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_audit_rolls_back_revoke() {
        let (conn, ops, lifecycle, worker_id) = setup_with_conn(None).await;
        let credential = lifecycle.issue(worker_id, None).await.unwrap();
        conn.execute_unprepared("DROP TABLE audit_logs").await.unwrap();

        assert!(lifecycle.revoke(credential.id.clone(), None).await.is_err());
        let stored = ops.find_credential(credential.id).await.unwrap().unwrap();
        assert!(!stored.is_revoked);
        assert_eq!(stored.revoked_at, None);
    }
}
