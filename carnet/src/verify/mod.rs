//! Public verification of a scanned token. Nothing here writes, and every
//! failure collapses to an INVALID verdict.

use crate::badge_rpc::db_ops::{CredentialRepo, WorkerRepo};
use chrono::{Local, NaiveDate};
use entity::credentials::Model as Credential;
use entity::workers::Model as Worker;
use entity::WorkerStatus;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest token looked up in the store, longer input is rejected unread
pub const MAX_TOKEN_LEN: usize = 256;

pub const MSG_REVOKED: &str = "Este código QR ha sido revocado y ya no es válido.";
pub const MSG_INVALID: &str = "Este código QR no corresponde a ningún trabajador activo.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Valid,
    Expired,
    Revoked,
    Invalid,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Valid => "VALID",
            Verdict::Expired => "EXPIRED",
            Verdict::Revoked => "REVOKED",
            Verdict::Invalid => "INVALID",
        }
    }

    /// Only these verdicts may disclose who the credential belongs to
    pub fn shows_worker(&self) -> bool {
        matches!(self, Verdict::Valid | Verdict::Expired)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The part of a worker record printed on a verified badge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicWorker {
    pub internal_id: String,
    pub first_name: String,
    pub last_name: String,
    pub cedula: String,
    pub photo_url: Option<String>,
    pub position: String,
    pub department: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub status: WorkerStatus,
    pub valid_until: NaiveDate,
}

impl PublicWorker {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl From<&Worker> for PublicWorker {
    fn from(worker: &Worker) -> Self {
        PublicWorker {
            internal_id: worker.internal_id.clone(),
            first_name: worker.first_name.clone(),
            last_name: worker.last_name.clone(),
            cedula: worker.cedula.clone(),
            photo_url: worker.photo_url.clone(),
            position: worker.position.clone(),
            department: worker.department.clone(),
            phone: worker.phone.clone(),
            email: worker.email.clone(),
            status: worker.status,
            valid_until: worker.valid_until,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub verdict: Verdict,
    pub message: String,
    pub worker: Option<PublicWorker>,
    pub expired_on: Option<NaiveDate>,
}

impl Verification {
    pub fn invalid() -> Self {
        Verification {
            verdict: Verdict::Invalid,
            message: MSG_INVALID.to_owned(),
            worker: None,
            expired_on: None,
        }
    }

    pub fn revoked() -> Self {
        Verification {
            verdict: Verdict::Revoked,
            message: MSG_REVOKED.to_owned(),
            worker: None,
            expired_on: None,
        }
    }
}

/// dd/mm/yyyy, the format printed on badges
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Server local calendar date
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Derive the verdict from already loaded rows.
///
/// A revoked credential wins over every worker state. The worker must be
/// ACTIVO and not deleted, then `valid_until` is compared by calendar date
/// only so the badge holds through the whole of its last day.
pub fn evaluate(
    credential: Option<&Credential>,
    worker: Option<&Worker>,
    today: NaiveDate,
) -> Verification {
    let credential = match credential {
        Some(c) => c,
        None => return Verification::invalid(),
    };
    if credential.is_revoked {
        return Verification::revoked();
    }

    let worker = match worker {
        Some(w) if w.id == credential.worker_id => w,
        _ => return Verification::invalid(),
    };
    if worker.status != WorkerStatus::Activo || worker.is_deleted() {
        return Verification::invalid();
    }

    if worker.valid_until < today {
        Verification {
            verdict: Verdict::Expired,
            message: format!(
                "La vigencia de este carnet expiró el {}",
                format_date(worker.valid_until)
            ),
            worker: Some(worker.into()),
            expired_on: Some(worker.valid_until),
        }
    } else {
        Verification {
            verdict: Verdict::Valid,
            message: format!("Carnet vigente hasta el {}", format_date(worker.valid_until)),
            worker: Some(worker.into()),
            expired_on: None,
        }
    }
}

/// Look the token up and evaluate it against current store state.
/// Store failures are logged and reported as INVALID, never as an error.
pub async fn verify_token<R>(repo: &R, token: &str, today: NaiveDate) -> Verification
where
    R: CredentialRepo + WorkerRepo + Sync + ?Sized,
{
    if token.is_empty() || token.len() > MAX_TOKEN_LEN {
        debug!("rejecting token of length {} without lookup", token.len());
        return Verification::invalid();
    }

    let credential = match repo.find_credential_by_token(token.to_owned()).await {
        Ok(Some(c)) => c,
        Ok(None) => return Verification::invalid(),
        Err(e) => {
            error!("credential lookup failed during verification: {}", e);
            return Verification::invalid();
        }
    };
    if credential.is_revoked {
        return Verification::revoked();
    }

    let worker = match repo.find_worker(credential.worker_id.clone()).await {
        Ok(worker) => worker,
        Err(e) => {
            error!("worker lookup failed during verification: {}", e);
            return Verification::invalid();
        }
    };
    evaluate(Some(&credential), worker.as_ref(), today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge_rpc::db_ops::fixtures::{input, memory_db};
    use crate::badge_rpc::db_ops::DbOpsImpl;
    use crate::lifecycle::{CredentialLifecycle, LifecycleApi};
    use crate::status::fixtures::{credential, worker};
    use chrono::Duration;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn active_worker_within_window_is_valid() {
        let today = day(2024, 6, 10);
        let w = worker("w", WorkerStatus::Activo, today + Duration::days(1));
        let c = credential("c", "w", false);
        let v = evaluate(Some(&c), Some(&w), today);
        assert_eq!(v.verdict, Verdict::Valid);
        assert_eq!(v.message, "Carnet vigente hasta el 11/06/2024");
        assert_eq!(v.worker.unwrap().internal_id, w.internal_id);
    }

    #[test]
    fn last_day_is_still_valid() {
        let today = day(2024, 6, 10);
        let w = worker("w", WorkerStatus::Activo, today);
        let c = credential("c", "w", false);
        assert_eq!(evaluate(Some(&c), Some(&w), today).verdict, Verdict::Valid);
    }

    #[test]
    fn past_window_is_expired_with_date() {
        let today = day(2024, 6, 10);
        let yesterday = today - Duration::days(1);
        let w = worker("w", WorkerStatus::Activo, yesterday);
        let c = credential("c", "w", false);
        let v = evaluate(Some(&c), Some(&w), today);
        assert_eq!(v.verdict, Verdict::Expired);
        assert_eq!(v.expired_on, Some(yesterday));
        assert_eq!(v.message, "La vigencia de este carnet expiró el 09/06/2024");
        assert!(v.worker.is_some());
    }

    #[test]
    fn revoked_wins_over_everything() {
        let today = day(2024, 6, 10);
        let c = credential("c", "w", true);
        for status in [WorkerStatus::Activo, WorkerStatus::Inactivo, WorkerStatus::Vencido] {
            let w = worker("w", status, today - Duration::days(30));
            let v = evaluate(Some(&c), Some(&w), today);
            assert_eq!(v.verdict, Verdict::Revoked);
            assert!(v.worker.is_none());
        }
        assert_eq!(evaluate(Some(&c), None, today).verdict, Verdict::Revoked);
    }

    #[test]
    fn unknown_token_is_invalid() {
        let v = evaluate(None, None, day(2024, 6, 10));
        assert_eq!(v.verdict, Verdict::Invalid);
        assert_eq!(v.message, MSG_INVALID);
        assert!(v.worker.is_none());
    }

    #[test]
    fn deleted_or_inactive_worker_is_invalid() {
        let today = day(2024, 6, 10);
        let c = credential("c", "w", false);

        let mut deleted = worker("w", WorkerStatus::Activo, today + Duration::days(10));
        deleted.deleted_at = Some(1);
        assert_eq!(evaluate(Some(&c), Some(&deleted), today).verdict, Verdict::Invalid);

        let inactive = worker("w", WorkerStatus::Inactivo, today + Duration::days(10));
        assert_eq!(evaluate(Some(&c), Some(&inactive), today).verdict, Verdict::Invalid);

        assert_eq!(evaluate(Some(&c), None, today).verdict, Verdict::Invalid);
    }

    #[test]
    fn verdict_wire_names() {
        assert_eq!(serde_json::to_value(Verdict::Expired).unwrap(), "EXPIRED");
        assert!(!Verdict::Revoked.shows_worker());
        assert!(Verdict::Valid.shows_worker());
    }

    #[tokio::test]
    async fn verdict_follows_store_changes() {
        let conn = memory_db().await;
        let ops = DbOpsImpl::new(conn.clone());
        let lifecycle = CredentialLifecycle::new(conn);
        let today = day(2024, 6, 10);

        let created = ops.create_worker(input("Ana", "V-1"), None).await.unwrap();
        let issued = lifecycle.issue(created.id.clone(), None).await.unwrap();

        let first = verify_token(&ops, &issued.token, today).await;
        assert_eq!(first.verdict, Verdict::Valid);
        assert_eq!(verify_token(&ops, &issued.token, today).await, first);
        let padded = format!("  {}\n", issued.token);
        assert_eq!(
            verify_token(&ops, &padded, today).await.verdict,
            Verdict::Invalid
        );

        lifecycle.revoke(issued.id.clone(), None).await.unwrap();
        let after = verify_token(&ops, &issued.token, today).await;
        assert_eq!(after.verdict, Verdict::Revoked);
        assert!(after.worker.is_none());
    }

    #[tokio::test]
    async fn deleted_worker_never_verifies() {
        let conn = memory_db().await;
        let ops = DbOpsImpl::new(conn.clone());
        let lifecycle = CredentialLifecycle::new(conn);

        let created = ops.create_worker(input("Ana", "V-1"), None).await.unwrap();
        let issued = lifecycle.issue(created.id.clone(), None).await.unwrap();
        ops.delete_worker(created.id, None).await.unwrap();

        let v = verify_token(&ops, &issued.token, day(2024, 6, 10)).await;
        assert_eq!(v.verdict, Verdict::Invalid);
    }

    #[tokio::test]
    async fn oversized_or_unknown_tokens_are_invalid() {
        let ops = DbOpsImpl::new(memory_db().await);
        let today = day(2024, 6, 10);
        let long = "a".repeat(MAX_TOKEN_LEN + 1);
        assert_eq!(verify_token(&ops, &long, today).await.verdict, Verdict::Invalid);
        assert_eq!(verify_token(&ops, "", today).await.verdict, Verdict::Invalid);
        assert_eq!(
            verify_token(&ops, "no-such-token", today).await.verdict,
            Verdict::Invalid
        );
    }
}
