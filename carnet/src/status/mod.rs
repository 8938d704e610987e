//! Pure predicates over a worker and its credentials, shared by the
//! lifecycle manager and the listing views. Nothing here touches the store.

use chrono::NaiveDate;
use entity::credentials::Model as Credential;
use entity::workers::Model as Worker;
use entity::WorkerStatus;
use serde::{Deserialize, Serialize};

/// A worker row together with every credential issued to it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerWithCredentials {
    #[serde(flatten)]
    pub worker: Worker,
    pub qr_codes: Vec<Credential>,
}

impl WorkerWithCredentials {
    pub fn new(worker: Worker, qr_codes: Vec<Credential>) -> Self {
        WorkerWithCredentials { worker, qr_codes }
    }

    pub fn has_active_credential(&self) -> bool {
        has_active_credential(&self.qr_codes)
    }

    pub fn active_credential(&self) -> Option<&Credential> {
        active_credential(&self.qr_codes)
    }
}

pub fn has_active_credential(credentials: &[Credential]) -> bool {
    credentials.iter().any(|c| !c.is_revoked)
}

pub fn active_credential(credentials: &[Credential]) -> Option<&Credential> {
    credentials.iter().find(|c| !c.is_revoked)
}

/// Status shown in listings: an ACTIVO worker past its `valid_until` day displays as VENCIDO
pub fn effective_status(worker: &Worker, today: NaiveDate) -> WorkerStatus {
    match worker.status {
        WorkerStatus::Activo if worker.valid_until < today => WorkerStatus::Vencido,
        other => other,
    }
}

/// Dashboard counters, always recomputed from the current rows
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub expired: usize,
    #[serde(rename = "withQR")]
    pub with_qr: usize,
}

pub fn compute_stats(workers: &[WorkerWithCredentials]) -> DashboardStats {
    workers.iter().fold(DashboardStats::default(), |mut stats, w| {
        stats.total += 1;
        match w.worker.status {
            WorkerStatus::Activo => stats.active += 1,
            WorkerStatus::Inactivo => stats.inactive += 1,
            WorkerStatus::Vencido => stats.expired += 1,
        }
        if w.has_active_credential() {
            stats.with_qr += 1;
        }
        stats
    })
}
