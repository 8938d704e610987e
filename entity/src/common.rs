use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a worker as stored by administrators.
/// ACTIVO workers may verify, INACTIVO and VENCIDO never do.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum WorkerStatus {
    #[sea_orm(string_value = "ACTIVO")]
    Activo,
    #[sea_orm(string_value = "INACTIVO")]
    Inactivo,
    #[sea_orm(string_value = "VENCIDO")]
    Vencido,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Activo => "ACTIVO",
            WorkerStatus::Inactivo => "INACTIVO",
            WorkerStatus::Vencido => "VENCIDO",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVO" => Ok(WorkerStatus::Activo),
            "INACTIVO" => Ok(WorkerStatus::Inactivo),
            "VENCIDO" => Ok(WorkerStatus::Vencido),
            other => Err(format!("unknown worker status {}", other)),
        }
    }
}

/// Kind of mutation recorded in the audit log
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum AuditAction {
    #[sea_orm(string_value = "CREATE")]
    Create,
    #[sea_orm(string_value = "UPDATE")]
    Update,
    #[sea_orm(string_value = "DELETE")]
    Delete,
    #[sea_orm(string_value = "GENERATE_QR")]
    GenerateQr,
    #[sea_orm(string_value = "REVOKE_QR")]
    RevokeQr,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::GenerateQr => "GENERATE_QR",
            AuditAction::RevokeQr => "REVOKE_QR",
        };
        f.write_str(s)
    }
}
