use crate::common::AuditAction;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Write-once record of a mutation, the application never updates or deletes these rows
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub action: AuditAction,
    pub table_name: String,
    pub record_id: Option<String>,
    pub old_data: Option<Json>,
    pub new_data: Option<Json>,
    pub performed_by: Option<String>,
    pub performed_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
