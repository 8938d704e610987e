use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Issued QR credential. The token is the only public lookup key,
/// `revoked_at` is set exactly when `is_revoked` is.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "qr_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    pub worker_id: String,
    #[sea_orm(unique)]
    pub token: String,
    pub is_revoked: bool,
    pub revoked_at: Option<i64>,
    pub created_at: i64,
    pub created_by: Option<String>,
}

impl Model {
    pub fn is_active(&self) -> bool {
        !self.is_revoked
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::workers::Entity",
        from = "Column::WorkerId",
        to = "super::workers::Column::Id"
    )]
    Worker,
}

impl Related<super::workers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Worker.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
