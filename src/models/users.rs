use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

use super::role::Role;
use crate::error::AppError;

/// User profile. The credentials live in `auth_accounts`, linked by `auth_id`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
    pub name: String,
    pub role: String,   // wire format, read through role()
    #[sea_orm(unique)]
    pub auth_id: Uuid,
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Translates the stored role string into the canonical enum
    pub fn role(&self) -> Result<Role, AppError> {
        self.role.parse::<Role>().map_err(|e| {
            AppError::Consistency(format!("user {} has an unknown role: {}", self.id, e))
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::auth_account::Entity",
        from = "Column::AuthId",
        to = "super::auth_account::Column::AuthId",
        on_delete = "Cascade"
    )]
    AuthAccount,

    #[sea_orm(has_many = "super::attendance::Entity")]
    Attendance,
}

impl Related<super::auth_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AuthAccount.def()
    }
}

impl Related<super::attendance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Attendance.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
