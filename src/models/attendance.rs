// ============================================================================
// MODÈLE : ATTENDANCE RECORDS
// ============================================================================
//
// Columns:
//   - id (SERIAL PRIMARY KEY)
//   - employee_id (INTEGER NOT NULL, users.id)
//   - type ('entry' | 'exit')
//   - timestamp (TIMESTAMPTZ NOT NULL)
//   - work_date (DATE NOT NULL) - calendar day of `timestamp` in the
//     configured attendance timezone, computed once when the record is written
//
// Points d'attention:
//   - UNIQUE (employee_id, type, work_date): at most one entry and one exit
//     per employee per day, even with two concurrent clicks
//
// ============================================================================

use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum AttendanceKind {
    #[sea_orm(string_value = "entry")]
    Entry,
    #[sea_orm(string_value = "exit")]
    Exit,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "attendance_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub employee_id: i32,
    #[serde(rename = "type")]
    #[sea_orm(column_name = "type")]
    pub kind: AttendanceKind,
    pub timestamp: DateTimeUtc,
    pub work_date: Date,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::EmployeeId",
        to = "super::users::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
