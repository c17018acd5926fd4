// ============================================================================
// MODÈLE : BUDGETS
// ============================================================================
//
// Columns:
//   - id (SERIAL PRIMARY KEY)
//   - name (VARCHAR NOT NULL)
//   - initial_allocation (NUMERIC NOT NULL) - money granted to the budget,
//     moved only by an explicit allocation change
//   - total (NUMERIC NOT NULL) - live running balance:
//       initial_allocation + Σ incomes - Σ expenses
//   - created_at / updated_at (TIMESTAMPTZ)
//
// Points d'attention:
//   - total is never recomputed on read; every expense/income write adjusts
//     it in the same transaction (see store::postgres::ledger)
//   - CHECK (total >= 0) at the database level
//   - ON DELETE CASCADE for expenses/incomes, SET NULL for projects
//
// ============================================================================

use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "budgets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub initial_allocation: Decimal,
    pub total: Decimal,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::expense::Entity")]
    Expense,

    #[sea_orm(has_many = "super::income::Entity")]
    Income,

    #[sea_orm(has_many = "super::project::Entity")]
    Project,
}

impl Related<super::expense::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expense.def()
    }
}

impl Related<super::income::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Income.def()
    }
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
