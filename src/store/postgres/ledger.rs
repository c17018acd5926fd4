// ============================================================================
// LEDGER : budgets, expenses, incomes
// ============================================================================
//
// Every entry write runs in one transaction with the balance update:
//   1. lock the entry row (update / delete) and compare its amount with the
//      amount the service read
//   2. write the entry
//   3. UPDATE budgets SET total = total + delta
//        WHERE id = $budget AND total + delta >= 0
//   4. commit; zero rows at step 3 rolls everything back
//
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::*;

use super::PostgresGateway;
use crate::error::AppError;
use crate::models::budget;
use crate::store::{
    BalanceAdjustment, EntryKind, EntryWrite, LedgerEntry, LedgerReceipt, LedgerStore,
};

// expenses and incomes share their columns; one module per table
macro_rules! entry_table {
    ($rows:ident, $entity:ident) => {
        mod $rows {
            use super::*;
            use crate::models::$entity::{ActiveModel, Column, Entity};

            pub async fn find<C: ConnectionTrait>(
                conn: &C,
                id: i32,
            ) -> Result<Option<LedgerEntry>, DbErr> {
                Ok(Entity::find_by_id(id).one(conn).await?.map(LedgerEntry::from))
            }

            /// SELECT ... FOR UPDATE
            pub async fn find_locked<C: ConnectionTrait>(
                conn: &C,
                id: i32,
            ) -> Result<Option<LedgerEntry>, DbErr> {
                Ok(Entity::find_by_id(id)
                    .lock_exclusive()
                    .one(conn)
                    .await?
                    .map(LedgerEntry::from))
            }

            pub async fn list<C: ConnectionTrait>(
                conn: &C,
                budget_id: Option<i32>,
            ) -> Result<Vec<LedgerEntry>, DbErr> {
                let mut query = Entity::find();
                if let Some(budget_id) = budget_id {
                    query = query.filter(Column::BudgetId.eq(budget_id));
                }
                let rows = query
                    .order_by_desc(Column::Date)
                    .order_by_desc(Column::Id)
                    .all(conn)
                    .await?;
                Ok(rows.into_iter().map(LedgerEntry::from).collect())
            }

            pub async fn insert<C: ConnectionTrait>(
                conn: &C,
                budget_id: i32,
                concept: String,
                amount: Decimal,
                date: NaiveDate,
                now: DateTime<Utc>,
            ) -> Result<LedgerEntry, DbErr> {
                let row = ActiveModel {
                    concept: Set(concept),
                    amount: Set(amount),
                    date: Set(date),
                    budget_id: Set(budget_id),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(conn)
                .await?;
                Ok(row.into())
            }

            pub async fn update<C: ConnectionTrait>(
                conn: &C,
                id: i32,
                concept: String,
                amount: Decimal,
                date: NaiveDate,
                now: DateTime<Utc>,
            ) -> Result<LedgerEntry, DbErr> {
                let row = ActiveModel {
                    id: ActiveValue::Unchanged(id),
                    concept: Set(concept),
                    amount: Set(amount),
                    date: Set(date),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .update(conn)
                .await?;
                Ok(row.into())
            }

            pub async fn delete<C: ConnectionTrait>(conn: &C, id: i32) -> Result<u64, DbErr> {
                Ok(Entity::delete_by_id(id).exec(conn).await?.rows_affected)
            }
        }
    };
}

entry_table!(expense_rows, expense);
entry_table!(income_rows, income);

async fn find_entry<C: ConnectionTrait>(
    conn: &C,
    kind: EntryKind,
    id: i32,
    locked: bool,
) -> Result<Option<LedgerEntry>, DbErr> {
    match (kind, locked) {
        (EntryKind::Expense, false) => expense_rows::find(conn, id).await,
        (EntryKind::Expense, true) => expense_rows::find_locked(conn, id).await,
        (EntryKind::Income, false) => income_rows::find(conn, id).await,
        (EntryKind::Income, true) => income_rows::find_locked(conn, id).await,
    }
}

/// Locks the entry and checks it still holds what the caller read
async fn lock_unchanged<C: ConnectionTrait>(
    conn: &C,
    kind: EntryKind,
    id: i32,
    expected_amount: Decimal,
    budget_id: i32,
) -> Result<LedgerEntry, AppError> {
    let entry = find_entry(conn, kind, id, true)
        .await?
        .ok_or_else(|| AppError::not_found(kind.entity(), id))?;
    if entry.amount != expected_amount || entry.budget_id != budget_id {
        return Err(AppError::Consistency(format!(
            "{} {} changed since it was read",
            kind.entity(),
            id
        )));
    }
    Ok(entry)
}

/// `total += delta` guarded by `total + delta >= 0`
async fn adjust_balance<C: ConnectionTrait>(
    conn: &C,
    adjustment: BalanceAdjustment,
    now: DateTime<Utc>,
) -> Result<budget::Model, AppError> {
    let BalanceAdjustment { budget_id, delta } = adjustment;
    let result = budget::Entity::update_many()
        .col_expr(
            budget::Column::Total,
            Expr::col(budget::Column::Total).add(delta),
        )
        .col_expr(budget::Column::UpdatedAt, Expr::value(now))
        .filter(budget::Column::Id.eq(budget_id))
        .filter(Expr::expr(Expr::col(budget::Column::Total).add(delta)).gte(Decimal::ZERO))
        .exec(conn)
        .await?;

    let budget = budget::Entity::find_by_id(budget_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("budget", budget_id))?;

    if result.rows_affected == 0 {
        return Err(AppError::validation(format!(
            "budget {} has {} left, the change of {} would overdraw it",
            budget_id, budget.total, delta
        )));
    }
    Ok(budget)
}

#[async_trait]
impl LedgerStore for PostgresGateway {
    async fn budgets(&self) -> Result<Vec<budget::Model>, AppError> {
        Ok(budget::Entity::find()
            .order_by_asc(budget::Column::Name)
            .order_by_asc(budget::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn budget(&self, id: i32) -> Result<Option<budget::Model>, AppError> {
        Ok(budget::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn create_budget(
        &self,
        name: String,
        allocation: Decimal,
    ) -> Result<budget::Model, AppError> {
        let now = Utc::now();
        let budget = budget::ActiveModel {
            name: Set(name),
            initial_allocation: Set(allocation),
            total: Set(allocation),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(budget)
    }

    async fn rename_budget(
        &self,
        id: i32,
        name: String,
    ) -> Result<Option<budget::Model>, AppError> {
        let result = budget::Entity::update_many()
            .col_expr(budget::Column::Name, Expr::value(name))
            .col_expr(budget::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(budget::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.budget(id).await
    }

    async fn delete_budget(&self, id: i32) -> Result<bool, AppError> {
        // expenses/incomes cascade, projects.budget_id is set to NULL
        let result = budget::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn shift_allocation(
        &self,
        id: i32,
        expected_allocation: Decimal,
        delta: Decimal,
    ) -> Result<budget::Model, AppError> {
        let result = budget::Entity::update_many()
            .col_expr(
                budget::Column::InitialAllocation,
                Expr::col(budget::Column::InitialAllocation).add(delta),
            )
            .col_expr(
                budget::Column::Total,
                Expr::col(budget::Column::Total).add(delta),
            )
            .col_expr(budget::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(budget::Column::Id.eq(id))
            .filter(budget::Column::InitialAllocation.eq(expected_allocation))
            .filter(Expr::expr(Expr::col(budget::Column::Total).add(delta)).gte(Decimal::ZERO))
            .exec(&self.db)
            .await?;

        let budget = self
            .budget(id)
            .await?
            .ok_or_else(|| AppError::not_found("budget", id))?;

        if result.rows_affected == 0 {
            if budget.initial_allocation != expected_allocation {
                return Err(AppError::Consistency(format!(
                    "budget {} allocation changed concurrently",
                    id
                )));
            }
            return Err(AppError::validation(format!(
                "budget {} has {} left, cannot reduce the allocation by {}",
                id, budget.total, -delta
            )));
        }
        Ok(budget)
    }

    async fn entry(&self, kind: EntryKind, id: i32) -> Result<Option<LedgerEntry>, AppError> {
        Ok(find_entry(&self.db, kind, id, false).await?)
    }

    async fn entries(
        &self,
        kind: EntryKind,
        budget_id: Option<i32>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let entries = match kind {
            EntryKind::Expense => expense_rows::list(&self.db, budget_id).await?,
            EntryKind::Income => income_rows::list(&self.db, budget_id).await?,
        };
        Ok(entries)
    }

    async fn apply(
        &self,
        kind: EntryKind,
        write: EntryWrite,
        adjustment: BalanceAdjustment,
    ) -> Result<LedgerReceipt, AppError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let entry = match write {
            EntryWrite::Insert {
                budget_id,
                concept,
                amount,
                date,
            } => match kind {
                EntryKind::Expense => {
                    expense_rows::insert(&txn, budget_id, concept, amount, date, now).await?
                }
                EntryKind::Income => {
                    income_rows::insert(&txn, budget_id, concept, amount, date, now).await?
                }
            },
            EntryWrite::Update {
                id,
                expected_amount,
                concept,
                amount,
                date,
            } => {
                lock_unchanged(&txn, kind, id, expected_amount, adjustment.budget_id).await?;
                match kind {
                    EntryKind::Expense => {
                        expense_rows::update(&txn, id, concept, amount, date, now).await?
                    }
                    EntryKind::Income => {
                        income_rows::update(&txn, id, concept, amount, date, now).await?
                    }
                }
            }
            EntryWrite::Delete {
                id,
                expected_amount,
            } => {
                let entry =
                    lock_unchanged(&txn, kind, id, expected_amount, adjustment.budget_id).await?;
                let deleted = match kind {
                    EntryKind::Expense => expense_rows::delete(&txn, id).await?,
                    EntryKind::Income => income_rows::delete(&txn, id).await?,
                };
                if deleted == 0 {
                    return Err(AppError::Consistency(format!(
                        "{} {} vanished during the delete",
                        kind.entity(),
                        id
                    )));
                }
                entry
            }
        };

        // an early return drops `txn`, which rolls the entry write back
        let budget = adjust_balance(&txn, adjustment, now).await?;
        txn.commit().await?;

        Ok(LedgerReceipt { entry, budget })
    }
}
