use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

use crate::error::AppError;
use crate::models::budget;
use crate::models::dto::{
    LedgerEntryEdit, NewBudget, NewLedgerEntry, RenameBudget, SetAllocation, MAX_MONEY,
};
use crate::store::{BalanceAdjustment, EntryKind, EntryWrite, LedgerEntry, LedgerStore};

/// The three cards of the budget page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSummary {
    pub budget_id: i32,
    pub name: String,
    pub allocation: Decimal,
    pub total_expenses: Decimal,
    pub total_incomes: Decimal,
    pub remaining: Decimal,
}

/// Stored balance versus the balance recomputed from the entries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub budget_id: i32,
    pub initial_allocation: Decimal,
    pub total_incomes: Decimal,
    pub total_expenses: Decimal,
    pub expected_total: Decimal,
    pub stored_total: Decimal,
    pub drift: Decimal,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.drift.is_zero()
    }
}

/// Budgets and their expense/income entries.
///
/// `budget.total` is the live balance: every entry write moves it in the same
/// store call, so the remaining amount of a budget is simply its total.
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
}

/// Effect of an entry of `amount` on the balance
fn signed(kind: EntryKind, amount: Decimal) -> Decimal {
    match kind {
        EntryKind::Expense => -amount,
        EntryKind::Income => amount,
    }
}

fn sum(entries: &[LedgerEntry]) -> Decimal {
    entries.iter().map(|entry| entry.amount).sum()
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    // -----------------------------------------------------------------------
    // budgets
    // -----------------------------------------------------------------------

    #[tracing::instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_budget(&self, draft: NewBudget) -> Result<budget::Model, AppError> {
        draft.validate()?;
        let budget = self
            .store
            .create_budget(draft.name.trim().to_string(), draft.allocation)
            .await?;
        tracing::info!(budget_id = budget.id, total = %budget.total, "budget created");
        Ok(budget)
    }

    pub async fn list_budgets(&self) -> Result<Vec<budget::Model>, AppError> {
        self.store.budgets().await
    }

    pub async fn get_budget(&self, id: i32) -> Result<budget::Model, AppError> {
        self.store
            .budget(id)
            .await?
            .ok_or_else(|| AppError::not_found("budget", id))
    }

    #[tracing::instrument(skip(self, rename))]
    pub async fn rename_budget(
        &self,
        id: i32,
        rename: RenameBudget,
    ) -> Result<budget::Model, AppError> {
        rename.validate()?;
        self.store
            .rename_budget(id, rename.name.trim().to_string())
            .await?
            .ok_or_else(|| AppError::not_found("budget", id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_budget(&self, id: i32) -> Result<(), AppError> {
        if !self.store.delete_budget(id).await? {
            return Err(AppError::not_found("budget", id));
        }
        tracing::info!("budget deleted");
        Ok(())
    }

    /// Changes the money granted to a budget; the balance moves by the same difference
    #[tracing::instrument(skip(self, change), fields(allocation = %change.allocation))]
    pub async fn set_allocation(
        &self,
        id: i32,
        change: SetAllocation,
    ) -> Result<budget::Model, AppError> {
        change.validate()?;
        let budget = self.get_budget(id).await?;
        let delta = change.allocation - budget.initial_allocation;
        let total = budget
            .total
            .checked_add(delta)
            .filter(|total| *total <= MAX_MONEY)
            .ok_or_else(|| {
                AppError::validation(format!("budget {} cannot hold a balance above {}", id, MAX_MONEY))
            })?;
        if total < Decimal::ZERO {
            tracing::warn!(total = %budget.total, %delta, "allocation below what is already spent");
            return Err(AppError::validation(format!(
                "budget {} has already spent {}, the allocation cannot drop to {}",
                id,
                budget.initial_allocation - budget.total,
                change.allocation
            )));
        }
        let budget = self
            .store
            .shift_allocation(id, budget.initial_allocation, delta)
            .await?;
        tracing::info!(total = %budget.total, "allocation changed");
        Ok(budget)
    }

    /// The balance left to spend
    pub async fn get_remaining(&self, budget_id: i32) -> Result<Decimal, AppError> {
        Ok(self.get_budget(budget_id).await?.total)
    }

    pub async fn summary(&self, budget_id: i32) -> Result<BudgetSummary, AppError> {
        let (budget, expenses, incomes) = tokio::try_join!(
            self.get_budget(budget_id),
            self.store.entries(EntryKind::Expense, Some(budget_id)),
            self.store.entries(EntryKind::Income, Some(budget_id)),
        )?;
        Ok(BudgetSummary {
            budget_id,
            name: budget.name,
            allocation: budget.initial_allocation,
            total_expenses: sum(&expenses),
            total_incomes: sum(&incomes),
            remaining: budget.total,
        })
    }

    pub async fn reconcile(&self, budget_id: i32) -> Result<Reconciliation, AppError> {
        let (budget, expenses, incomes) = tokio::try_join!(
            self.get_budget(budget_id),
            self.store.entries(EntryKind::Expense, Some(budget_id)),
            self.store.entries(EntryKind::Income, Some(budget_id)),
        )?;
        let total_expenses = sum(&expenses);
        let total_incomes = sum(&incomes);
        let expected_total = budget.initial_allocation + total_incomes - total_expenses;
        Ok(Reconciliation {
            budget_id,
            initial_allocation: budget.initial_allocation,
            total_incomes,
            total_expenses,
            expected_total,
            stored_total: budget.total,
            drift: budget.total - expected_total,
        })
    }

    /// `reconcile`, with any drift reported as a consistency error
    pub async fn ensure_consistent(&self, budget_id: i32) -> Result<Reconciliation, AppError> {
        let reconciliation = self.reconcile(budget_id).await?;
        if !reconciliation.is_consistent() {
            tracing::error!(
                budget_id,
                drift = %reconciliation.drift,
                "stored balance does not match the entries"
            );
            return Err(AppError::Consistency(format!(
                "budget {} balance is {} but its entries add up to {}",
                budget_id, reconciliation.stored_total, reconciliation.expected_total
            )));
        }
        Ok(reconciliation)
    }

    // -----------------------------------------------------------------------
    // expenses
    // -----------------------------------------------------------------------

    pub async fn add_expense(
        &self,
        budget_id: i32,
        draft: NewLedgerEntry,
    ) -> Result<LedgerEntry, AppError> {
        self.add_entry(EntryKind::Expense, budget_id, draft).await
    }

    pub async fn update_expense(
        &self,
        expense_id: i32,
        edit: LedgerEntryEdit,
    ) -> Result<LedgerEntry, AppError> {
        self.update_entry(EntryKind::Expense, expense_id, edit).await
    }

    pub async fn delete_expense(&self, expense_id: i32) -> Result<(), AppError> {
        self.delete_entry(EntryKind::Expense, expense_id).await
    }

    pub async fn get_expense(&self, expense_id: i32) -> Result<LedgerEntry, AppError> {
        self.get_entry(EntryKind::Expense, expense_id).await
    }

    pub async fn list_expenses(&self, budget_id: i32) -> Result<Vec<LedgerEntry>, AppError> {
        self.list_entries(EntryKind::Expense, budget_id).await
    }

    pub async fn list_all_expenses(&self) -> Result<Vec<LedgerEntry>, AppError> {
        self.store.entries(EntryKind::Expense, None).await
    }

    // -----------------------------------------------------------------------
    // incomes
    // -----------------------------------------------------------------------

    pub async fn add_income(
        &self,
        budget_id: i32,
        draft: NewLedgerEntry,
    ) -> Result<LedgerEntry, AppError> {
        self.add_entry(EntryKind::Income, budget_id, draft).await
    }

    pub async fn update_income(
        &self,
        income_id: i32,
        edit: LedgerEntryEdit,
    ) -> Result<LedgerEntry, AppError> {
        self.update_entry(EntryKind::Income, income_id, edit).await
    }

    pub async fn delete_income(&self, income_id: i32) -> Result<(), AppError> {
        self.delete_entry(EntryKind::Income, income_id).await
    }

    pub async fn get_income(&self, income_id: i32) -> Result<LedgerEntry, AppError> {
        self.get_entry(EntryKind::Income, income_id).await
    }

    pub async fn list_incomes(&self, budget_id: i32) -> Result<Vec<LedgerEntry>, AppError> {
        self.list_entries(EntryKind::Income, budget_id).await
    }

    pub async fn list_all_incomes(&self) -> Result<Vec<LedgerEntry>, AppError> {
        self.store.entries(EntryKind::Income, None).await
    }

    // -----------------------------------------------------------------------
    // shared by expenses and incomes
    // -----------------------------------------------------------------------

    async fn get_entry(&self, kind: EntryKind, id: i32) -> Result<LedgerEntry, AppError> {
        self.store
            .entry(kind, id)
            .await?
            .ok_or_else(|| AppError::not_found(kind.entity(), id))
    }

    async fn list_entries(
        &self,
        kind: EntryKind,
        budget_id: i32,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        self.get_budget(budget_id).await?;
        self.store.entries(kind, Some(budget_id)).await
    }

    /// Rejects a balance change that would leave the budget below zero
    fn check_balance(
        &self,
        kind: EntryKind,
        budget: &budget::Model,
        delta: Decimal,
    ) -> Result<(), AppError> {
        let total = budget
            .total
            .checked_add(delta)
            .filter(|total| *total <= MAX_MONEY)
            .ok_or_else(|| {
                AppError::validation(format!(
                    "budget {} cannot hold a balance above {}",
                    budget.id, MAX_MONEY
                ))
            })?;
        if total >= Decimal::ZERO {
            return Ok(());
        }
        tracing::warn!(budget_id = budget.id, total = %budget.total, %delta, "balance would go negative");
        let message = match kind {
            EntryKind::Expense => format!(
                "amount exceeds the remaining budget: {} left in budget {}",
                budget.total, budget.id
            ),
            EntryKind::Income => format!(
                "budget {} has already spent this income: {} left, change of {}",
                budget.id, budget.total, delta
            ),
        };
        Err(AppError::Validation(message))
    }

    #[tracing::instrument(skip(self, draft), fields(kind = kind.entity(), amount = %draft.amount))]
    async fn add_entry(
        &self,
        kind: EntryKind,
        budget_id: i32,
        draft: NewLedgerEntry,
    ) -> Result<LedgerEntry, AppError> {
        draft.validate()?;
        let budget = self.get_budget(budget_id).await?;
        let delta = signed(kind, draft.amount);
        self.check_balance(kind, &budget, delta)?;

        let receipt = self
            .store
            .apply(
                kind,
                EntryWrite::Insert {
                    budget_id,
                    concept: draft.concept.trim().to_string(),
                    amount: draft.amount,
                    date: draft.date,
                },
                BalanceAdjustment { budget_id, delta },
            )
            .await?;
        tracing::info!(id = receipt.entry.id, total = %receipt.budget.total, "entry added");
        Ok(receipt.entry)
    }

    #[tracing::instrument(skip(self, edit), fields(kind = kind.entity(), amount = %edit.amount))]
    async fn update_entry(
        &self,
        kind: EntryKind,
        id: i32,
        edit: LedgerEntryEdit,
    ) -> Result<LedgerEntry, AppError> {
        edit.validate()?;
        let current = self.get_entry(kind, id).await?;
        let budget = self.get_budget(current.budget_id).await?;
        let delta = signed(kind, edit.amount) - signed(kind, current.amount);
        self.check_balance(kind, &budget, delta)?;

        let receipt = self
            .store
            .apply(
                kind,
                EntryWrite::Update {
                    id,
                    expected_amount: current.amount,
                    concept: edit.concept.trim().to_string(),
                    amount: edit.amount,
                    date: edit.date,
                },
                BalanceAdjustment {
                    budget_id: current.budget_id,
                    delta,
                },
            )
            .await?;
        tracing::info!(total = %receipt.budget.total, "entry updated");
        Ok(receipt.entry)
    }

    #[tracing::instrument(skip(self), fields(kind = kind.entity()))]
    async fn delete_entry(&self, kind: EntryKind, id: i32) -> Result<(), AppError> {
        let current = self.get_entry(kind, id).await?;
        let budget = self.get_budget(current.budget_id).await?;
        let delta = -signed(kind, current.amount);
        self.check_balance(kind, &budget, delta)?;

        let receipt = self
            .store
            .apply(
                kind,
                EntryWrite::Delete {
                    id,
                    expected_amount: current.amount,
                },
                BalanceAdjustment {
                    budget_id: current.budget_id,
                    delta,
                },
            )
            .await?;
        tracing::info!(total = %receipt.budget.total, "entry deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryGateway;
    use crate::utils::jwt::TokenIssuer;
    use chrono::NaiveDate;

    fn service() -> (LedgerService, MemoryGateway) {
        let gateway = MemoryGateway::new(Arc::new(TokenIssuer::new("test-secret", 1)));
        (LedgerService::new(Arc::new(gateway.clone())), gateway)
    }

    fn entry(concept: &str, amount: i64) -> NewLedgerEntry {
        NewLedgerEntry {
            concept: concept.into(),
            amount: Decimal::from(amount),
            date: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
        }
    }

    fn edit(concept: &str, amount: i64) -> LedgerEntryEdit {
        LedgerEntryEdit {
            concept: concept.into(),
            amount: Decimal::from(amount),
            date: NaiveDate::from_ymd_opt(2026, 3, 16).unwrap(),
        }
    }

    async fn budget(ledger: &LedgerService, allocation: i64) -> anyhow::Result<budget::Model> {
        Ok(ledger
            .create_budget(NewBudget {
                name: "Obra Norte".into(),
                allocation: Decimal::from(allocation),
            })
            .await?)
    }

    #[tokio::test]
    async fn budget_page_scenario() -> anyhow::Result<()> {
        let (ledger, _) = service();
        let budget = budget(&ledger, 1000).await?;

        let first = ledger.add_expense(budget.id, entry("Cemento", 200)).await?;
        assert_eq!(ledger.get_budget(budget.id).await?.total, Decimal::from(800));
        assert_eq!(ledger.get_remaining(budget.id).await?, Decimal::from(800));

        let rejected = ledger.add_expense(budget.id, entry("Grúa", 900)).await;
        assert!(matches!(rejected, Err(AppError::Validation(_))));
        assert_eq!(ledger.get_remaining(budget.id).await?, Decimal::from(800));

        ledger.update_expense(first.id, edit("Cemento", 300)).await?;
        assert_eq!(ledger.get_remaining(budget.id).await?, Decimal::from(700));

        ledger.delete_expense(first.id).await?;
        assert_eq!(ledger.get_remaining(budget.id).await?, Decimal::from(1000));
        Ok(())
    }

    #[tokio::test]
    async fn expense_rows_carry_the_amount() -> anyhow::Result<()> {
        let (ledger, _) = service();
        let budget = budget(&ledger, 500).await?;
        let expense = ledger.add_expense(budget.id, entry("Arena", 120)).await?;

        let stored = ledger.get_expense(expense.id).await?;
        assert_eq!(stored.amount, Decimal::from(120));
        assert_eq!(stored.budget_id, budget.id);
        assert_eq!(ledger.list_expenses(budget.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn spending_the_exact_remaining_is_allowed() -> anyhow::Result<()> {
        let (ledger, _) = service();
        let budget = budget(&ledger, 250).await?;
        ledger.add_expense(budget.id, entry("Todo", 250)).await?;
        assert_eq!(ledger.get_remaining(budget.id).await?, Decimal::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn add_then_delete_restores_the_total() -> anyhow::Result<()> {
        let (ledger, _) = service();
        let budget = budget(&ledger, 1000).await?;
        for amount in [1, 37, 250, 999] {
            let expense = ledger.add_expense(budget.id, entry("Material", amount)).await?;
            assert_eq!(
                ledger.get_remaining(budget.id).await?,
                Decimal::from(1000 - amount)
            );
            ledger.delete_expense(expense.id).await?;
            assert_eq!(ledger.get_remaining(budget.id).await?, Decimal::from(1000));
        }
        Ok(())
    }

    #[tokio::test]
    async fn update_matches_delete_then_add() -> anyhow::Result<()> {
        let (ledger, _) = service();
        let updated = budget(&ledger, 1000).await?;
        let replaced = budget(&ledger, 1000).await?;

        let a = ledger.add_expense(updated.id, entry("Acero", 400)).await?;
        ledger.update_expense(a.id, edit("Acero", 650)).await?;

        let b = ledger.add_expense(replaced.id, entry("Acero", 400)).await?;
        ledger.delete_expense(b.id).await?;
        ledger.add_expense(replaced.id, entry("Acero", 650)).await?;

        assert_eq!(ledger.get_remaining(updated.id).await?, Decimal::from(350));
        assert_eq!(
            ledger.get_remaining(updated.id).await?,
            ledger.get_remaining(replaced.id).await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn update_cannot_overdraw() -> anyhow::Result<()> {
        let (ledger, _) = service();
        let budget = budget(&ledger, 500).await?;
        let expense = ledger.add_expense(budget.id, entry("Acero", 300)).await?;

        // 200 left + 300 already spent on this row = 500 max
        assert!(ledger.update_expense(expense.id, edit("Acero", 501)).await.is_err());
        ledger.update_expense(expense.id, edit("Acero", 500)).await?;
        assert_eq!(ledger.get_remaining(budget.id).await?, Decimal::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn huge_amounts_are_refused_not_panicked() -> anyhow::Result<()> {
        let (ledger, _) = service();
        let budget = budget(&ledger, 100).await?;

        let draft = NewLedgerEntry {
            amount: Decimal::MAX,
            ..entry("Subvención", 1)
        };
        let result = ledger.add_income(budget.id, draft).await;
        assert!(result.is_err_and(|e| e.is_validation()));

        // each income fits the column, the sum would not
        let draft = NewLedgerEntry {
            amount: MAX_MONEY,
            ..entry("Subvención", 1)
        };
        let result = ledger.add_income(budget.id, draft).await;
        assert!(result.is_err_and(|e| e.is_validation()));

        let result = ledger
            .set_allocation(budget.id, SetAllocation { allocation: MAX_MONEY })
            .await?;
        assert_eq!(result.total, MAX_MONEY);
        let result = ledger.add_income(budget.id, entry("Extra", 1)).await;
        assert!(result.is_err_and(|e| e.is_validation()));

        assert_eq!(ledger.get_remaining(budget.id).await?, MAX_MONEY);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts_and_blank_concepts() -> anyhow::Result<()> {
        let (ledger, _) = service();
        let budget = budget(&ledger, 100).await?;
        for draft in [entry("Cero", 0), entry("Negativo", -5), entry("   ", 10)] {
            let result = ledger.add_expense(budget.id, draft).await;
            assert!(result.is_err_and(|e| e.is_validation()));
        }
        assert_eq!(ledger.get_remaining(budget.id).await?, Decimal::from(100));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_budget_or_entry_is_not_found() -> anyhow::Result<()> {
        let (ledger, _) = service();
        assert!(matches!(
            ledger.add_expense(77, entry("X", 1)).await,
            Err(AppError::NotFound { entity: "budget", .. })
        ));
        assert!(matches!(
            ledger.update_expense(78, edit("X", 1)).await,
            Err(AppError::NotFound { entity: "expense", .. })
        ));
        assert!(matches!(
            ledger.delete_income(79).await,
            Err(AppError::NotFound { entity: "income", .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn incomes_raise_the_balance_until_spent() -> anyhow::Result<()> {
        let (ledger, _) = service();
        let budget = budget(&ledger, 100).await?;
        let income = ledger.add_income(budget.id, entry("Certificación", 400)).await?;
        assert_eq!(ledger.get_remaining(budget.id).await?, Decimal::from(500));

        ledger.add_expense(budget.id, entry("Encofrado", 450)).await?;

        // the income is spent: removing it or shrinking it below 350 would overdraw
        assert!(matches!(
            ledger.delete_income(income.id).await,
            Err(AppError::Validation(_))
        ));
        assert!(ledger.update_income(income.id, edit("Certificación", 349)).await.is_err());
        ledger.update_income(income.id, edit("Certificación", 350)).await?;
        assert_eq!(ledger.get_remaining(budget.id).await?, Decimal::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn storage_failure_leaves_the_balance_unchanged() -> anyhow::Result<()> {
        let (ledger, gateway) = service();
        let budget = budget(&ledger, 1000).await?;

        gateway.fail_next_write("connection reset");
        let result = ledger.add_expense(budget.id, entry("Andamio", 100)).await;
        assert!(matches!(result, Err(AppError::Storage(_))));
        assert_eq!(ledger.get_remaining(budget.id).await?, Decimal::from(1000));
        assert!(ledger.list_expenses(budget.id).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_change_is_a_consistency_error() -> anyhow::Result<()> {
        let (ledger, gateway) = service();
        let budget = budget(&ledger, 1000).await?;
        let expense = ledger.add_expense(budget.id, entry("Pintura", 100)).await?;

        // another writer changes the row between our read and our write
        gateway
            .apply(
                EntryKind::Expense,
                EntryWrite::Update {
                    id: expense.id,
                    expected_amount: Decimal::from(100),
                    concept: "Pintura".into(),
                    amount: Decimal::from(150),
                    date: expense.date,
                },
                BalanceAdjustment {
                    budget_id: budget.id,
                    delta: Decimal::from(-50),
                },
            )
            .await?;
        let stale = gateway
            .apply(
                EntryKind::Expense,
                EntryWrite::Delete {
                    id: expense.id,
                    expected_amount: Decimal::from(100),
                },
                BalanceAdjustment {
                    budget_id: budget.id,
                    delta: Decimal::from(100),
                },
            )
            .await;
        assert!(matches!(stale, Err(AppError::Consistency(_))));

        // the service re-reads, so its own delete goes through
        ledger.delete_expense(expense.id).await?;
        assert_eq!(ledger.get_remaining(budget.id).await?, Decimal::from(1000));
        Ok(())
    }

    #[tokio::test]
    async fn summary_and_reconciliation() -> anyhow::Result<()> {
        let (ledger, _) = service();
        let budget = budget(&ledger, 1000).await?;
        ledger.add_expense(budget.id, entry("Cemento", 200)).await?;
        ledger.add_expense(budget.id, entry("Arena", 50)).await?;
        ledger.add_income(budget.id, entry("Anticipo", 300)).await?;

        let summary = ledger.summary(budget.id).await?;
        assert_eq!(summary.allocation, Decimal::from(1000));
        assert_eq!(summary.total_expenses, Decimal::from(250));
        assert_eq!(summary.total_incomes, Decimal::from(300));
        assert_eq!(summary.remaining, Decimal::from(1050));

        let reconciliation = ledger.ensure_consistent(budget.id).await?;
        assert!(reconciliation.is_consistent());
        assert_eq!(reconciliation.expected_total, Decimal::from(1050));
        Ok(())
    }

    #[tokio::test]
    async fn drift_is_reported() -> anyhow::Result<()> {
        let (ledger, gateway) = service();
        let budget = budget(&ledger, 1000).await?;
        ledger.add_expense(budget.id, entry("Cemento", 200)).await?;

        // a balance write without its entry
        gateway
            .apply(
                EntryKind::Expense,
                EntryWrite::Insert {
                    budget_id: budget.id,
                    concept: "Fantasma".into(),
                    amount: Decimal::from(10),
                    date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                },
                BalanceAdjustment {
                    budget_id: budget.id,
                    delta: Decimal::from(-30),
                },
            )
            .await?;

        let reconciliation = ledger.reconcile(budget.id).await?;
        assert_eq!(reconciliation.drift, Decimal::from(-20));
        assert!(matches!(
            ledger.ensure_consistent(budget.id).await,
            Err(AppError::Consistency(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn allocation_changes_move_the_balance() -> anyhow::Result<()> {
        let (ledger, _) = service();
        let budget = budget(&ledger, 1000).await?;
        ledger.add_expense(budget.id, entry("Cemento", 600)).await?;

        let raised = ledger
            .set_allocation(budget.id, SetAllocation { allocation: Decimal::from(1500) })
            .await?;
        assert_eq!(raised.initial_allocation, Decimal::from(1500));
        assert_eq!(raised.total, Decimal::from(900));

        let too_low = ledger
            .set_allocation(budget.id, SetAllocation { allocation: Decimal::from(500) })
            .await;
        assert!(matches!(too_low, Err(AppError::Validation(_))));
        assert!(ledger.ensure_consistent(budget.id).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn deleting_a_budget_removes_its_entries() -> anyhow::Result<()> {
        let (ledger, _) = service();
        let kept = budget(&ledger, 100).await?;
        let gone = budget(&ledger, 100).await?;
        ledger.add_expense(kept.id, entry("A", 10)).await?;
        ledger.add_expense(gone.id, entry("B", 10)).await?;

        ledger.delete_budget(gone.id).await?;
        assert_eq!(ledger.list_all_expenses().await?.len(), 1);
        assert!(matches!(
            ledger.list_expenses(gone.id).await,
            Err(AppError::NotFound { .. })
        ));
        assert!(matches!(ledger.delete_budget(gone.id).await, Err(AppError::NotFound { .. })));
        Ok(())
    }
}
