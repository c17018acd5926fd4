use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::AppError;
use crate::models::role::Role;
use crate::models::task::TaskStatus;
use crate::state::AppState;

pub struct DashboardService;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Count(u64),
    Amount(Decimal),
}

/// One card of the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatCard {
    pub title: &'static str,
    pub value: StatValue,
}

#[derive(Debug, Clone, Copy)]
enum Metric {
    ActiveProjects,
    Projects,
    Staff,
    Workers,
    TasksInProgress,
    TasksPending,
    TasksCompleted,
    StockItems,
    LowStock,
    AttendanceToday,
    BudgetBalance,
    MonthExpenses,
}

fn cards(role: Role) -> &'static [(&'static str, Metric)] {
    use Metric::*;
    match role {
        Role::Admin => &[
            ("Proyectos Activos", ActiveProjects),
            ("Personal Total", Staff),
            ("Tareas en Proceso", TasksInProgress),
            ("Alertas Stock", LowStock),
        ],
        Role::SiteManager => &[
            ("Personal Activo", Workers),
            ("Tareas Pendientes", TasksPending),
            ("Asistencia Hoy", AttendanceToday),
        ],
        Role::ProjectManager => &[
            ("Presupuesto Total", BudgetBalance),
            ("Gastos del Mes", MonthExpenses),
            ("Proyectos Activos", ActiveProjects),
        ],
        Role::SupplyOfficer => &[("Items en Stock", StockItems), ("Alertas Stock", LowStock)],
        Role::WorksDirector => &[
            ("Proyectos", Projects),
            ("Personal Total", Staff),
            ("Tareas Completadas", TasksCompleted),
        ],
        Role::SuperAdmin => &[
            ("Usuarios Totales", Staff),
            ("Proyectos Activos", ActiveProjects),
            ("Alertas Stock", LowStock),
        ],
        // the worker page shows its own tasks and attendance instead
        Role::Worker => &[],
    }
}

impl DashboardService {
    /// Stat cards of the dashboard of `role`, computed from the live data
    pub async fn stats_for(state: &AppState, role: Role) -> Result<Vec<StatCard>, AppError> {
        let today = state.attendance.today();
        let mut stats = Vec::new();
        for &(title, metric) in cards(role) {
            let value = Self::measure(state, metric, today).await?;
            stats.push(StatCard { title, value });
        }
        Ok(stats)
    }

    async fn measure(state: &AppState, metric: Metric, today: NaiveDate) -> Result<StatValue, AppError> {
        let count = |n: usize| StatValue::Count(n as u64);
        let value = match metric {
            Metric::ActiveProjects => count(state.projects.active_projects(today).await?.len()),
            Metric::Projects => StatValue::Count(state.projects.count().await?),
            Metric::Staff => StatValue::Count(state.users.count().await?),
            Metric::Workers => count(state.users.users_with_role(Role::Worker).await?.len()),
            Metric::TasksInProgress => {
                count(state.tasks.tasks_by_status(TaskStatus::InProgress).await?.len())
            }
            Metric::TasksPending => {
                count(state.tasks.tasks_by_status(TaskStatus::Pending).await?.len())
            }
            Metric::TasksCompleted => {
                count(state.tasks.tasks_by_status(TaskStatus::Completed).await?.len())
            }
            Metric::StockItems => StatValue::Count(state.inventory.count().await?),
            Metric::LowStock => count(state.inventory.low_stock_items().await?.len()),
            Metric::AttendanceToday => count(state.attendance.stats(today).await?.present),
            Metric::BudgetBalance => StatValue::Amount(
                state
                    .ledger
                    .list_budgets()
                    .await?
                    .iter()
                    .map(|budget| budget.total)
                    .sum(),
            ),
            Metric::MonthExpenses => StatValue::Amount(
                state
                    .ledger
                    .list_all_expenses()
                    .await?
                    .iter()
                    .filter(|expense| {
                        expense.date.year() == today.year() && expense.date.month() == today.month()
                    })
                    .map(|expense| expense.amount)
                    .sum(),
            ),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dto::{NewBudget, NewInventoryItem, NewLedgerEntry, NewTask};
    use crate::services::attendance_service::testing::FixedClock;
    use crate::store::memory::MemoryGateway;
    use crate::utils::jwt::TokenIssuer;
    use chrono::FixedOffset;
    use std::sync::Arc;

    fn state() -> AppState {
        let gateway = MemoryGateway::new(Arc::new(TokenIssuer::new("test-secret", 1)))
            .with_password_iterations(1_000);
        AppState::in_memory(
            &gateway,
            FixedOffset::east_opt(0).unwrap(),
            FixedClock::at("2026-03-20T09:00:00Z"),
        )
    }

    fn value(cards: &[StatCard], title: &str) -> StatValue {
        cards.iter().find(|card| card.title == title).unwrap().value
    }

    #[tokio::test]
    async fn project_manager_sees_money() -> anyhow::Result<()> {
        let state = state();
        let budget = state
            .ledger
            .create_budget(NewBudget {
                name: "Obra".into(),
                allocation: Decimal::from(1000),
            })
            .await?;
        for (day, amount) in [(2, 100), (19, 50)] {
            state
                .ledger
                .add_expense(
                    budget.id,
                    NewLedgerEntry {
                        concept: "Material".into(),
                        amount: Decimal::from(amount),
                        date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
                    },
                )
                .await?;
        }
        state
            .ledger
            .add_expense(
                budget.id,
                NewLedgerEntry {
                    concept: "Febrero".into(),
                    amount: Decimal::from(25),
                    date: NaiveDate::from_ymd_opt(2026, 2, 27).unwrap(),
                },
            )
            .await?;

        let cards = DashboardService::stats_for(&state, Role::ProjectManager).await?;
        assert_eq!(value(&cards, "Presupuesto Total"), StatValue::Amount(Decimal::from(825)));
        assert_eq!(value(&cards, "Gastos del Mes"), StatValue::Amount(Decimal::from(150)));
        Ok(())
    }

    #[tokio::test]
    async fn counts_follow_the_collections() -> anyhow::Result<()> {
        let state = state();
        state
            .tasks
            .create(NewTask {
                title: "Zanja".into(),
                ..Default::default()
            })
            .await?;
        state
            .inventory
            .create(NewInventoryItem {
                name: "Cemento".into(),
                quantity: Decimal::from(2),
                unit: "saco".into(),
                minimum_stock: Decimal::from(5),
                ..Default::default()
            })
            .await?;
        state.attendance.register_entry(9).await?;

        let site = DashboardService::stats_for(&state, Role::SiteManager).await?;
        assert_eq!(value(&site, "Tareas Pendientes"), StatValue::Count(1));
        assert_eq!(value(&site, "Asistencia Hoy"), StatValue::Count(1));

        let supply = DashboardService::stats_for(&state, Role::SupplyOfficer).await?;
        assert_eq!(value(&supply, "Alertas Stock"), StatValue::Count(1));

        assert!(DashboardService::stats_for(&state, Role::Worker).await?.is_empty());
        Ok(())
    }
}
