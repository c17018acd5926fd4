/*
store/
├─ mod.rs          ← ports: the data-access traits every service receives
├─ memory.rs       ← in-memory gateway (tests, DATA_BACKEND=memory)
└─ postgres/       ← sea-orm gateway
   ├─ collections.rs   tasks, inventory, projects, users
   ├─ ledger.rs        budgets, expenses, incomes
   ├─ attendance.rs
   └─ identity.rs      auth accounts + session tokens
*/
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::models::attendance::{self, AttendanceKind};
use crate::models::dto::{
    Credentials, InventoryPatch, NewInventoryItem, NewMovement, NewProject, NewTask, NewUser,
    ProjectPatch, TaskPatch, UserPatch,
};
use crate::models::{
    budget, expense, income, inventory_item, inventory_movement, project, task, task_history, users,
};

pub mod memory;
pub mod postgres;

// ---------------------------------------------------------------------------
// collections
// ---------------------------------------------------------------------------

pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> i32;
}

impl Record for task::Model {
    fn id(&self) -> i32 {
        self.id
    }
}

impl Record for inventory_item::Model {
    fn id(&self) -> i32 {
        self.id
    }
}

impl Record for project::Model {
    fn id(&self) -> i32 {
        self.id
    }
}

impl Record for users::Model {
    fn id(&self) -> i32 {
        self.id
    }
}

/// Checks a patch against the stored record before it is written
pub trait PatchRules<R> {
    fn check_against(&self, _current: &R) -> Result<(), AppError> {
        Ok(())
    }
}

impl PatchRules<task::Model> for TaskPatch {
    fn check_against(&self, current: &task::Model) -> Result<(), AppError> {
        match self.status {
            Some(next) if !current.status.can_transition_to(next) => Err(AppError::validation(
                format!(
                    "task {} cannot move from {} to {}",
                    current.id,
                    current.status.as_str(),
                    next.as_str()
                ),
            )),
            _ => Ok(()),
        }
    }
}

impl PatchRules<project::Model> for ProjectPatch {
    fn check_against(&self, current: &project::Model) -> Result<(), AppError> {
        let start = self.start_date.unwrap_or(current.start_date);
        let end = self.end_date.unwrap_or(current.end_date);
        match (start, end) {
            (Some(start), Some(end)) if end < start => Err(AppError::validation(format!(
                "project {} would end ({}) before it starts ({})",
                current.id, end, start
            ))),
            _ => Ok(()),
        }
    }
}

impl PatchRules<inventory_item::Model> for InventoryPatch {}

impl PatchRules<users::Model> for UserPatch {}

/// Table-scoped CRUD port. `update` and `delete` report a missing row as
/// `None` / `false`; the collection turns that into `NotFound`.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    type Record: Record;
    type Draft: Validate + Send + Sync + 'static;
    type Patch: Validate + PatchRules<Self::Record> + Send + Sync + 'static;

    /// Entity name used in errors and logs
    fn entity(&self) -> &'static str;

    async fn fetch_all(&self) -> Result<Vec<Self::Record>, AppError>;

    async fn fetch_one(&self, id: i32) -> Result<Option<Self::Record>, AppError>;

    async fn insert(&self, draft: Self::Draft) -> Result<Self::Record, AppError>;

    async fn update(&self, id: i32, patch: Self::Patch)
        -> Result<Option<Self::Record>, AppError>;

    async fn delete(&self, id: i32) -> Result<bool, AppError>;

    async fn count(&self) -> Result<u64, AppError>;
}

#[async_trait]
pub trait TaskStore:
    CollectionStore<Record = task::Model, Draft = NewTask, Patch = TaskPatch>
{
    /// Status changes of one task, oldest first
    async fn history(&self, task_id: i32) -> Result<Vec<task_history::Model>, AppError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockChange {
    pub item: inventory_item::Model,
    pub movement: inventory_movement::Model,
}

#[async_trait]
pub trait InventoryStore:
    CollectionStore<Record = inventory_item::Model, Draft = NewInventoryItem, Patch = InventoryPatch>
{
    /// Moves the item quantity and records the movement as one unit.
    /// `None` when the item does not exist; `Validation` when an outbound
    /// movement exceeds the stock.
    async fn record_movement(
        &self,
        item_id: i32,
        movement: NewMovement,
    ) -> Result<Option<StockChange>, AppError>;

    /// Movements of one item, newest first
    async fn movements(&self, item_id: i32) -> Result<Vec<inventory_movement::Model>, AppError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectWithBudget {
    #[serde(flatten)]
    pub project: project::Model,
    pub budget: Option<budget::Model>,
}

#[async_trait]
pub trait ProjectStore:
    CollectionStore<Record = project::Model, Draft = NewProject, Patch = ProjectPatch>
{
    async fn with_budget(&self, id: i32) -> Result<Option<ProjectWithBudget>, AppError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn profile_by_auth_id(&self, auth_id: Uuid) -> Result<Option<users::Model>, AppError>;
}

/// Inserting a user creates its auth account and its profile together
pub trait UserStore:
    CollectionStore<Record = users::Model, Draft = NewUser, Patch = UserPatch> + ProfileStore
{
}

// ---------------------------------------------------------------------------
// ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Expense,
    Income,
}

impl EntryKind {
    pub fn entity(self) -> &'static str {
        match self {
            EntryKind::Expense => "expense",
            EntryKind::Income => "income",
        }
    }
}

/// An expense or an income row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub id: i32,
    pub kind: EntryKind,
    pub concept: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub budget_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<expense::Model> for LedgerEntry {
    fn from(row: expense::Model) -> Self {
        Self {
            id: row.id,
            kind: EntryKind::Expense,
            concept: row.concept,
            amount: row.amount,
            date: row.date,
            budget_id: row.budget_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<income::Model> for LedgerEntry {
    fn from(row: income::Model) -> Self {
        Self {
            id: row.id,
            kind: EntryKind::Income,
            concept: row.concept,
            amount: row.amount,
            date: row.date,
            budget_id: row.budget_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// The entry half of a ledger mutation. Update and delete carry the amount
/// read before the write: the store refuses to write if it changed since.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryWrite {
    Insert {
        budget_id: i32,
        concept: String,
        amount: Decimal,
        date: NaiveDate,
    },
    Update {
        id: i32,
        expected_amount: Decimal,
        concept: String,
        amount: Decimal,
        date: NaiveDate,
    },
    Delete {
        id: i32,
        expected_amount: Decimal,
    },
}

/// The balance half of a ledger mutation: `total += delta`, refused when the
/// resulting total would be negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceAdjustment {
    pub budget_id: i32,
    pub delta: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerReceipt {
    pub entry: LedgerEntry,
    pub budget: budget::Model,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn budgets(&self) -> Result<Vec<budget::Model>, AppError>;

    async fn budget(&self, id: i32) -> Result<Option<budget::Model>, AppError>;

    async fn create_budget(&self, name: String, allocation: Decimal)
        -> Result<budget::Model, AppError>;

    async fn rename_budget(&self, id: i32, name: String)
        -> Result<Option<budget::Model>, AppError>;

    /// Deletes the budget and its entries; projects keep a null budget
    async fn delete_budget(&self, id: i32) -> Result<bool, AppError>;

    /// Shifts `initial_allocation` and `total` by `delta` together, provided the
    /// allocation still equals `expected_allocation` and the total stays >= 0
    async fn shift_allocation(
        &self,
        id: i32,
        expected_allocation: Decimal,
        delta: Decimal,
    ) -> Result<budget::Model, AppError>;

    async fn entry(&self, kind: EntryKind, id: i32) -> Result<Option<LedgerEntry>, AppError>;

    /// Entries of one budget, or of every budget when `budget_id` is None
    async fn entries(&self, kind: EntryKind, budget_id: Option<i32>)
        -> Result<Vec<LedgerEntry>, AppError>;

    /// Writes the entry and adjusts the balance as one unit: both land or neither does
    async fn apply(
        &self,
        kind: EntryKind,
        write: EntryWrite,
        adjustment: BalanceAdjustment,
    ) -> Result<LedgerReceipt, AppError>;
}

// ---------------------------------------------------------------------------
// attendance
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Appends the record unless the employee already has one of that kind on
    /// `work_date`; returns None in that case.
    async fn append_unique(
        &self,
        employee_id: i32,
        kind: AttendanceKind,
        timestamp: DateTime<Utc>,
        work_date: NaiveDate,
    ) -> Result<Option<attendance::Model>, AppError>;

    async fn day_records(&self, employee_id: i32, day: NaiveDate)
        -> Result<Vec<attendance::Model>, AppError>;

    async fn records_on(&self, day: NaiveDate) -> Result<Vec<attendance::Model>, AppError>;

    async fn records_for(&self, employee_id: i32) -> Result<Vec<attendance::Model>, AppError>;
}

// ---------------------------------------------------------------------------
// identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub auth_id: Uuid,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn { auth_id: Uuid },
    SignedOut { auth_id: Uuid },
}

/// Credential check and session token lifecycle
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_password(&self, credentials: &Credentials)
        -> Result<AuthSession, AppError>;

    /// The live session behind a token, None when expired, revoked or forged
    async fn get_session(&self, token: &str) -> Result<Option<AuthSession>, AppError>;

    async fn sign_out(&self, token: &str) -> Result<(), AppError>;

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    async fn current_user_id(&self, token: &str) -> Result<Option<Uuid>, AppError> {
        Ok(self.get_session(token).await?.map(|session| session.auth_id))
    }
}
