// ============================================================================
// IN-MEMORY GATEWAY
// ============================================================================
//
// Description:
//   Implements every store port over plain maps behind one mutex. Each port
//   call takes the lock once, checks everything, then mutates, so every call
//   is atomic: the same guarantee the Postgres adapter gets from transactions.
//
// Usage:
//   - unit tests of the services
//   - DATA_BACKEND=memory for local runs without a database
//
// Points d'attention:
//   - No await while the lock is held
//   - `fail_next_write` makes the next mutating call fail with a storage
//     error (gateway failure tests)
//
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::DbErr;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{
    AttendanceStore, AuthSession, BalanceAdjustment, CollectionStore, EntryKind, EntryWrite,
    IdentityProvider, InventoryStore, LedgerEntry, LedgerReceipt, LedgerStore, PatchRules,
    ProfileStore, ProjectStore, ProjectWithBudget, SessionEvent, StockChange, TaskStore, UserStore,
};
use crate::error::AppError;
use crate::models::attendance::{self, AttendanceKind};
use crate::models::dto::{
    Credentials, InventoryPatch, NewInventoryItem, NewMovement, NewProject, NewTask, NewUser,
    ProjectPatch, TaskPatch, UserPatch, MAX_QUANTITY,
};
use crate::models::inventory_movement::MovementKind;
use crate::models::{
    auth_account, budget, inventory_item, inventory_movement, project, task, task_history, users,
};
use crate::utils::jwt::TokenIssuer;
use crate::utils::password;

#[derive(Default)]
struct Tables {
    sequence: i32,
    fail_next: Option<String>,
    budgets: BTreeMap<i32, budget::Model>,
    entries: BTreeMap<(EntryKind, i32), LedgerEntry>,
    projects: BTreeMap<i32, project::Model>,
    tasks: BTreeMap<i32, task::Model>,
    task_history: Vec<task_history::Model>,
    inventory: BTreeMap<i32, inventory_item::Model>,
    movements: Vec<inventory_movement::Model>,
    attendance: Vec<attendance::Model>,
    users: BTreeMap<i32, users::Model>,
    accounts: BTreeMap<Uuid, auth_account::Model>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.sequence += 1;
        self.sequence
    }

    fn take_failure(&mut self) -> Result<(), AppError> {
        match self.fail_next.take() {
            Some(message) => Err(AppError::Storage(DbErr::Custom(message))),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct MemoryGateway {
    tables: Arc<Mutex<Tables>>,
    tokens: Arc<TokenIssuer>,
    password_iterations: u32,
}

impl MemoryGateway {
    pub fn new(tokens: Arc<TokenIssuer>) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            tokens,
            password_iterations: password::ITERATIONS,
        }
    }

    /// Lowers the pbkdf2 work factor of the passwords hashed by this gateway
    pub fn with_password_iterations(mut self, iterations: u32) -> Self {
        self.password_iterations = iterations;
        self
    }

    pub fn tasks(&self) -> MemoryTasks {
        MemoryTasks(self.clone())
    }

    pub fn inventory(&self) -> MemoryInventory {
        MemoryInventory(self.clone())
    }

    pub fn projects(&self) -> MemoryProjects {
        MemoryProjects(self.clone())
    }

    pub fn users(&self) -> MemoryUsers {
        MemoryUsers(self.clone())
    }

    pub fn fail_next_write(&self, message: &str) {
        self.lock().fail_next = Some(message.to_string());
    }

    /// Inserts an auth account without a profile (an identity the
    /// application does not know)
    pub fn insert_orphan_account(&self, email: &str, password: &str) -> Result<Uuid, AppError> {
        let hash = password::hash_password_with(password, self.password_iterations)
            .map_err(|e| AppError::validation(e.to_string()))?;
        let auth_id = Uuid::new_v4();
        self.lock().accounts.insert(
            auth_id,
            auth_account::Model {
                auth_id,
                email: email.to_lowercase(),
                password_hash: hash,
                created_at: Utc::now(),
            },
        );
        Ok(auth_id)
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// ledger
// ---------------------------------------------------------------------------

#[async_trait]
impl LedgerStore for MemoryGateway {
    async fn budgets(&self) -> Result<Vec<budget::Model>, AppError> {
        let mut budgets: Vec<_> = self.lock().budgets.values().cloned().collect();
        budgets.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(budgets)
    }

    async fn budget(&self, id: i32) -> Result<Option<budget::Model>, AppError> {
        Ok(self.lock().budgets.get(&id).cloned())
    }

    async fn create_budget(
        &self,
        name: String,
        allocation: Decimal,
    ) -> Result<budget::Model, AppError> {
        let mut tables = self.lock();
        tables.take_failure()?;
        let now = Utc::now();
        let budget = budget::Model {
            id: tables.next_id(),
            name,
            initial_allocation: allocation,
            total: allocation,
            created_at: now,
            updated_at: now,
        };
        tables.budgets.insert(budget.id, budget.clone());
        Ok(budget)
    }

    async fn rename_budget(
        &self,
        id: i32,
        name: String,
    ) -> Result<Option<budget::Model>, AppError> {
        let mut tables = self.lock();
        tables.take_failure()?;
        Ok(tables.budgets.get_mut(&id).map(|budget| {
            budget.name = name;
            budget.updated_at = Utc::now();
            budget.clone()
        }))
    }

    async fn delete_budget(&self, id: i32) -> Result<bool, AppError> {
        let mut tables = self.lock();
        tables.take_failure()?;
        if tables.budgets.remove(&id).is_none() {
            return Ok(false);
        }
        tables.entries.retain(|_, entry| entry.budget_id != id);
        for project in tables.projects.values_mut() {
            if project.budget_id == Some(id) {
                project.budget_id = None;
            }
        }
        Ok(true)
    }

    async fn shift_allocation(
        &self,
        id: i32,
        expected_allocation: Decimal,
        delta: Decimal,
    ) -> Result<budget::Model, AppError> {
        let mut tables = self.lock();
        tables.take_failure()?;
        let budget = tables
            .budgets
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("budget", id))?;
        if budget.initial_allocation != expected_allocation {
            return Err(AppError::Consistency(format!(
                "budget {} allocation changed concurrently",
                id
            )));
        }
        let (Some(allocation), Some(total)) = (
            budget.initial_allocation.checked_add(delta),
            budget.total.checked_add(delta),
        ) else {
            return Err(AppError::validation(format!("budget {} allocation overflows", id)));
        };
        if total < Decimal::ZERO {
            return Err(AppError::validation(format!(
                "budget {} has {} left, cannot reduce the allocation by {}",
                id, budget.total, -delta
            )));
        }
        budget.initial_allocation = allocation;
        budget.total = total;
        budget.updated_at = Utc::now();
        Ok(budget.clone())
    }

    async fn entry(&self, kind: EntryKind, id: i32) -> Result<Option<LedgerEntry>, AppError> {
        Ok(self.lock().entries.get(&(kind, id)).cloned())
    }

    async fn entries(
        &self,
        kind: EntryKind,
        budget_id: Option<i32>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let mut entries: Vec<_> = self
            .lock()
            .entries
            .values()
            .filter(|entry| entry.kind == kind)
            .filter(|entry| budget_id.is_none_or(|id| entry.budget_id == id))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    async fn apply(
        &self,
        kind: EntryKind,
        write: EntryWrite,
        adjustment: BalanceAdjustment,
    ) -> Result<LedgerReceipt, AppError> {
        let mut tables = self.lock();
        tables.take_failure()?;

        let balance = tables
            .budgets
            .get(&adjustment.budget_id)
            .map(|budget| budget.total)
            .ok_or_else(|| AppError::not_found("budget", adjustment.budget_id))?;
        let new_total = balance.checked_add(adjustment.delta).ok_or_else(|| {
            AppError::validation(format!("budget {} balance overflows", adjustment.budget_id))
        })?;
        if new_total < Decimal::ZERO {
            return Err(AppError::validation(format!(
                "budget {} has {} left, the change of {} would overdraw it",
                adjustment.budget_id, balance, adjustment.delta
            )));
        }

        let now = Utc::now();
        let entry = match write {
            EntryWrite::Insert {
                budget_id,
                concept,
                amount,
                date,
            } => {
                let entry = LedgerEntry {
                    id: tables.next_id(),
                    kind,
                    concept,
                    amount,
                    date,
                    budget_id,
                    created_at: now,
                    updated_at: now,
                };
                tables.entries.insert((kind, entry.id), entry.clone());
                entry
            }
            EntryWrite::Update {
                id,
                expected_amount,
                concept,
                amount,
                date,
            } => {
                let entry = tables
                    .entries
                    .get_mut(&(kind, id))
                    .ok_or_else(|| AppError::not_found(kind.entity(), id))?;
                check_unchanged(entry, expected_amount, adjustment.budget_id)?;
                entry.concept = concept;
                entry.amount = amount;
                entry.date = date;
                entry.updated_at = now;
                entry.clone()
            }
            EntryWrite::Delete {
                id,
                expected_amount,
            } => {
                let entry = tables
                    .entries
                    .get(&(kind, id))
                    .ok_or_else(|| AppError::not_found(kind.entity(), id))?;
                check_unchanged(entry, expected_amount, adjustment.budget_id)?;
                tables
                    .entries
                    .remove(&(kind, id))
                    .ok_or_else(|| AppError::not_found(kind.entity(), id))?
            }
        };

        let budget = tables
            .budgets
            .get_mut(&adjustment.budget_id)
            .ok_or_else(|| AppError::not_found("budget", adjustment.budget_id))?;
        budget.total = new_total;
        budget.updated_at = now;

        Ok(LedgerReceipt {
            entry,
            budget: budget.clone(),
        })
    }
}

fn check_unchanged(
    entry: &LedgerEntry,
    expected_amount: Decimal,
    budget_id: i32,
) -> Result<(), AppError> {
    if entry.amount != expected_amount || entry.budget_id != budget_id {
        return Err(AppError::Consistency(format!(
            "{} {} changed since it was read",
            entry.kind.entity(),
            entry.id
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// tasks
// ---------------------------------------------------------------------------

pub struct MemoryTasks(MemoryGateway);

#[async_trait]
impl CollectionStore for MemoryTasks {
    type Record = task::Model;
    type Draft = NewTask;
    type Patch = TaskPatch;

    fn entity(&self) -> &'static str {
        "task"
    }

    async fn fetch_all(&self) -> Result<Vec<task::Model>, AppError> {
        let mut tasks: Vec<_> = self.0.lock().tasks.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tasks)
    }

    async fn fetch_one(&self, id: i32) -> Result<Option<task::Model>, AppError> {
        Ok(self.0.lock().tasks.get(&id).cloned())
    }

    async fn insert(&self, draft: NewTask) -> Result<task::Model, AppError> {
        let mut tables = self.0.lock();
        tables.take_failure()?;
        let now = Utc::now();
        let task = task::Model {
            id: tables.next_id(),
            title: draft.title.trim().to_string(),
            description: draft.description,
            assigned_to: draft.assigned_to,
            status: draft.status,
            priority: draft.priority,
            due_date: draft.due_date,
            created_at: now,
            updated_at: now,
        };
        let history = task_history::Model {
            id: tables.next_id(),
            task_id: task.id,
            status: task.status,
            comment: None,
            changed_at: now,
        };
        tables.task_history.push(history);
        tables.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update(&self, id: i32, patch: TaskPatch) -> Result<Option<task::Model>, AppError> {
        let mut tables = self.0.lock();
        tables.take_failure()?;
        let history_id = tables.next_id();
        let Some(task) = tables.tasks.get_mut(&id) else {
            return Ok(None);
        };
        patch.check_against(task)?;

        let now = Utc::now();
        let previous_status = task.status;
        if let Some(title) = patch.title {
            task.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(assigned_to) = patch.assigned_to {
            task.assigned_to = assigned_to;
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = due_date;
        }
        task.updated_at = now;
        let task = task.clone();

        if task.status != previous_status {
            tables.task_history.push(task_history::Model {
                id: history_id,
                task_id: id,
                status: task.status,
                comment: patch.comment,
                changed_at: now,
            });
        }
        Ok(Some(task))
    }

    async fn delete(&self, id: i32) -> Result<bool, AppError> {
        let mut tables = self.0.lock();
        tables.take_failure()?;
        let removed = tables.tasks.remove(&id).is_some();
        if removed {
            tables.task_history.retain(|entry| entry.task_id != id);
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.0.lock().tasks.len() as u64)
    }
}

#[async_trait]
impl TaskStore for MemoryTasks {
    async fn history(&self, task_id: i32) -> Result<Vec<task_history::Model>, AppError> {
        Ok(self
            .0
            .lock()
            .task_history
            .iter()
            .filter(|entry| entry.task_id == task_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// inventory
// ---------------------------------------------------------------------------

pub struct MemoryInventory(MemoryGateway);

#[async_trait]
impl CollectionStore for MemoryInventory {
    type Record = inventory_item::Model;
    type Draft = NewInventoryItem;
    type Patch = InventoryPatch;

    fn entity(&self) -> &'static str {
        "inventory item"
    }

    async fn fetch_all(&self) -> Result<Vec<inventory_item::Model>, AppError> {
        let mut items: Vec<_> = self.0.lock().inventory.values().cloned().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn fetch_one(&self, id: i32) -> Result<Option<inventory_item::Model>, AppError> {
        Ok(self.0.lock().inventory.get(&id).cloned())
    }

    async fn insert(&self, draft: NewInventoryItem) -> Result<inventory_item::Model, AppError> {
        let mut tables = self.0.lock();
        tables.take_failure()?;
        let now = Utc::now();
        let item = inventory_item::Model {
            id: tables.next_id(),
            name: draft.name.trim().to_string(),
            category: draft.category,
            quantity: draft.quantity,
            unit: draft.unit,
            unit_cost: draft.unit_cost,
            minimum_stock: draft.minimum_stock,
            project_id: draft.project_id,
            supplier: draft.supplier,
            location: draft.location,
            notes: draft.notes,
            created_at: now,
            updated_at: now,
        };
        tables.inventory.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update(
        &self,
        id: i32,
        patch: InventoryPatch,
    ) -> Result<Option<inventory_item::Model>, AppError> {
        let mut tables = self.0.lock();
        tables.take_failure()?;
        let Some(item) = tables.inventory.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            item.name = name.trim().to_string();
        }
        if let Some(category) = patch.category {
            item.category = category;
        }
        if let Some(quantity) = patch.quantity {
            item.quantity = quantity;
        }
        if let Some(unit) = patch.unit {
            item.unit = unit;
        }
        if let Some(unit_cost) = patch.unit_cost {
            item.unit_cost = unit_cost;
        }
        if let Some(minimum_stock) = patch.minimum_stock {
            item.minimum_stock = minimum_stock;
        }
        if let Some(project_id) = patch.project_id {
            item.project_id = project_id;
        }
        if let Some(supplier) = patch.supplier {
            item.supplier = supplier;
        }
        if let Some(location) = patch.location {
            item.location = location;
        }
        if let Some(notes) = patch.notes {
            item.notes = notes;
        }
        item.updated_at = Utc::now();
        Ok(Some(item.clone()))
    }

    async fn delete(&self, id: i32) -> Result<bool, AppError> {
        let mut tables = self.0.lock();
        tables.take_failure()?;
        let removed = tables.inventory.remove(&id).is_some();
        if removed {
            tables.movements.retain(|movement| movement.item_id != id);
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.0.lock().inventory.len() as u64)
    }
}

#[async_trait]
impl InventoryStore for MemoryInventory {
    async fn record_movement(
        &self,
        item_id: i32,
        movement: NewMovement,
    ) -> Result<Option<StockChange>, AppError> {
        let mut tables = self.0.lock();
        tables.take_failure()?;
        let movement_id = tables.next_id();
        let Some(item) = tables.inventory.get_mut(&item_id) else {
            return Ok(None);
        };

        let quantity = match movement.kind {
            MovementKind::Inbound => item
                .quantity
                .checked_add(movement.quantity)
                .filter(|total| *total <= MAX_QUANTITY)
                .ok_or_else(|| {
                    AppError::validation(format!(
                        "{} cannot hold more than {} {}",
                        item.name, MAX_QUANTITY, item.unit
                    ))
                })?,
            MovementKind::Outbound if movement.quantity > item.quantity => {
                return Err(AppError::validation(format!(
                    "only {} {} of {} in stock, cannot ship {}",
                    item.quantity, item.unit, item.name, movement.quantity
                )));
            }
            MovementKind::Outbound => item.quantity - movement.quantity,
        };

        let now = Utc::now();
        item.quantity = quantity;
        item.updated_at = now;
        let item = item.clone();

        let movement = inventory_movement::Model {
            id: movement_id,
            item_id,
            kind: movement.kind,
            quantity: movement.quantity,
            description: movement.description,
            created_at: now,
        };
        tables.movements.push(movement.clone());
        Ok(Some(StockChange { item, movement }))
    }

    async fn movements(&self, item_id: i32) -> Result<Vec<inventory_movement::Model>, AppError> {
        let mut movements: Vec<_> = self
            .0
            .lock()
            .movements
            .iter()
            .filter(|movement| movement.item_id == item_id)
            .cloned()
            .collect();
        movements.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(movements)
    }
}

// ---------------------------------------------------------------------------
// projects
// ---------------------------------------------------------------------------

pub struct MemoryProjects(MemoryGateway);

#[async_trait]
impl CollectionStore for MemoryProjects {
    type Record = project::Model;
    type Draft = NewProject;
    type Patch = ProjectPatch;

    fn entity(&self) -> &'static str {
        "project"
    }

    async fn fetch_all(&self) -> Result<Vec<project::Model>, AppError> {
        let mut projects: Vec<_> = self.0.lock().projects.values().cloned().collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(projects)
    }

    async fn fetch_one(&self, id: i32) -> Result<Option<project::Model>, AppError> {
        Ok(self.0.lock().projects.get(&id).cloned())
    }

    async fn insert(&self, draft: NewProject) -> Result<project::Model, AppError> {
        let mut tables = self.0.lock();
        tables.take_failure()?;
        if let Some(budget_id) = draft.budget_id {
            if !tables.budgets.contains_key(&budget_id) {
                return Err(AppError::not_found("budget", budget_id));
            }
        }
        let now = Utc::now();
        let project = project::Model {
            id: tables.next_id(),
            name: draft.name.trim().to_string(),
            description: draft.description,
            start_date: draft.start_date,
            end_date: draft.end_date,
            budget_id: draft.budget_id,
            created_at: now,
            updated_at: now,
        };
        tables.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn update(
        &self,
        id: i32,
        patch: ProjectPatch,
    ) -> Result<Option<project::Model>, AppError> {
        let mut tables = self.0.lock();
        tables.take_failure()?;
        if let Some(Some(budget_id)) = patch.budget_id {
            if !tables.budgets.contains_key(&budget_id) {
                return Err(AppError::not_found("budget", budget_id));
            }
        }
        let Some(project) = tables.projects.get_mut(&id) else {
            return Ok(None);
        };
        patch.check_against(project)?;
        if let Some(name) = patch.name {
            project.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            project.description = description;
        }
        if let Some(start_date) = patch.start_date {
            project.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            project.end_date = end_date;
        }
        if let Some(budget_id) = patch.budget_id {
            project.budget_id = budget_id;
        }
        project.updated_at = Utc::now();
        Ok(Some(project.clone()))
    }

    async fn delete(&self, id: i32) -> Result<bool, AppError> {
        let mut tables = self.0.lock();
        tables.take_failure()?;
        let removed = tables.projects.remove(&id).is_some();
        if removed {
            for item in tables.inventory.values_mut() {
                if item.project_id == Some(id) {
                    item.project_id = None;
                }
            }
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.0.lock().projects.len() as u64)
    }
}

#[async_trait]
impl ProjectStore for MemoryProjects {
    async fn with_budget(&self, id: i32) -> Result<Option<ProjectWithBudget>, AppError> {
        let tables = self.0.lock();
        Ok(tables.projects.get(&id).map(|project| ProjectWithBudget {
            budget: project
                .budget_id
                .and_then(|budget_id| tables.budgets.get(&budget_id).cloned()),
            project: project.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// users
// ---------------------------------------------------------------------------

pub struct MemoryUsers(MemoryGateway);

#[async_trait]
impl CollectionStore for MemoryUsers {
    type Record = users::Model;
    type Draft = NewUser;
    type Patch = UserPatch;

    fn entity(&self) -> &'static str {
        "user"
    }

    async fn fetch_all(&self) -> Result<Vec<users::Model>, AppError> {
        let mut users: Vec<_> = self.0.lock().users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn fetch_one(&self, id: i32) -> Result<Option<users::Model>, AppError> {
        Ok(self.0.lock().users.get(&id).cloned())
    }

    async fn insert(&self, draft: NewUser) -> Result<users::Model, AppError> {
        // pbkdf2 runs before taking the lock
        let hash = password::hash_password_with(&draft.password, self.0.password_iterations)
            .map_err(|e| AppError::validation(e.to_string()))?;
        let email = draft.email.trim().to_lowercase();
        let username = draft.username.trim().to_string();

        let mut tables = self.0.lock();
        tables.take_failure()?;
        if tables.accounts.values().any(|account| account.email == email) {
            return Err(AppError::validation(format!("email {} already registered", email)));
        }
        if tables.users.values().any(|user| user.username == username) {
            return Err(AppError::validation(format!("username {} already taken", username)));
        }

        let now = Utc::now();
        let auth_id = Uuid::new_v4();
        tables.accounts.insert(
            auth_id,
            auth_account::Model {
                auth_id,
                email: email.clone(),
                password_hash: hash,
                created_at: now,
            },
        );
        let user = users::Model {
            id: tables.next_id(),
            username,
            email,
            name: draft.name.trim().to_string(),
            role: draft.role.to_string(),
            auth_id,
            created_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: i32, patch: UserPatch) -> Result<Option<users::Model>, AppError> {
        let mut tables = self.0.lock();
        tables.take_failure()?;
        let Some(auth_id) = tables.users.get(&id).map(|user| user.auth_id) else {
            return Ok(None);
        };
        let email = patch.email.map(|email| email.trim().to_lowercase());
        if let Some(email) = &email {
            let taken = tables
                .accounts
                .values()
                .any(|account| account.auth_id != auth_id && &account.email == email);
            if taken {
                return Err(AppError::validation(format!("email {} already registered", email)));
            }
        }
        let username = patch.username.map(|username| username.trim().to_string());
        if let Some(username) = &username {
            let taken = tables
                .users
                .values()
                .any(|user| user.id != id && &user.username == username);
            if taken {
                return Err(AppError::validation(format!("username {} already taken", username)));
            }
        }

        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = username {
            user.username = username;
        }
        if let Some(name) = patch.name {
            user.name = name.trim().to_string();
        }
        if let Some(role) = patch.role {
            user.role = role.to_string();
        }
        if let Some(email) = email.clone() {
            user.email = email;
        }
        let user = user.clone();

        if let (Some(email), Some(account)) = (email, tables.accounts.get_mut(&user.auth_id)) {
            account.email = email;
        }
        Ok(Some(user))
    }

    async fn delete(&self, id: i32) -> Result<bool, AppError> {
        let mut tables = self.0.lock();
        tables.take_failure()?;
        let Some(user) = tables.users.remove(&id) else {
            return Ok(false);
        };
        tables.accounts.remove(&user.auth_id);
        tables.attendance.retain(|record| record.employee_id != id);
        Ok(true)
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.0.lock().users.len() as u64)
    }
}

#[async_trait]
impl ProfileStore for MemoryUsers {
    async fn profile_by_auth_id(&self, auth_id: Uuid) -> Result<Option<users::Model>, AppError> {
        Ok(self
            .0
            .lock()
            .users
            .values()
            .find(|user| user.auth_id == auth_id)
            .cloned())
    }
}

impl UserStore for MemoryUsers {}

// ---------------------------------------------------------------------------
// attendance
// ---------------------------------------------------------------------------

#[async_trait]
impl AttendanceStore for MemoryGateway {
    async fn append_unique(
        &self,
        employee_id: i32,
        kind: AttendanceKind,
        timestamp: DateTime<Utc>,
        work_date: NaiveDate,
    ) -> Result<Option<attendance::Model>, AppError> {
        let mut tables = self.lock();
        tables.take_failure()?;
        let duplicate = tables.attendance.iter().any(|record| {
            record.employee_id == employee_id && record.kind == kind && record.work_date == work_date
        });
        if duplicate {
            return Ok(None);
        }
        let record = attendance::Model {
            id: tables.next_id(),
            employee_id,
            kind,
            timestamp,
            work_date,
        };
        tables.attendance.push(record.clone());
        Ok(Some(record))
    }

    async fn day_records(
        &self,
        employee_id: i32,
        day: NaiveDate,
    ) -> Result<Vec<attendance::Model>, AppError> {
        Ok(self
            .lock()
            .attendance
            .iter()
            .filter(|record| record.employee_id == employee_id && record.work_date == day)
            .cloned()
            .collect())
    }

    async fn records_on(&self, day: NaiveDate) -> Result<Vec<attendance::Model>, AppError> {
        Ok(self
            .lock()
            .attendance
            .iter()
            .filter(|record| record.work_date == day)
            .cloned()
            .collect())
    }

    async fn records_for(&self, employee_id: i32) -> Result<Vec<attendance::Model>, AppError> {
        Ok(self
            .lock()
            .attendance
            .iter()
            .filter(|record| record.employee_id == employee_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// identity
// ---------------------------------------------------------------------------

#[async_trait]
impl IdentityProvider for MemoryGateway {
    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<AuthSession, AppError> {
        let email = credentials.email.trim().to_lowercase();
        let account = self
            .lock()
            .accounts
            .values()
            .find(|account| account.email == email)
            .cloned();

        let valid = match &account {
            Some(account) => password::verify_password(&credentials.password, &account.password_hash)
                .map_err(|e| AppError::Unauthorized(e.to_string()))?,
            None => false,
        };
        match account {
            Some(account) if valid => self.tokens.issue(account.auth_id, &account.email),
            _ => Err(AppError::Unauthorized("Invalid email or password".into())),
        }
    }

    async fn get_session(&self, token: &str) -> Result<Option<AuthSession>, AppError> {
        let Some(session) = self.tokens.verify(token) else {
            return Ok(None);
        };
        let known = self.lock().accounts.contains_key(&session.auth_id);
        Ok(known.then_some(session))
    }

    async fn sign_out(&self, token: &str) -> Result<(), AppError> {
        self.tokens.revoke(token);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tokens.subscribe()
    }
}
