use async_trait::async_trait;
use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;

use super::PostgresGateway;
use crate::error::AppError;
use crate::models::dto::{
    InventoryPatch, NewInventoryItem, NewMovement, NewProject, NewTask, NewUser, ProjectPatch,
    TaskPatch, UserPatch, MAX_QUANTITY,
};
use crate::models::inventory_movement::MovementKind;
use crate::models::{
    auth_account, budget, inventory_item, inventory_movement, project, task, task_history, users,
};
use crate::store::{
    CollectionStore, InventoryStore, PatchRules, ProfileStore, ProjectStore, ProjectWithBudget,
    StockChange, TaskStore, UserStore,
};
use crate::utils::password;

async fn ensure_budget_exists<C: ConnectionTrait>(conn: &C, budget_id: i32) -> Result<(), AppError> {
    match budget::Entity::find_by_id(budget_id).one(conn).await? {
        Some(_) => Ok(()),
        None => Err(AppError::not_found("budget", budget_id)),
    }
}

// ---------------------------------------------------------------------------
// tasks
// ---------------------------------------------------------------------------

pub struct PostgresTasks(pub(super) PostgresGateway);

#[async_trait]
impl CollectionStore for PostgresTasks {
    type Record = task::Model;
    type Draft = NewTask;
    type Patch = TaskPatch;

    fn entity(&self) -> &'static str {
        "task"
    }

    async fn fetch_all(&self) -> Result<Vec<task::Model>, AppError> {
        Ok(task::Entity::find()
            .order_by_desc(task::Column::CreatedAt)
            .order_by_desc(task::Column::Id)
            .all(&self.0.db)
            .await?)
    }

    async fn fetch_one(&self, id: i32) -> Result<Option<task::Model>, AppError> {
        Ok(task::Entity::find_by_id(id).one(&self.0.db).await?)
    }

    async fn insert(&self, draft: NewTask) -> Result<task::Model, AppError> {
        let now = Utc::now();
        let txn = self.0.db.begin().await?;

        let task = task::ActiveModel {
            title: Set(draft.title.trim().to_string()),
            description: Set(draft.description),
            assigned_to: Set(draft.assigned_to),
            status: Set(draft.status),
            priority: Set(draft.priority),
            due_date: Set(draft.due_date),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        task_history::ActiveModel {
            task_id: Set(task.id),
            status: Set(task.status),
            comment: Set(None),
            changed_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(task)
    }

    async fn update(&self, id: i32, patch: TaskPatch) -> Result<Option<task::Model>, AppError> {
        let txn = self.0.db.begin().await?;
        let Some(current) = task::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
        else {
            return Ok(None);
        };
        patch.check_against(&current)?;

        let now = Utc::now();
        let previous_status = current.status;
        let mut active: task::ActiveModel = current.into();
        if let Some(title) = patch.title {
            active.title = Set(title.trim().to_string());
        }
        if let Some(description) = patch.description {
            active.description = Set(description);
        }
        if let Some(assigned_to) = patch.assigned_to {
            active.assigned_to = Set(assigned_to);
        }
        if let Some(status) = patch.status {
            active.status = Set(status);
        }
        if let Some(priority) = patch.priority {
            active.priority = Set(priority);
        }
        if let Some(due_date) = patch.due_date {
            active.due_date = Set(due_date);
        }
        active.updated_at = Set(now);
        let task = active.update(&txn).await?;

        if task.status != previous_status {
            task_history::ActiveModel {
                task_id: Set(task.id),
                status: Set(task.status),
                comment: Set(patch.comment),
                changed_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(Some(task))
    }

    async fn delete(&self, id: i32) -> Result<bool, AppError> {
        let result = task::Entity::delete_by_id(id).exec(&self.0.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(task::Entity::find().count(&self.0.db).await?)
    }
}

#[async_trait]
impl TaskStore for PostgresTasks {
    async fn history(&self, task_id: i32) -> Result<Vec<task_history::Model>, AppError> {
        Ok(task_history::Entity::find()
            .filter(task_history::Column::TaskId.eq(task_id))
            .order_by_asc(task_history::Column::ChangedAt)
            .order_by_asc(task_history::Column::Id)
            .all(&self.0.db)
            .await?)
    }
}

// ---------------------------------------------------------------------------
// inventory
// ---------------------------------------------------------------------------

pub struct PostgresInventory(pub(super) PostgresGateway);

#[async_trait]
impl CollectionStore for PostgresInventory {
    type Record = inventory_item::Model;
    type Draft = NewInventoryItem;
    type Patch = InventoryPatch;

    fn entity(&self) -> &'static str {
        "inventory item"
    }

    async fn fetch_all(&self) -> Result<Vec<inventory_item::Model>, AppError> {
        Ok(inventory_item::Entity::find()
            .order_by_asc(inventory_item::Column::Name)
            .order_by_asc(inventory_item::Column::Id)
            .all(&self.0.db)
            .await?)
    }

    async fn fetch_one(&self, id: i32) -> Result<Option<inventory_item::Model>, AppError> {
        Ok(inventory_item::Entity::find_by_id(id).one(&self.0.db).await?)
    }

    async fn insert(&self, draft: NewInventoryItem) -> Result<inventory_item::Model, AppError> {
        let now = Utc::now();
        let item = inventory_item::ActiveModel {
            name: Set(draft.name.trim().to_string()),
            category: Set(draft.category),
            quantity: Set(draft.quantity),
            unit: Set(draft.unit),
            unit_cost: Set(draft.unit_cost),
            minimum_stock: Set(draft.minimum_stock),
            project_id: Set(draft.project_id),
            supplier: Set(draft.supplier),
            location: Set(draft.location),
            notes: Set(draft.notes),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.0.db)
        .await?;
        Ok(item)
    }

    async fn update(
        &self,
        id: i32,
        patch: InventoryPatch,
    ) -> Result<Option<inventory_item::Model>, AppError> {
        let Some(current) = inventory_item::Entity::find_by_id(id).one(&self.0.db).await? else {
            return Ok(None);
        };

        let mut active: inventory_item::ActiveModel = current.into();
        if let Some(name) = patch.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(category) = patch.category {
            active.category = Set(category);
        }
        if let Some(quantity) = patch.quantity {
            active.quantity = Set(quantity);
        }
        if let Some(unit) = patch.unit {
            active.unit = Set(unit);
        }
        if let Some(unit_cost) = patch.unit_cost {
            active.unit_cost = Set(unit_cost);
        }
        if let Some(minimum_stock) = patch.minimum_stock {
            active.minimum_stock = Set(minimum_stock);
        }
        if let Some(project_id) = patch.project_id {
            active.project_id = Set(project_id);
        }
        if let Some(supplier) = patch.supplier {
            active.supplier = Set(supplier);
        }
        if let Some(location) = patch.location {
            active.location = Set(location);
        }
        if let Some(notes) = patch.notes {
            active.notes = Set(notes);
        }
        active.updated_at = Set(Utc::now());
        Ok(Some(active.update(&self.0.db).await?))
    }

    async fn delete(&self, id: i32) -> Result<bool, AppError> {
        let result = inventory_item::Entity::delete_by_id(id).exec(&self.0.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(inventory_item::Entity::find().count(&self.0.db).await?)
    }
}

#[async_trait]
impl InventoryStore for PostgresInventory {
    async fn record_movement(
        &self,
        item_id: i32,
        movement: NewMovement,
    ) -> Result<Option<StockChange>, AppError> {
        let txn = self.0.db.begin().await?;
        let Some(current) = inventory_item::Entity::find_by_id(item_id)
            .lock_exclusive()
            .one(&txn)
            .await?
        else {
            return Ok(None);
        };

        let quantity = match movement.kind {
            MovementKind::Inbound => current
                .quantity
                .checked_add(movement.quantity)
                .filter(|total| *total <= MAX_QUANTITY)
                .ok_or_else(|| {
                    AppError::validation(format!(
                        "{} cannot hold more than {} {}",
                        current.name, MAX_QUANTITY, current.unit
                    ))
                })?,
            MovementKind::Outbound if movement.quantity > current.quantity => {
                return Err(AppError::validation(format!(
                    "only {} {} of {} in stock, cannot ship {}",
                    current.quantity, current.unit, current.name, movement.quantity
                )));
            }
            MovementKind::Outbound => current.quantity - movement.quantity,
        };

        let now = Utc::now();
        let mut active: inventory_item::ActiveModel = current.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(now);
        let item = active.update(&txn).await?;

        let movement = inventory_movement::ActiveModel {
            item_id: Set(item_id),
            kind: Set(movement.kind),
            quantity: Set(movement.quantity),
            description: Set(movement.description),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(Some(StockChange { item, movement }))
    }

    async fn movements(&self, item_id: i32) -> Result<Vec<inventory_movement::Model>, AppError> {
        Ok(inventory_movement::Entity::find()
            .filter(inventory_movement::Column::ItemId.eq(item_id))
            .order_by_desc(inventory_movement::Column::CreatedAt)
            .order_by_desc(inventory_movement::Column::Id)
            .all(&self.0.db)
            .await?)
    }
}

// ---------------------------------------------------------------------------
// projects
// ---------------------------------------------------------------------------

pub struct PostgresProjects(pub(super) PostgresGateway);

#[async_trait]
impl CollectionStore for PostgresProjects {
    type Record = project::Model;
    type Draft = NewProject;
    type Patch = ProjectPatch;

    fn entity(&self) -> &'static str {
        "project"
    }

    async fn fetch_all(&self) -> Result<Vec<project::Model>, AppError> {
        Ok(project::Entity::find()
            .order_by_desc(project::Column::CreatedAt)
            .order_by_desc(project::Column::Id)
            .all(&self.0.db)
            .await?)
    }

    async fn fetch_one(&self, id: i32) -> Result<Option<project::Model>, AppError> {
        Ok(project::Entity::find_by_id(id).one(&self.0.db).await?)
    }

    async fn insert(&self, draft: NewProject) -> Result<project::Model, AppError> {
        if let Some(budget_id) = draft.budget_id {
            ensure_budget_exists(&self.0.db, budget_id).await?;
        }
        let now = Utc::now();
        let project = project::ActiveModel {
            name: Set(draft.name.trim().to_string()),
            description: Set(draft.description),
            start_date: Set(draft.start_date),
            end_date: Set(draft.end_date),
            budget_id: Set(draft.budget_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.0.db)
        .await?;
        Ok(project)
    }

    async fn update(
        &self,
        id: i32,
        patch: ProjectPatch,
    ) -> Result<Option<project::Model>, AppError> {
        if let Some(Some(budget_id)) = patch.budget_id {
            ensure_budget_exists(&self.0.db, budget_id).await?;
        }
        let Some(current) = project::Entity::find_by_id(id).one(&self.0.db).await? else {
            return Ok(None);
        };
        patch.check_against(&current)?;

        let mut active: project::ActiveModel = current.into();
        if let Some(name) = patch.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = patch.description {
            active.description = Set(description);
        }
        if let Some(start_date) = patch.start_date {
            active.start_date = Set(start_date);
        }
        if let Some(end_date) = patch.end_date {
            active.end_date = Set(end_date);
        }
        if let Some(budget_id) = patch.budget_id {
            active.budget_id = Set(budget_id);
        }
        active.updated_at = Set(Utc::now());
        Ok(Some(active.update(&self.0.db).await?))
    }

    async fn delete(&self, id: i32) -> Result<bool, AppError> {
        let result = project::Entity::delete_by_id(id).exec(&self.0.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(project::Entity::find().count(&self.0.db).await?)
    }
}

#[async_trait]
impl ProjectStore for PostgresProjects {
    async fn with_budget(&self, id: i32) -> Result<Option<ProjectWithBudget>, AppError> {
        let row = project::Entity::find_by_id(id)
            .find_also_related(budget::Entity)
            .one(&self.0.db)
            .await?;
        Ok(row.map(|(project, budget)| ProjectWithBudget { project, budget }))
    }
}

// ---------------------------------------------------------------------------
// users
// ---------------------------------------------------------------------------

pub struct PostgresUsers(pub(super) PostgresGateway);

/// A UNIQUE violation that slipped past the checks (concurrent signup) is bad
/// input, not a storage failure
fn already_taken(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => {
            AppError::validation(format!("email or username already in use: {}", detail))
        }
        _ => AppError::Storage(err),
    }
}

#[async_trait]
impl CollectionStore for PostgresUsers {
    type Record = users::Model;
    type Draft = NewUser;
    type Patch = UserPatch;

    fn entity(&self) -> &'static str {
        "user"
    }

    async fn fetch_all(&self) -> Result<Vec<users::Model>, AppError> {
        Ok(users::Entity::find()
            .order_by_asc(users::Column::Name)
            .order_by_asc(users::Column::Id)
            .all(&self.0.db)
            .await?)
    }

    async fn fetch_one(&self, id: i32) -> Result<Option<users::Model>, AppError> {
        Ok(users::Entity::find_by_id(id).one(&self.0.db).await?)
    }

    /// Creates the auth account and the profile in one transaction
    async fn insert(&self, draft: NewUser) -> Result<users::Model, AppError> {
        let hash = password::hash_password_with(&draft.password, self.0.password_iterations)
            .map_err(|e| AppError::validation(e.to_string()))?;
        let email = draft.email.trim().to_lowercase();
        let username = draft.username.trim().to_string();

        let txn = self.0.db.begin().await?;

        let email_taken = auth_account::Entity::find()
            .filter(auth_account::Column::Email.eq(email.as_str()))
            .count(&txn)
            .await?
            > 0;
        if email_taken {
            return Err(AppError::validation(format!("email {} already registered", email)));
        }
        let username_taken = users::Entity::find()
            .filter(users::Column::Username.eq(username.as_str()))
            .count(&txn)
            .await?
            > 0;
        if username_taken {
            return Err(AppError::validation(format!("username {} already taken", username)));
        }

        let now = Utc::now();
        let auth_id = Uuid::new_v4();
        auth_account::ActiveModel {
            auth_id: Set(auth_id),
            email: Set(email.clone()),
            password_hash: Set(hash),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(already_taken)?;

        let user = users::ActiveModel {
            username: Set(username),
            email: Set(email),
            name: Set(draft.name.trim().to_string()),
            role: Set(draft.role.to_string()),
            auth_id: Set(auth_id),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(already_taken)?;

        txn.commit().await?;
        Ok(user)
    }

    async fn update(&self, id: i32, patch: UserPatch) -> Result<Option<users::Model>, AppError> {
        let txn = self.0.db.begin().await?;
        let Some(current) = users::Entity::find_by_id(id).one(&txn).await? else {
            return Ok(None);
        };

        let email = patch.email.map(|email| email.trim().to_lowercase());
        let username = patch.username.map(|username| username.trim().to_string());
        let auth_id = current.auth_id;

        if let Some(email) = &email {
            let email_taken = auth_account::Entity::find()
                .filter(auth_account::Column::Email.eq(email.as_str()))
                .filter(auth_account::Column::AuthId.ne(auth_id))
                .count(&txn)
                .await?
                > 0;
            if email_taken {
                return Err(AppError::validation(format!("email {} already registered", email)));
            }
        }
        if let Some(username) = &username {
            let username_taken = users::Entity::find()
                .filter(users::Column::Username.eq(username.as_str()))
                .filter(users::Column::Id.ne(id))
                .count(&txn)
                .await?
                > 0;
            if username_taken {
                return Err(AppError::validation(format!("username {} already taken", username)));
            }
        }

        let mut active: users::ActiveModel = current.into();
        if let Some(username) = username {
            active.username = Set(username);
        }
        if let Some(name) = patch.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(role) = patch.role {
            active.role = Set(role.to_string());
        }
        if let Some(email) = &email {
            active.email = Set(email.clone());
            auth_account::Entity::update_many()
                .col_expr(auth_account::Column::Email, sea_query::Expr::value(email.as_str()))
                .filter(auth_account::Column::AuthId.eq(auth_id))
                .exec(&txn)
                .await
                .map_err(already_taken)?;
        }
        let user = active.update(&txn).await.map_err(already_taken)?;

        txn.commit().await?;
        Ok(Some(user))
    }

    /// Deleting the account cascades to the profile and its attendance
    async fn delete(&self, id: i32) -> Result<bool, AppError> {
        let Some(user) = users::Entity::find_by_id(id).one(&self.0.db).await? else {
            return Ok(false);
        };
        let result = auth_account::Entity::delete_by_id(user.auth_id)
            .exec(&self.0.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(users::Entity::find().count(&self.0.db).await?)
    }
}

#[async_trait]
impl ProfileStore for PostgresUsers {
    async fn profile_by_auth_id(&self, auth_id: Uuid) -> Result<Option<users::Model>, AppError> {
        Ok(users::Entity::find()
            .filter(users::Column::AuthId.eq(auth_id))
            .one(&self.0.db)
            .await?)
    }
}

impl UserStore for PostgresUsers {}
