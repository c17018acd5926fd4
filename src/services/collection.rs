// ============================================================================
// COLLECTION : CRUD over one table + in-memory mirror
// ============================================================================
//
// The mirror is loaded once (activate / refresh) and only changes after the
// store confirmed a write:
//   - create  -> prepended
//   - update  -> the returned record replaces the old one in place
//   - delete  -> removed
//
// Views (by status, low stock, ...) read the mirror, never the store.
//
// ============================================================================

use chrono::NaiveDate;
use std::cmp::Ordering;
use std::sync::{Arc, PoisonError, RwLock};
use validator::Validate;

use crate::error::AppError;
use crate::models::dto::NewMovement;
use crate::models::role::Role;
use crate::models::task::{TaskPriority, TaskStatus};
use crate::models::{inventory_item, inventory_movement, project, task, task_history, users};
use crate::store::{
    CollectionStore, InventoryStore, PatchRules, ProjectStore, ProjectWithBudget, Record,
    StockChange, TaskStore, UserStore,
};

pub type Tasks = Collection<dyn TaskStore>;
pub type Inventory = Collection<dyn InventoryStore>;
pub type Projects = Collection<dyn ProjectStore>;
pub type Users = Collection<dyn UserStore>;

struct Mirror<R> {
    loaded: bool,
    records: Vec<R>,
}

pub struct Collection<S: CollectionStore + ?Sized> {
    store: Arc<S>,
    mirror: RwLock<Mirror<S::Record>>,
}

impl<S: CollectionStore + ?Sized> Collection<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            mirror: RwLock::new(Mirror {
                loaded: false,
                records: Vec::new(),
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads the collection the first time; later calls are no-ops
    pub async fn activate(&self) -> Result<usize, AppError> {
        let loaded = self.read(|mirror| mirror.loaded.then_some(mirror.records.len()));
        match loaded {
            Some(len) => Ok(len),
            None => self.refresh().await,
        }
    }

    /// Re-fetches the whole collection into the mirror
    pub async fn refresh(&self) -> Result<usize, AppError> {
        let records = self.store.fetch_all().await?;
        let len = records.len();
        self.write(|mirror| {
            mirror.records = records;
            mirror.loaded = true;
        });
        tracing::debug!(entity = self.store.entity(), len, "collection refreshed");
        Ok(len)
    }

    /// Drops the mirror; the next read fetches the collection again.
    /// Used when the store changed rows behind the collection (cascades).
    pub fn invalidate(&self) {
        self.write(|mirror| {
            mirror.loaded = false;
            mirror.records.clear();
        });
        tracing::debug!(entity = self.store.entity(), "collection invalidated");
    }

    /// Records in store order
    pub async fn list(&self) -> Result<Vec<S::Record>, AppError> {
        self.activate().await?;
        Ok(self.read(|mirror| mirror.records.clone()))
    }

    pub async fn sorted_by<F>(&self, compare: F) -> Result<Vec<S::Record>, AppError>
    where
        F: FnMut(&S::Record, &S::Record) -> Ordering,
    {
        let mut records = self.list().await?;
        records.sort_by(compare);
        Ok(records)
    }

    pub async fn filter<F>(&self, keep: F) -> Result<Vec<S::Record>, AppError>
    where
        F: Fn(&S::Record) -> bool,
    {
        self.activate().await?;
        Ok(self.read(|mirror| mirror.records.iter().filter(|r| keep(r)).cloned().collect()))
    }

    pub async fn get(&self, id: i32) -> Result<S::Record, AppError> {
        self.activate().await?;
        self.read(|mirror| mirror.records.iter().find(|r| r.id() == id).cloned())
            .ok_or_else(|| AppError::not_found(self.store.entity(), id))
    }

    #[tracing::instrument(skip_all, fields(entity = self.store.entity()))]
    pub async fn create(&self, draft: S::Draft) -> Result<S::Record, AppError> {
        draft.validate()?;
        self.activate().await?;
        let record = self.store.insert(draft).await?;
        tracing::info!(id = record.id(), "created");
        self.write(|mirror| mirror.records.insert(0, record.clone()));
        Ok(record)
    }

    #[tracing::instrument(skip(self, patch), fields(entity = self.store.entity()))]
    pub async fn update(&self, id: i32, patch: S::Patch) -> Result<S::Record, AppError> {
        patch.validate()?;
        let current = self
            .store
            .fetch_one(id)
            .await?
            .ok_or_else(|| AppError::not_found(self.store.entity(), id))?;
        if let Err(e) = patch.check_against(&current) {
            tracing::warn!(error = %e, "update rejected");
            return Err(e);
        }

        let record = self
            .store
            .update(id, patch)
            .await?
            .ok_or_else(|| AppError::not_found(self.store.entity(), id))?;
        tracing::info!("updated");
        self.splice(record.clone());
        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(entity = self.store.entity()))]
    pub async fn delete(&self, id: i32) -> Result<(), AppError> {
        if !self.store.delete(id).await? {
            return Err(AppError::not_found(self.store.entity(), id));
        }
        tracing::info!("deleted");
        self.write(|mirror| mirror.records.retain(|r| r.id() != id));
        Ok(())
    }

    pub async fn count(&self) -> Result<u64, AppError> {
        self.store.count().await
    }

    /// Replaces the record with the same id, or prepends it
    fn splice(&self, record: S::Record) {
        self.write(|mirror| {
            match mirror.records.iter_mut().find(|r| r.id() == record.id()) {
                Some(slot) => *slot = record,
                None => mirror.records.insert(0, record),
            }
        });
    }

    fn read<T>(&self, f: impl FnOnce(&Mirror<S::Record>) -> T) -> T {
        f(&self.mirror.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Mirror<S::Record>) -> T) -> T {
        f(&mut self.mirror.write().unwrap_or_else(PoisonError::into_inner))
    }
}

// ---------------------------------------------------------------------------
// tasks
// ---------------------------------------------------------------------------

impl<S: TaskStore + ?Sized> Collection<S> {
    pub async fn tasks_by_status(&self, status: TaskStatus) -> Result<Vec<task::Model>, AppError> {
        self.filter(|task| task.status == status).await
    }

    pub async fn tasks_by_priority(
        &self,
        priority: TaskPriority,
    ) -> Result<Vec<task::Model>, AppError> {
        self.filter(|task| task.priority == priority).await
    }

    pub async fn tasks_by_assignee(&self, user_id: i32) -> Result<Vec<task::Model>, AppError> {
        self.filter(|task| task.assigned_to == Some(user_id)).await
    }

    pub async fn history(&self, task_id: i32) -> Result<Vec<task_history::Model>, AppError> {
        if self.store.fetch_one(task_id).await?.is_none() {
            return Err(AppError::not_found("task", task_id));
        }
        self.store.history(task_id).await
    }
}

// ---------------------------------------------------------------------------
// inventory
// ---------------------------------------------------------------------------

impl<S: InventoryStore + ?Sized> Collection<S> {
    /// Items at or below their minimum stock
    pub async fn low_stock_items(&self) -> Result<Vec<inventory_item::Model>, AppError> {
        self.filter(inventory_item::Model::is_low_stock).await
    }

    #[tracing::instrument(skip(self, movement), fields(kind = ?movement.kind, quantity = %movement.quantity))]
    pub async fn record_movement(
        &self,
        item_id: i32,
        movement: NewMovement,
    ) -> Result<StockChange, AppError> {
        movement.validate()?;
        let change = self
            .store
            .record_movement(item_id, movement)
            .await?
            .ok_or_else(|| AppError::not_found("inventory item", item_id))?;
        tracing::info!(quantity = %change.item.quantity, "stock moved");
        self.splice(change.item.clone());
        Ok(change)
    }

    pub async fn movements(
        &self,
        item_id: i32,
    ) -> Result<Vec<inventory_movement::Model>, AppError> {
        if self.store.fetch_one(item_id).await?.is_none() {
            return Err(AppError::not_found("inventory item", item_id));
        }
        self.store.movements(item_id).await
    }
}

// ---------------------------------------------------------------------------
// projects
// ---------------------------------------------------------------------------

impl<S: ProjectStore + ?Sized> Collection<S> {
    pub async fn project_with_budget(&self, id: i32) -> Result<ProjectWithBudget, AppError> {
        self.store
            .with_budget(id)
            .await?
            .ok_or_else(|| AppError::not_found("project", id))
    }

    /// Projects not finished on `day`: no end date, or an end date still ahead
    pub async fn active_projects(&self, day: NaiveDate) -> Result<Vec<project::Model>, AppError> {
        self.filter(|project| project.end_date.is_none_or(|end| end >= day))
            .await
    }
}

// ---------------------------------------------------------------------------
// users
// ---------------------------------------------------------------------------

impl<S: UserStore + ?Sized> Collection<S> {
    /// Profiles whose stored role reads as `role`; unreadable roles are skipped
    pub async fn users_with_role(&self, role: Role) -> Result<Vec<users::Model>, AppError> {
        self.filter(|user| user.role().is_ok_and(|r| r == role)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dto::{InventoryPatch, NewInventoryItem, NewProject, NewTask, TaskPatch};
    use crate::models::inventory_movement::MovementKind;
    use crate::store::memory::MemoryGateway;
    use crate::utils::jwt::TokenIssuer;
    use rust_decimal::Decimal;

    fn gateway() -> MemoryGateway {
        MemoryGateway::new(Arc::new(TokenIssuer::new("test-secret", 1)))
            .with_password_iterations(1_000)
    }

    fn tasks(gateway: &MemoryGateway) -> Tasks {
        Collection::new(Arc::new(gateway.tasks()) as Arc<dyn TaskStore>)
    }

    fn inventory(gateway: &MemoryGateway) -> Inventory {
        Collection::new(Arc::new(gateway.inventory()) as Arc<dyn InventoryStore>)
    }

    fn item(name: &str, quantity: i64, minimum: i64) -> NewInventoryItem {
        NewInventoryItem {
            name: name.into(),
            quantity: Decimal::from(quantity),
            unit: "saco".into(),
            minimum_stock: Decimal::from(minimum),
            ..Default::default()
        }
    }

    fn status(status: TaskStatus) -> TaskPatch {
        TaskPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn completed_task_moves_between_status_views() -> anyhow::Result<()> {
        let gateway = gateway();
        let tasks = tasks(&gateway);
        let task = tasks
            .create(NewTask {
                title: "Colocar ferralla".into(),
                ..Default::default()
            })
            .await?;
        assert_eq!(task.status, TaskStatus::Pending);

        tasks.update(task.id, status(TaskStatus::Completed)).await?;

        let completed = tasks.tasks_by_status(TaskStatus::Completed).await?;
        let pending = tasks.tasks_by_status(TaskStatus::Pending).await?;
        assert!(completed.iter().any(|t| t.id == task.id));
        assert!(!pending.iter().any(|t| t.id == task.id));
        Ok(())
    }

    #[tokio::test]
    async fn terminal_tasks_cannot_be_reopened() -> anyhow::Result<()> {
        let gateway = gateway();
        let tasks = tasks(&gateway);
        let task = tasks
            .create(NewTask {
                title: "Hormigonado".into(),
                status: TaskStatus::InProgress,
                ..Default::default()
            })
            .await?;

        let back = tasks.update(task.id, status(TaskStatus::Pending)).await;
        assert!(matches!(back, Err(AppError::Validation(_))));

        tasks.update(task.id, status(TaskStatus::Cancelled)).await?;
        let reopen = tasks.update(task.id, status(TaskStatus::InProgress)).await;
        assert!(matches!(reopen, Err(AppError::Validation(_))));
        assert_eq!(tasks.get(task.id).await?.status, TaskStatus::Cancelled);
        Ok(())
    }

    #[tokio::test]
    async fn status_changes_are_recorded_in_history() -> anyhow::Result<()> {
        let gateway = gateway();
        let tasks = tasks(&gateway);
        let task = tasks
            .create(NewTask {
                title: "Replanteo".into(),
                ..Default::default()
            })
            .await?;
        tasks
            .update(
                task.id,
                TaskPatch {
                    status: Some(TaskStatus::InProgress),
                    comment: Some("Empezamos el lunes".into()),
                    ..Default::default()
                },
            )
            .await?;
        // no status change, no history row
        tasks
            .update(
                task.id,
                TaskPatch {
                    priority: Some(TaskPriority::Urgent),
                    ..Default::default()
                },
            )
            .await?;

        let history = tasks.history(task.id).await?;
        let statuses: Vec<_> = history.iter().map(|h| h.status).collect();
        assert_eq!(statuses, vec![TaskStatus::Pending, TaskStatus::InProgress]);
        assert_eq!(history[1].comment.as_deref(), Some("Empezamos el lunes"));
        Ok(())
    }

    #[tokio::test]
    async fn updating_a_missing_task_is_not_found() -> anyhow::Result<()> {
        let gateway = gateway();
        let tasks = tasks(&gateway);
        let result = tasks.update(404, status(TaskStatus::Completed)).await;
        assert!(matches!(result, Err(AppError::NotFound { entity: "task", .. })));
        assert!(matches!(tasks.delete(404).await, Err(AppError::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn mirror_follows_confirmed_writes_only() -> anyhow::Result<()> {
        let gateway = gateway();
        let tasks = tasks(&gateway);
        let first = tasks
            .create(NewTask {
                title: "Uno".into(),
                ..Default::default()
            })
            .await?;
        let second = tasks
            .create(NewTask {
                title: "Dos".into(),
                ..Default::default()
            })
            .await?;
        let ids: Vec<_> = tasks.list().await?.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        gateway.fail_next_write("network down");
        let failed = tasks.delete(first.id).await;
        assert!(matches!(failed, Err(AppError::Storage(_))));
        assert_eq!(tasks.list().await?.len(), 2);

        tasks.delete(first.id).await?;
        assert_eq!(tasks.list().await?.len(), 1);
        assert!(matches!(tasks.get(first.id).await, Err(AppError::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn blank_titles_never_reach_the_store() -> anyhow::Result<()> {
        let gateway = gateway();
        let tasks = tasks(&gateway);
        let result = tasks
            .create(NewTask {
                title: "  ".into(),
                ..Default::default()
            })
            .await;
        assert!(result.is_err_and(|e| e.is_validation()));
        assert_eq!(tasks.count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn assignee_view_only_returns_their_tasks() -> anyhow::Result<()> {
        let gateway = gateway();
        let tasks = tasks(&gateway);
        for (title, assignee) in [("A", Some(7)), ("B", Some(8)), ("C", None), ("D", Some(7))] {
            tasks
                .create(NewTask {
                    title: title.into(),
                    assigned_to: assignee,
                    ..Default::default()
                })
                .await?;
        }
        let mine = tasks.tasks_by_assignee(7).await?;
        let mut titles: Vec<_> = mine.iter().map(|t| t.title.as_str()).collect();
        titles.sort();
        assert_eq!(titles, vec!["A", "D"]);
        Ok(())
    }

    #[tokio::test]
    async fn low_stock_is_quantity_at_or_below_minimum() -> anyhow::Result<()> {
        let gateway = gateway();
        let inventory = inventory(&gateway);
        let cases = [("Cemento", 5, 10, true), ("Arena", 10, 10, true), ("Grava", 11, 10, false), ("Clavos", 0, 0, true)];
        for (name, quantity, minimum, _) in cases {
            inventory.create(item(name, quantity, minimum)).await?;
        }

        let low: Vec<_> = inventory
            .low_stock_items()
            .await?
            .into_iter()
            .map(|i| i.name)
            .collect();
        for (name, _, _, expected) in cases {
            assert_eq!(low.contains(&name.to_string()), expected, "{name}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn low_stock_view_tracks_updates() -> anyhow::Result<()> {
        let gateway = gateway();
        let inventory = inventory(&gateway);
        let bricks = inventory.create(item("Ladrillo", 100, 20)).await?;
        assert!(inventory.low_stock_items().await?.is_empty());

        inventory
            .update(
                bricks.id,
                InventoryPatch {
                    quantity: Some(Decimal::from(20)),
                    ..Default::default()
                },
            )
            .await?;
        assert_eq!(inventory.low_stock_items().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn outbound_movement_cannot_exceed_stock() -> anyhow::Result<()> {
        let gateway = gateway();
        let inventory = inventory(&gateway);
        let cement = inventory.create(item("Cemento", 30, 5)).await?;

        let change = inventory
            .record_movement(
                cement.id,
                NewMovement {
                    kind: MovementKind::Outbound,
                    quantity: Decimal::from(12),
                    description: Some("Obra Norte".into()),
                },
            )
            .await?;
        assert_eq!(change.item.quantity, Decimal::from(18));
        assert_eq!(inventory.get(cement.id).await?.quantity, Decimal::from(18));

        let too_much = inventory
            .record_movement(
                cement.id,
                NewMovement {
                    kind: MovementKind::Outbound,
                    quantity: Decimal::from(19),
                    description: None,
                },
            )
            .await;
        assert!(matches!(too_much, Err(AppError::Validation(_))));

        inventory
            .record_movement(
                cement.id,
                NewMovement {
                    kind: MovementKind::Inbound,
                    quantity: Decimal::from(2),
                    description: None,
                },
            )
            .await?;
        assert_eq!(inventory.get(cement.id).await?.quantity, Decimal::from(20));
        assert_eq!(inventory.movements(cement.id).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn project_dates_are_checked_against_the_stored_row() -> anyhow::Result<()> {
        let gateway = gateway();
        let projects: Projects = Collection::new(Arc::new(gateway.projects()) as Arc<dyn ProjectStore>);
        let project = projects
            .create(NewProject {
                name: "Torre Sur".into(),
                start_date: NaiveDate::from_ymd_opt(2026, 4, 1),
                ..Default::default()
            })
            .await?;

        let result = projects
            .update(
                project.id,
                crate::models::dto::ProjectPatch {
                    end_date: Some(NaiveDate::from_ymd_opt(2026, 3, 1)),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let with_budget = projects.project_with_budget(project.id).await?;
        assert!(with_budget.budget.is_none());
        Ok(())
    }
}
