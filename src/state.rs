// Services shared by every request, built once over the selected gateway
use chrono::FixedOffset;
use std::sync::Arc;

use crate::error::AppError;
use crate::services::attendance_service::{AttendanceTracker, Clock, SystemClock};
use crate::services::collection::{Collection, Inventory, Projects, Tasks, Users};
use crate::services::ledger_service::LedgerService;
use crate::services::session::SessionContext;
use crate::store::memory::MemoryGateway;
use crate::store::postgres::PostgresGateway;
use crate::store::{
    IdentityProvider, InventoryStore, ProfileStore, ProjectStore, TaskStore, UserStore,
};

pub struct AppState {
    pub ledger: LedgerService,
    pub tasks: Tasks,
    pub inventory: Inventory,
    pub projects: Projects,
    pub users: Users,
    pub attendance: AttendanceTracker,
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
}

impl AppState {
    pub fn in_memory(
        gateway: &MemoryGateway,
        attendance_offset: FixedOffset,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let users = Arc::new(gateway.users());
        Self {
            ledger: LedgerService::new(Arc::new(gateway.clone())),
            tasks: Collection::new(Arc::new(gateway.tasks()) as Arc<dyn TaskStore>),
            inventory: Collection::new(Arc::new(gateway.inventory()) as Arc<dyn InventoryStore>),
            projects: Collection::new(Arc::new(gateway.projects()) as Arc<dyn ProjectStore>),
            users: Collection::new(users.clone() as Arc<dyn UserStore>),
            attendance: AttendanceTracker::new(
                Arc::new(gateway.clone()),
                clock,
                attendance_offset,
            ),
            identity: Arc::new(gateway.clone()),
            profiles: users,
        }
    }

    pub fn on_postgres(gateway: &PostgresGateway, attendance_offset: FixedOffset) -> Self {
        let users = Arc::new(gateway.users());
        Self {
            ledger: LedgerService::new(Arc::new(gateway.clone())),
            tasks: Collection::new(Arc::new(gateway.tasks()) as Arc<dyn TaskStore>),
            inventory: Collection::new(Arc::new(gateway.inventory()) as Arc<dyn InventoryStore>),
            projects: Collection::new(Arc::new(gateway.projects()) as Arc<dyn ProjectStore>),
            users: Collection::new(users.clone() as Arc<dyn UserStore>),
            attendance: AttendanceTracker::new(
                Arc::new(gateway.clone()),
                Arc::new(SystemClock),
                attendance_offset,
            ),
            identity: Arc::new(gateway.clone()),
            profiles: users,
        }
    }

    /// Deletes a budget. Its projects keep existing with no budget, so the
    /// project mirror is reloaded on next read.
    pub async fn delete_budget(&self, id: i32) -> Result<(), AppError> {
        self.ledger.delete_budget(id).await?;
        self.projects.invalidate();
        Ok(())
    }

    /// Deletes a project and detaches the inventory items stored for it
    pub async fn delete_project(&self, id: i32) -> Result<(), AppError> {
        self.projects.delete(id).await?;
        self.inventory.invalidate();
        Ok(())
    }

    /// A fresh session context for one request
    pub fn session(&self) -> SessionContext {
        SessionContext::new(self.identity.clone(), self.profiles.clone())
    }
}
