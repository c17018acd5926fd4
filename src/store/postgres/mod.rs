// sea-orm gateway: one handle over the pooled connection, one port per file
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::utils::jwt::TokenIssuer;
use crate::utils::password;

mod attendance;
mod collections;
mod identity;
mod ledger;

pub use collections::{PostgresInventory, PostgresProjects, PostgresTasks, PostgresUsers};

#[derive(Clone)]
pub struct PostgresGateway {
    db: DatabaseConnection,
    tokens: Arc<TokenIssuer>,
    password_iterations: u32,
}

impl PostgresGateway {
    pub fn new(db: DatabaseConnection, tokens: Arc<TokenIssuer>) -> Self {
        Self {
            db,
            tokens,
            password_iterations: password::ITERATIONS,
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn tasks(&self) -> PostgresTasks {
        PostgresTasks(self.clone())
    }

    pub fn inventory(&self) -> PostgresInventory {
        PostgresInventory(self.clone())
    }

    pub fn projects(&self) -> PostgresProjects {
        PostgresProjects(self.clone())
    }

    pub fn users(&self) -> PostgresUsers {
        PostgresUsers(self.clone())
    }
}
