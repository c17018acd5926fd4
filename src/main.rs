mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;
mod state;
mod store;
mod utils;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use config::{AppConfig, DataBackend, SeedAdmin};
use models::dto::NewUser;
use models::role::Role;
use services::attendance_service::SystemClock;
use state::AppState;
use store::memory::MemoryGateway;
use store::postgres::PostgresGateway;
use store::SessionEvent;
use utils::jwt::TokenIssuer;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let tokens = Arc::new(TokenIssuer::new(config.jwt_secret.clone(), config.jwt_ttl_hours));

    let state = match config.backend {
        DataBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;
            tracing::info!("connecting to database");
            let db = db::establish_connection(url)
                .await
                .context("failed to connect to database")?;
            if config.run_migrations {
                db::run_migrations(&db)
                    .await
                    .context("failed to run migrations")?;
                tracing::info!("migrations applied");
            }
            let gateway = PostgresGateway::new(db, tokens);
            let restored = gateway
                .restore_revocations()
                .await
                .context("failed to load revoked tokens")?;
            tracing::info!(restored, "revoked tokens loaded");
            AppState::on_postgres(&gateway, config.attendance_offset)
        }
        DataBackend::Memory => {
            tracing::warn!("DATA_BACKEND=memory, nothing is persisted");
            AppState::in_memory(
                &MemoryGateway::new(tokens),
                config.attendance_offset,
                Arc::new(SystemClock),
            )
        }
    };

    if let Some(seed) = &config.seed_admin {
        seed_super_admin(&state, seed).await?;
    }
    spawn_session_log(&state);

    let state = web::Data::new(state);
    tracing::info!(host = %config.host, port = config.port, "starting server");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(routes::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}

/// Creates the SuperAdmin profile unless a user with that email exists
async fn seed_super_admin(state: &AppState, seed: &SeedAdmin) -> anyhow::Result<()> {
    let users = state.users.list().await?;
    if users.iter().any(|user| user.email.eq_ignore_ascii_case(&seed.email)) {
        tracing::debug!(email = %seed.email, "super admin already present");
        return Ok(());
    }

    let username = seed
        .email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .unwrap_or("superadmin")
        .to_string();
    let user = state
        .users
        .create(NewUser {
            username,
            email: seed.email.clone(),
            name: "SuperAdmin".to_string(),
            role: Role::SuperAdmin,
            password: seed.password.clone(),
        })
        .await
        .context("failed to seed the super admin")?;
    tracing::info!(user_id = user.id, "super admin created");
    Ok(())
}

fn spawn_session_log(state: &AppState) {
    let mut events = state.identity.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::SignedIn { auth_id }) => tracing::info!(%auth_id, "signed in"),
                Ok(SessionEvent::SignedOut { auth_id }) => tracing::info!(%auth_id, "signed out"),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "session log lagging")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
