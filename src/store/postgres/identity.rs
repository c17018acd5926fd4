use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use tokio::sync::broadcast;

use super::PostgresGateway;
use crate::error::AppError;
use crate::models::{auth_account, revoked_token};
use crate::models::dto::Credentials;
use crate::store::{AuthSession, IdentityProvider, SessionEvent};
use crate::utils::jwt::Revocation;
use crate::utils::password;

impl PostgresGateway {
    /// Loads the unexpired revocations into the token issuer and drops the rest.
    /// Run once at startup so signed-out tokens stay signed out.
    pub async fn restore_revocations(&self) -> Result<usize, AppError> {
        let now = chrono::Utc::now();
        revoked_token::Entity::delete_many()
            .filter(revoked_token::Column::ExpiresAt.lt(now))
            .exec(&self.db)
            .await?;
        let rows = revoked_token::Entity::find().all(&self.db).await?;
        Ok(self.tokens.restore(rows.into_iter().map(|row| Revocation {
            jti: row.jti,
            auth_id: row.auth_id,
            expires_at: row.expires_at,
        })))
    }
}

#[async_trait]
impl IdentityProvider for PostgresGateway {
    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<AuthSession, AppError> {
        let account = auth_account::Entity::find()
            .filter(auth_account::Column::Email.eq(credentials.email.trim().to_lowercase()))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid email or password".into()))?;

        let valid = password::verify_password(&credentials.password, &account.password_hash)
            .map_err(|e| {
                tracing::warn!(auth_id = %account.auth_id, error = %e, "stored password hash is unreadable");
                AppError::Unauthorized("Invalid email or password".into())
            })?;
        if !valid {
            return Err(AppError::Unauthorized("Invalid email or password".into()));
        }

        self.tokens.issue(account.auth_id, &account.email)
    }

    async fn get_session(&self, token: &str) -> Result<Option<AuthSession>, AppError> {
        let Some(session) = self.tokens.verify(token) else {
            return Ok(None);
        };
        let account = auth_account::Entity::find_by_id(session.auth_id)
            .one(&self.db)
            .await?;
        Ok(account.map(|_| session))
    }

    async fn sign_out(&self, token: &str) -> Result<(), AppError> {
        let Some(revocation) = self.tokens.revoke(token) else {
            return Ok(());
        };
        revoked_token::Entity::insert(revoked_token::ActiveModel {
            jti: Set(revocation.jti),
            auth_id: Set(revocation.auth_id),
            expires_at: Set(revocation.expires_at),
        })
        .on_conflict(
            OnConflict::column(revoked_token::Column::Jti)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tokens.subscribe()
    }
}
