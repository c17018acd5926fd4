use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

use crate::error::AppError;
use crate::models::dto::Credentials;
use crate::models::role::{AppRoute, MenuItem, Role};
use crate::models::users;
use crate::store::{AuthSession, IdentityProvider, ProfileStore, SessionEvent};

/// The authenticated principal: token, profile and what the role opens
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub profile: users::Model,
    pub role: Role,
    pub home: AppRoute,
    pub routes: Vec<AppRoute>,
    pub menu: Vec<MenuItem>,
}

impl SessionInfo {
    fn new(session: AuthSession, profile: users::Model, role: Role) -> Self {
        Self {
            token: session.token,
            expires_at: session.expires_at,
            profile,
            role,
            home: role.home(),
            routes: role.allowed_routes().to_vec(),
            menu: role.menu_items(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    Active(SessionInfo),
    /// No live session behind the token
    NoSession,
    /// The identity is valid but has no usable profile; it was signed out
    RedirectToLogin,
}

/// Session state of one client, backed by the identity provider and the
/// profile table.
pub struct SessionContext {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    current: RwLock<Option<SessionInfo>>,
}

impl SessionContext {
    pub fn new(identity: Arc<dyn IdentityProvider>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            identity,
            profiles,
            current: RwLock::new(None),
        }
    }

    /// Resumes the session behind `token`
    pub async fn activate(&self, token: &str) -> Result<Activation, AppError> {
        let Some(session) = self.identity.get_session(token).await? else {
            self.set_current(None);
            return Ok(Activation::NoSession);
        };

        match self.profile_for(&session).await? {
            Some((profile, role)) => {
                let info = SessionInfo::new(session, profile, role);
                self.set_current(Some(info.clone()));
                Ok(Activation::Active(info))
            }
            None => {
                self.identity.sign_out(token).await?;
                self.set_current(None);
                Ok(Activation::RedirectToLogin)
            }
        }
    }

    /// Credential check, then the mandatory profile. An identity without a
    /// profile is signed out again and refused.
    #[tracing::instrument(skip_all, fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionInfo, AppError> {
        let session = match self.identity.sign_in_with_password(credentials).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "login refused");
                return Err(e);
            }
        };

        let Some((profile, role)) = self.profile_for(&session).await? else {
            self.identity.sign_out(&session.token).await?;
            self.set_current(None);
            return Err(AppError::Unauthorized(
                "this account has no user profile".into(),
            ));
        };

        tracing::info!(user_id = profile.id, role = %role, "signed in");
        let info = SessionInfo::new(session, profile, role);
        self.set_current(Some(info.clone()));
        Ok(info)
    }

    /// Signs the current session out remotely and forgets it
    pub async fn logout(&self) -> Result<(), AppError> {
        let Some(info) = self.current() else {
            return Ok(());
        };
        self.identity.sign_out(&info.token).await?;
        self.set_current(None);
        tracing::info!(user_id = info.profile.id, "signed out");
        Ok(())
    }

    pub fn current(&self) -> Option<SessionInfo> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.identity.subscribe()
    }

    /// Profile and role of the identity; None when either is missing
    async fn profile_for(
        &self,
        session: &AuthSession,
    ) -> Result<Option<(users::Model, Role)>, AppError> {
        let Some(profile) = self.profiles.profile_by_auth_id(session.auth_id).await? else {
            tracing::warn!(auth_id = %session.auth_id, "no profile for this identity");
            return Ok(None);
        };
        match profile.role() {
            Ok(role) => Ok(Some((profile, role))),
            Err(e) => {
                tracing::warn!(error = %e, "profile role is unreadable");
                Ok(None)
            }
        }
    }

    fn set_current(&self, info: Option<SessionInfo>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = info;
    }
}
