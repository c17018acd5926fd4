use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::role::{AppRoute, Role};
use crate::services::session::Activation;
use crate::state::AppState;

/// Structure qui contient les infos de l'utilisateur authentifié
/// Utilisée comme extracteur dans les routes protégées
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub user_id: i32,
    pub auth_id: Uuid,
    pub username: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub token: String,
}

impl AuthUser {
    /// Forbidden unless the role opens `route`
    pub fn require(&self, route: AppRoute) -> Result<(), AppError> {
        if self.role.can_access(route) {
            return Ok(());
        }
        tracing::warn!(user_id = self.user_id, role = %self.role, ?route, "route refused");
        Err(AppError::Forbidden(format!(
            "{} cannot access {}",
            self.role,
            route.label()
        )))
    }

    /// Forbidden unless the role opens at least one of `routes`
    pub fn require_any(&self, routes: &[AppRoute]) -> Result<(), AppError> {
        if routes.iter().any(|route| self.role.can_access(*route)) {
            return Ok(());
        }
        tracing::warn!(user_id = self.user_id, role = %self.role, ?routes, "routes refused");
        Err(AppError::Forbidden(format!(
            "{} cannot access this resource",
            self.role
        )))
    }
}

/// Extracts "<token>" from "Authorization: Bearer <token>"
fn bearer_token(req: &HttpRequest) -> Result<String, AppError> {
    let header = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;
    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            AppError::Unauthorized("Invalid Authorization format (expected: Bearer <token>)".into())
        })
}

/// Implémentation de FromRequest pour AuthUser: the token must belong to a
/// live session whose identity has a profile
impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let token = bearer_token(req);

        Box::pin(async move {
            let state = state
                .ok_or_else(|| AppError::Consistency("application state is not configured".into()))?;
            let token = token?;

            match state.session().activate(&token).await? {
                Activation::Active(info) => Ok(AuthUser {
                    user_id: info.profile.id,
                    auth_id: info.profile.auth_id,
                    username: info.profile.username,
                    role: info.role,
                    token,
                }),
                Activation::NoSession => Err(AppError::Unauthorized(
                    "Invalid or expired token".into(),
                )),
                Activation::RedirectToLogin => Err(AppError::Unauthorized(
                    "No user profile for this session, please sign in again".into(),
                )),
            }
        })
    }
}
