use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{NewUser, UserPatch};
use crate::models::role::{AppRoute, Role};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub role: Option<Role>,
}

/// GET /api/users?role=
#[get("")]
pub async fn list_users(
    auth_user: AuthUser,
    query: web::Query<UserQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&[AppRoute::Users, AppRoute::Personnel])?;
    let users = match query.role {
        Some(role) => state.users.users_with_role(role).await?,
        None => state.users.list().await?,
    };
    Ok(HttpResponse::Ok().json(users))
}

/// POST /api/users - creates the sign-in account and the profile together
#[post("")]
pub async fn create_user(
    auth_user: AuthUser,
    body: web::Json<NewUser>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Users)?;
    let user = state.users.create(body.into_inner()).await?;
    tracing::info!(created_by = auth_user.user_id, user_id = user.id, "user created");
    Ok(HttpResponse::Created().json(user))
}

#[get("/{id}")]
pub async fn get_user(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&[AppRoute::Users, AppRoute::Personnel])?;
    Ok(HttpResponse::Ok().json(state.users.get(path.into_inner()).await?))
}

#[put("/{id}")]
pub async fn update_user(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<UserPatch>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Users)?;
    let user = state
        .users
        .update(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(user))
}

#[delete("/{id}")]
pub async fn delete_user(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Users)?;
    let id = path.into_inner();
    if id == auth_user.user_id {
        return Err(AppError::Validation("you cannot delete your own profile".into()));
    }
    state.users.delete(id).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn user_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users")
            .service(list_users)
            .service(create_user)
            .service(get_user)
            .service(update_user)
            .service(delete_user),
    );
}
