use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{NewProject, ProjectPatch};
use crate::models::role::AppRoute;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProjectQuery {
    /// Only projects not finished today
    #[serde(default)]
    pub active: bool,
}

#[get("")]
pub async fn list_projects(
    auth_user: AuthUser,
    query: web::Query<ProjectQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Projects)?;
    let projects = if query.active {
        state.projects.active_projects(state.attendance.today()).await?
    } else {
        state.projects.list().await?
    };
    Ok(HttpResponse::Ok().json(projects))
}

#[post("")]
pub async fn create_project(
    auth_user: AuthUser,
    body: web::Json<NewProject>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Projects)?;
    let project = state.projects.create(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(project))
}

/// GET /api/projects/{id} - the project with its linked budget, if any
#[get("/{id}")]
pub async fn get_project(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Projects)?;
    let project = state.projects.project_with_budget(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(project))
}

#[put("/{id}")]
pub async fn update_project(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<ProjectPatch>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Projects)?;
    let project = state
        .projects
        .update(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(project))
}

#[delete("/{id}")]
pub async fn delete_project(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Projects)?;
    state.delete_project(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn project_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/projects")
            .service(list_projects)
            .service(create_project)
            .service(get_project)
            .service(update_project)
            .service(delete_project),
    );
}
