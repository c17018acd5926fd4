use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{NewTask, TaskPatch};
use crate::models::role::AppRoute;
use crate::models::task::{TaskPriority, TaskStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee: Option<i32>,
}

/// GET /api/tasks?status=&priority=&assignee=
#[get("")]
pub async fn list_tasks(
    auth_user: AuthUser,
    query: web::Query<TaskQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Tasks)?;

    let TaskQuery { status, priority, assignee } = query.into_inner();
    let tasks = state
        .tasks
        .filter(|task| {
            status.is_none_or(|s| task.status == s)
                && priority.is_none_or(|p| task.priority == p)
                && assignee.is_none_or(|a| task.assigned_to == Some(a))
        })
        .await?;
    Ok(HttpResponse::Ok().json(tasks))
}

/// GET /api/tasks/mine - tasks assigned to the caller (any role)
#[get("/mine")]
pub async fn my_tasks(
    auth_user: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let tasks = state.tasks.tasks_by_assignee(auth_user.user_id).await?;
    Ok(HttpResponse::Ok().json(tasks))
}

#[post("")]
pub async fn create_task(
    auth_user: AuthUser,
    body: web::Json<NewTask>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Tasks)?;
    let task = state.tasks.create(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(task))
}

#[get("/{id}")]
pub async fn get_task(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Tasks)?;
    Ok(HttpResponse::Ok().json(state.tasks.get(path.into_inner()).await?))
}

/// GET /api/tasks/{id}/history - status changes, oldest first
#[get("/{id}/history")]
pub async fn task_history(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Tasks)?;
    Ok(HttpResponse::Ok().json(state.tasks.history(path.into_inner()).await?))
}

#[put("/{id}")]
pub async fn update_task(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<TaskPatch>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Tasks)?;
    let task = state
        .tasks
        .update(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(task))
}

#[delete("/{id}")]
pub async fn delete_task(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Tasks)?;
    state.tasks.delete(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn task_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/tasks")
            .service(list_tasks)
            .service(my_tasks)
            .service(create_task)
            .service(get_task)
            .service(task_history)
            .service(update_task)
            .service(delete_task),
    );
}
