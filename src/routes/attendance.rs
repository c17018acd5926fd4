use actix_web::{get, post, web, HttpResponse};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::role::AppRoute;
use crate::services::attendance_service::{AttendanceStats, DaySheetRow};
use crate::state::AppState;

/// Body of entry/exit; without `employee_id` the caller marks their own day
#[derive(Debug, Default, Deserialize)]
pub struct MarkRequest {
    pub employee_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct MarkResponse {
    pub employee_id: i32,
    /// false when the mark was already there (or the exit had no entry)
    pub recorded: bool,
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct DaySheet {
    pub stats: AttendanceStats,
    pub rows: Vec<DaySheetRow>,
}

/// Marking someone else is an attendance-page action
fn target_employee(auth_user: &AuthUser, body: Option<MarkRequest>) -> Result<i32, AppError> {
    match body.and_then(|b| b.employee_id) {
        Some(id) if id != auth_user.user_id => {
            auth_user.require(AppRoute::Attendance)?;
            Ok(id)
        }
        _ => Ok(auth_user.user_id),
    }
}

#[post("/entry")]
pub async fn register_entry(
    auth_user: AuthUser,
    body: Option<web::Json<MarkRequest>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let employee_id = target_employee(&auth_user, body.map(web::Json::into_inner))?;
    let recorded = state.attendance.register_entry(employee_id).await?;
    Ok(HttpResponse::Ok().json(MarkResponse { employee_id, recorded }))
}

#[post("/exit")]
pub async fn register_exit(
    auth_user: AuthUser,
    body: Option<web::Json<MarkRequest>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let employee_id = target_employee(&auth_user, body.map(web::Json::into_inner))?;
    let recorded = state.attendance.register_exit(employee_id).await?;
    Ok(HttpResponse::Ok().json(MarkResponse { employee_id, recorded }))
}

/// GET /api/attendance/me - the caller's records of the current work day
#[get("/me")]
pub async fn my_day(
    auth_user: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let records = state.attendance.today_records(auth_user.user_id).await?;
    Ok(HttpResponse::Ok().json(records))
}

/// GET /api/attendance/day?date=YYYY-MM-DD - one row per user, today by default
#[get("/day")]
pub async fn day_sheet(
    auth_user: AuthUser,
    query: web::Query<DayQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Attendance)?;
    let day = query.date.unwrap_or_else(|| state.attendance.today());

    let employees = state.users.list().await?;
    let (stats, rows) = tokio::try_join!(
        state.attendance.stats(day),
        state.attendance.day_sheet(day, &employees),
    )?;
    Ok(HttpResponse::Ok().json(DaySheet { stats, rows }))
}

#[get("/employee/{id}")]
pub async fn employee_records(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let employee_id = path.into_inner();
    if employee_id != auth_user.user_id {
        auth_user.require(AppRoute::Attendance)?;
    }
    Ok(HttpResponse::Ok().json(state.attendance.records_for(employee_id).await?))
}

pub fn attendance_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/attendance")
            .service(register_entry)
            .service(register_exit)
            .service(my_day)
            .service(day_sheet)
            .service(employee_records),
    );
}
