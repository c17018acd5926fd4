use actix_web::{get, web, HttpResponse};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::services::dashboard_service::DashboardService;
use crate::state::AppState;

/// GET /api/dashboard - stat cards for the caller's role (empty for workers)
#[get("/dashboard")]
pub async fn dashboard(
    auth_user: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let cards = DashboardService::stats_for(&state, auth_user.role).await?;
    Ok(HttpResponse::Ok().json(cards))
}
