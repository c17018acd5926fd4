use actix_web::{get, web, HttpResponse};
use chrono::Utc;

use crate::models::health::HealthResponse;
use crate::state::AppState;

#[get("/health")]
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let storage = match state.projects.count().await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::error!(error = %e, "health check could not reach the store");
            "unavailable"
        }
    };

    let response = HealthResponse {
        status: "ok",
        storage,
        time: Utc::now(),
    };

    HttpResponse::Ok().json(response)
}
