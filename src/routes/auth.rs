use actix_web::{get, post, web, HttpResponse};
use validator::Validate;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{Credentials, MessageResponse};
use crate::services::session::Activation;
use crate::state::AppState;

/// POST /auth/login - Se connecter (PUBLIC)
#[post("/login")]
pub async fn login(
    body: web::Json<Credentials>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    let info = state.session().login(&body).await?;
    Ok(HttpResponse::Ok().json(info))
}

/// POST /auth/logout - Révoquer le token courant (PROTÉGÉE)
#[post("/logout")]
pub async fn logout(
    auth_user: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let context = state.session();
    context.activate(&auth_user.token).await?;
    context.logout().await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        success: true,
        message: "Signed out".to_string(),
    }))
}

/// GET /auth/session - Profil, routes et menu du token courant (PROTÉGÉE)
#[get("/session")]
pub async fn session(
    auth_user: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    match state.session().activate(&auth_user.token).await? {
        Activation::Active(info) => Ok(HttpResponse::Ok().json(info)),
        _ => Err(AppError::Unauthorized("session ended".into())),
    }
}

pub fn auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(login)
            .service(logout)
            .service(session),
    );
}
