use actix_web::{delete, get, post, put, web, HttpResponse};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{InventoryPatch, NewInventoryItem, NewMovement};
use crate::models::role::AppRoute;
use crate::state::AppState;

// Suppliers reach stock through the orders page as well
const STOCK_ROUTES: [AppRoute; 2] = [AppRoute::Inventory, AppRoute::Orders];

#[get("")]
pub async fn list_items(
    auth_user: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&STOCK_ROUTES)?;
    Ok(HttpResponse::Ok().json(state.inventory.list().await?))
}

/// GET /api/inventory/low-stock - quantity at or below minimum_stock
#[get("/low-stock")]
pub async fn low_stock(
    auth_user: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&STOCK_ROUTES)?;
    Ok(HttpResponse::Ok().json(state.inventory.low_stock_items().await?))
}

#[post("")]
pub async fn create_item(
    auth_user: AuthUser,
    body: web::Json<NewInventoryItem>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Inventory)?;
    let item = state.inventory.create(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(item))
}

#[get("/{id}")]
pub async fn get_item(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&STOCK_ROUTES)?;
    Ok(HttpResponse::Ok().json(state.inventory.get(path.into_inner()).await?))
}

#[put("/{id}")]
pub async fn update_item(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<InventoryPatch>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Inventory)?;
    let item = state
        .inventory
        .update(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(item))
}

#[delete("/{id}")]
pub async fn delete_item(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Inventory)?;
    state.inventory.delete(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/{id}/movements")]
pub async fn list_movements(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&STOCK_ROUTES)?;
    Ok(HttpResponse::Ok().json(state.inventory.movements(path.into_inner()).await?))
}

/// POST /api/inventory/{id}/movements - stock in (entrada) or out (salida)
#[post("/{id}/movements")]
pub async fn record_movement(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<NewMovement>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&STOCK_ROUTES)?;
    let change = state
        .inventory
        .record_movement(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(change))
}

pub fn inventory_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/inventory")
            .service(list_items)
            .service(low_stock)
            .service(create_item)
            .service(get_item)
            .service(update_item)
            .service(delete_item)
            .service(list_movements)
            .service(record_movement),
    );
}
