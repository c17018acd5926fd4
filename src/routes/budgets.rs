use actix_web::{delete, get, patch, post, put, web, HttpResponse};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{LedgerEntryEdit, NewBudget, NewLedgerEntry, RenameBudget, SetAllocation};
use crate::models::role::AppRoute;
use crate::state::AppState;

// Budget and expense pages share the ledger
const LEDGER_ROUTES: [AppRoute; 2] = [AppRoute::Budget, AppRoute::Expenses];

// ---------------------------------------------------------------------------
// budgets
// ---------------------------------------------------------------------------

/// GET /api/budgets
#[get("")]
pub async fn list_budgets(
    auth_user: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&LEDGER_ROUTES)?;
    Ok(HttpResponse::Ok().json(state.ledger.list_budgets().await?))
}

/// POST /api/budgets
#[post("")]
pub async fn create_budget(
    auth_user: AuthUser,
    body: web::Json<NewBudget>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Budget)?;
    let budget = state.ledger.create_budget(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(budget))
}

/// GET /api/budgets/{id}
#[get("/{id}")]
pub async fn get_budget(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&LEDGER_ROUTES)?;
    Ok(HttpResponse::Ok().json(state.ledger.get_budget(path.into_inner()).await?))
}

/// PATCH /api/budgets/{id} - rename
#[patch("/{id}")]
pub async fn rename_budget(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<RenameBudget>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Budget)?;
    let budget = state
        .ledger
        .rename_budget(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(budget))
}

/// DELETE /api/budgets/{id}
#[delete("/{id}")]
pub async fn delete_budget(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Budget)?;
    state.delete_budget(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// PUT /api/budgets/{id}/allocation
#[put("/{id}/allocation")]
pub async fn set_allocation(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<SetAllocation>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Budget)?;
    let budget = state
        .ledger
        .set_allocation(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(budget))
}

/// GET /api/budgets/{id}/summary - allocation, expenses, incomes, remaining
#[get("/{id}/summary")]
pub async fn budget_summary(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&LEDGER_ROUTES)?;
    Ok(HttpResponse::Ok().json(state.ledger.summary(path.into_inner()).await?))
}

/// GET /api/budgets/{id}/reconciliation
#[get("/{id}/reconciliation")]
pub async fn reconciliation(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Budget)?;
    Ok(HttpResponse::Ok().json(state.ledger.reconcile(path.into_inner()).await?))
}

/// GET /api/budgets/{id}/expenses
#[get("/{id}/expenses")]
pub async fn budget_expenses(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&LEDGER_ROUTES)?;
    Ok(HttpResponse::Ok().json(state.ledger.list_expenses(path.into_inner()).await?))
}

/// POST /api/budgets/{id}/expenses
#[post("/{id}/expenses")]
pub async fn add_expense(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<NewLedgerEntry>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&LEDGER_ROUTES)?;
    let expense = state
        .ledger
        .add_expense(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(expense))
}

/// GET /api/budgets/{id}/incomes
#[get("/{id}/incomes")]
pub async fn budget_incomes(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&LEDGER_ROUTES)?;
    Ok(HttpResponse::Ok().json(state.ledger.list_incomes(path.into_inner()).await?))
}

/// POST /api/budgets/{id}/incomes
#[post("/{id}/incomes")]
pub async fn add_income(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<NewLedgerEntry>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Budget)?;
    let income = state
        .ledger
        .add_income(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(income))
}

// ---------------------------------------------------------------------------
// entries
// ---------------------------------------------------------------------------

/// GET /api/expenses - every budget
#[get("")]
pub async fn all_expenses(
    auth_user: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&LEDGER_ROUTES)?;
    Ok(HttpResponse::Ok().json(state.ledger.list_all_expenses().await?))
}

#[get("/{id}")]
pub async fn get_expense(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&LEDGER_ROUTES)?;
    Ok(HttpResponse::Ok().json(state.ledger.get_expense(path.into_inner()).await?))
}

#[put("/{id}")]
pub async fn update_expense(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<LedgerEntryEdit>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&LEDGER_ROUTES)?;
    let expense = state
        .ledger
        .update_expense(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(expense))
}

#[delete("/{id}")]
pub async fn delete_expense(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&LEDGER_ROUTES)?;
    state.ledger.delete_expense(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/incomes - every budget
#[get("")]
pub async fn all_incomes(
    auth_user: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&LEDGER_ROUTES)?;
    Ok(HttpResponse::Ok().json(state.ledger.list_all_incomes().await?))
}

#[get("/{id}")]
pub async fn get_income(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_any(&LEDGER_ROUTES)?;
    Ok(HttpResponse::Ok().json(state.ledger.get_income(path.into_inner()).await?))
}

#[put("/{id}")]
pub async fn update_income(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: web::Json<LedgerEntryEdit>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Budget)?;
    let income = state
        .ledger
        .update_income(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(income))
}

#[delete("/{id}")]
pub async fn delete_income(
    auth_user: AuthUser,
    path: web::Path<i32>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth_user.require(AppRoute::Budget)?;
    state.ledger.delete_income(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn budget_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/budgets")
            .service(list_budgets)
            .service(create_budget)
            .service(get_budget)
            .service(rename_budget)
            .service(delete_budget)
            .service(set_allocation)
            .service(budget_summary)
            .service(reconciliation)
            .service(budget_expenses)
            .service(add_expense)
            .service(budget_incomes)
            .service(add_income),
    )
    .service(
        web::scope("/expenses")
            .service(all_expenses)
            .service(get_expense)
            .service(update_expense)
            .service(delete_expense),
    )
    .service(
        web::scope("/incomes")
            .service(all_incomes)
            .service(get_income)
            .service(update_income)
            .service(delete_income),
    );
}
