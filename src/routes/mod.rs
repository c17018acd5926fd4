pub mod attendance;
pub mod auth;
pub mod budgets;
pub mod dashboard;
pub mod health;
pub mod inventory;
pub mod projects;
pub mod tasks;
pub mod users;

use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(health::health_check)
            .service(dashboard::dashboard)
            .configure(auth::auth_routes)
            .configure(budgets::budget_routes)
            .configure(projects::project_routes)
            .configure(tasks::task_routes)
            .configure(inventory::inventory_routes)
            .configure(users::user_routes)
            .configure(attendance::attendance_routes),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};
    use chrono::FixedOffset;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use std::sync::Arc;

    use crate::models::dto::NewUser;
    use crate::models::role::Role;
    use crate::services::attendance_service::testing::FixedClock;
    use crate::state::AppState;
    use crate::store::memory::MemoryGateway;
    use crate::utils::jwt::TokenIssuer;

    const PASSWORD: &str = "obra-segura-1";

    async fn state_with(roles: &[(&str, Role)]) -> web::Data<AppState> {
        let gateway = MemoryGateway::new(Arc::new(TokenIssuer::new("route-secret", 1)))
            .with_password_iterations(1_000);
        let state = AppState::in_memory(
            &gateway,
            FixedOffset::east_opt(0).unwrap(),
            FixedClock::at("2026-03-20T08:00:00Z"),
        );
        for (username, role) in roles {
            state
                .users
                .create(NewUser {
                    username: username.to_string(),
                    email: format!("{username}@obra.test"),
                    name: username.to_string(),
                    role: *role,
                    password: PASSWORD.into(),
                })
                .await
                .unwrap();
        }
        web::Data::new(state)
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state.clone())
                    .configure(configure_routes),
            )
            .await
        };
    }

    macro_rules! login {
        ($app:expr, $username:expr) => {{
            let req = test::TestRequest::post()
                .uri("/api/auth/login")
                .set_json(json!({ "email": format!("{}@obra.test", $username), "password": PASSWORD }))
                .to_request();
            let body: Value = test::call_and_read_body_json(&$app, req).await;
            body["token"].as_str().unwrap().to_string()
        }};
    }

    fn bearer(token: &str) -> (&'static str, String) {
        ("Authorization", format!("Bearer {token}"))
    }

    #[actix_web::test]
    async fn health_reports_storage() {
        let state = state_with(&[]).await;
        let app = app!(state);

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["storage"], "ok");
    }

    #[actix_web::test]
    async fn protected_routes_need_a_token() {
        let state = state_with(&[]).await;
        let app = app!(state);

        let req = test::TestRequest::get().uri("/api/budgets").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/budgets")
            .insert_header(bearer("not-a-token"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn login_returns_menu_and_logout_ends_the_session() {
        let state = state_with(&[("ana", Role::SiteManager)]).await;
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": "ana@obra.test", "password": PASSWORD }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["role"], "Jefe de Obra");
        assert_eq!(body["menu"].as_array().unwrap().len(), 3);
        let token = body["token"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/api/auth/logout")
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/api/auth/session")
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn wrong_password_is_unauthorized() {
        let state = state_with(&[("ana", Role::SiteManager)]).await;
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": "ana@obra.test", "password": "nope-nope" }))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn role_gates_the_ledger() {
        let state = state_with(&[("pm", Role::ProjectManager), ("sup", Role::SupplyOfficer)]).await;
        let app = app!(state);
        let pm = login!(app, "pm");
        let sup = login!(app, "sup");

        let req = test::TestRequest::post()
            .uri("/api/budgets")
            .insert_header(bearer(&sup))
            .set_json(json!({ "name": "Obra Norte", "allocation": "1000" }))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::FORBIDDEN
        );

        let req = test::TestRequest::post()
            .uri("/api/budgets")
            .insert_header(bearer(&pm))
            .set_json(json!({ "name": "Obra Norte", "allocation": "1000" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let budget: Value = test::read_body_json(resp).await;
        let id = budget["id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri(&format!("/api/budgets/{id}/expenses"))
            .insert_header(bearer(&pm))
            .set_json(json!({ "concept": "Cemento", "amount": "300", "date": "2026-03-19" }))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::CREATED
        );

        // overdraft is refused and leaves the balance alone
        let req = test::TestRequest::post()
            .uri(&format!("/api/budgets/{id}/expenses"))
            .insert_header(bearer(&pm))
            .set_json(json!({ "concept": "Grúa", "amount": "800", "date": "2026-03-19" }))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );

        let req = test::TestRequest::get()
            .uri(&format!("/api/budgets/{id}/summary"))
            .insert_header(bearer(&pm))
            .to_request();
        let summary: Value = test::call_and_read_body_json(&app, req).await;
        let remaining: Decimal = summary["remaining"].as_str().unwrap().parse().unwrap();
        assert_eq!(remaining, Decimal::from(700));
    }

    #[actix_web::test]
    async fn workers_mark_only_their_own_attendance() {
        let state = state_with(&[("obrero", Role::Worker), ("jefe", Role::SiteManager)]).await;
        let app = app!(state);
        let worker = login!(app, "obrero");
        let jefe_id = state.users.list().await.unwrap()
            .into_iter()
            .find(|user| user.username == "jefe")
            .unwrap()
            .id;

        let req = test::TestRequest::post()
            .uri("/api/attendance/entry")
            .insert_header(bearer(&worker))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["recorded"], true);

        // a second entry the same day is not recorded
        let req = test::TestRequest::post()
            .uri("/api/attendance/entry")
            .insert_header(bearer(&worker))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["recorded"], false);

        let req = test::TestRequest::post()
            .uri("/api/attendance/entry")
            .insert_header(bearer(&worker))
            .set_json(json!({ "employee_id": jefe_id }))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::FORBIDDEN
        );

        let req = test::TestRequest::get()
            .uri("/api/attendance/me")
            .insert_header(bearer(&worker))
            .to_request();
        let records: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(records.as_array().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn site_manager_reads_the_day_sheet() {
        let state = state_with(&[("obrero", Role::Worker), ("jefe", Role::SiteManager)]).await;
        let app = app!(state);
        let worker = login!(app, "obrero");
        let jefe = login!(app, "jefe");

        let req = test::TestRequest::post()
            .uri("/api/attendance/entry")
            .insert_header(bearer(&worker))
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::get()
            .uri("/api/attendance/day?date=2026-03-20")
            .insert_header(bearer(&jefe))
            .to_request();
        let sheet: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(sheet["stats"]["present"], 1);
        assert_eq!(sheet["stats"]["completed"], 0);
        let statuses: Vec<&str> = sheet["rows"]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["status"].as_str().unwrap())
            .collect();
        assert!(statuses.contains(&"En trabajo"));
        assert!(statuses.contains(&"Ausente"));
    }

    #[actix_web::test]
    async fn task_filters_and_terminal_status() {
        let state = state_with(&[("jefe", Role::SiteManager)]).await;
        let app = app!(state);
        let jefe = login!(app, "jefe");

        for (title, priority) in [("Encofrado", "alta"), ("Limpieza", "baja")] {
            let req = test::TestRequest::post()
                .uri("/api/tasks")
                .insert_header(bearer(&jefe))
                .set_json(json!({ "title": title, "priority": priority }))
                .to_request();
            assert_eq!(
                test::call_service(&app, req).await.status(),
                StatusCode::CREATED
            );
        }

        let req = test::TestRequest::get()
            .uri("/api/tasks?priority=alta")
            .insert_header(bearer(&jefe))
            .to_request();
        let tasks: Value = test::call_and_read_body_json(&app, req).await;
        let tasks = tasks.as_array().unwrap();
        assert_eq!(tasks.len(), 1);
        let id = tasks[0]["id"].as_i64().unwrap();

        let req = test::TestRequest::put()
            .uri(&format!("/api/tasks/{id}"))
            .insert_header(bearer(&jefe))
            .set_json(json!({ "status": "cancelada" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::put()
            .uri(&format!("/api/tasks/{id}"))
            .insert_header(bearer(&jefe))
            .set_json(json!({ "status": "en_progreso" }))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );

        let req = test::TestRequest::get()
            .uri(&format!("/api/tasks/{id}/history"))
            .insert_header(bearer(&jefe))
            .to_request();
        let history: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(history.as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn cascades_reach_the_cached_lists() {
        let state = state_with(&[("root", Role::SuperAdmin)]).await;
        let app = app!(state);
        let root = login!(app, "root");

        let req = test::TestRequest::post()
            .uri("/api/budgets")
            .insert_header(bearer(&root))
            .set_json(json!({ "name": "Obra Sur", "allocation": "5000" }))
            .to_request();
        let budget: Value = test::call_and_read_body_json(&app, req).await;
        let budget_id = budget["id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri("/api/projects")
            .insert_header(bearer(&root))
            .set_json(json!({ "name": "Nave industrial", "budget_id": budget_id }))
            .to_request();
        let project: Value = test::call_and_read_body_json(&app, req).await;
        let project_id = project["id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri("/api/inventory")
            .insert_header(bearer(&root))
            .set_json(json!({
                "name": "Cemento",
                "quantity": "40",
                "unit": "sacos",
                "project_id": project_id
            }))
            .to_request();
        let item: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(item["project_id"], project_id);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/budgets/{budget_id}"))
            .insert_header(bearer(&root))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NO_CONTENT
        );

        let req = test::TestRequest::get()
            .uri("/api/projects")
            .insert_header(bearer(&root))
            .to_request();
        let projects: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(projects[0]["id"], project_id);
        assert!(projects[0]["budget_id"].is_null());

        let req = test::TestRequest::delete()
            .uri(&format!("/api/projects/{project_id}"))
            .insert_header(bearer(&root))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NO_CONTENT
        );

        let req = test::TestRequest::get()
            .uri("/api/inventory")
            .insert_header(bearer(&root))
            .to_request();
        let items: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(items.as_array().unwrap().len(), 1);
        assert!(items[0]["project_id"].is_null());
    }

    #[actix_web::test]
    async fn worker_dashboard_is_empty() {
        let state = state_with(&[("obrero", Role::Worker)]).await;
        let app = app!(state);
        let worker = login!(app, "obrero");

        let req = test::TestRequest::get()
            .uri("/api/dashboard")
            .insert_header(bearer(&worker))
            .to_request();
        let cards: Value = test::call_and_read_body_json(&app, req).await;
        assert!(cards.as_array().unwrap().is_empty());
    }
}
