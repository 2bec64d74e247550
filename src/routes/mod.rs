pub mod audit_log;
pub mod auth;
pub mod orders;
pub mod users;
pub mod visits;

use axum::Router;
use axum::routing::{get, post};

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Auth
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        // Users
        .route("/api/v1/users", get(users::list).post(users::create))
        // Orders
        .route("/api/v1/orders", post(orders::create))
        .route("/api/v1/orders/{id}", get(orders::get))
        .route("/api/v1/orders/{id}/visits", post(visits::schedule))
        // Visits
        .route(
            "/api/v1/visits/{id}",
            get(visits::get).patch(visits::update),
        )
        .route("/api/v1/visits/{id}/history", get(visits::history))
        // Audit log
        .route(
            "/api/v1/audit-logs",
            get(audit_log::query).post(audit_log::append),
        )
        .route("/api/v1/audit-logs/rollback", post(audit_log::rollback))
        .route("/api/v1/audit-logs/{id}", get(audit_log::get))
}
