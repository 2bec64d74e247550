pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::audit::FieldMappings;
use crate::config::Config;
use crate::rate_limit::LoginRateLimiter;
use crate::state::{AppState, SharedState};

const MAX_BODY_SIZE: usize = 1024 * 1024;

pub fn build_app(pool: PgPool, config: Config, mappings: FieldMappings) -> Router {
    let state: SharedState = Arc::new(AppState {
        pool,
        config,
        mappings,
        login_limiter: LoginRateLimiter::new(),
    });

    Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
                .layer(SetResponseHeaderLayer::overriding(
                    HeaderName::from_static("x-content-type-options"),
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    HeaderName::from_static("cache-control"),
                    HeaderValue::from_static("no-store"),
                )),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
