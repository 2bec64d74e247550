use std::sync::Arc;

use sqlx::PgPool;

use crate::audit::FieldMappings;
use crate::config::Config;
use crate::rate_limit::LoginRateLimiter;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub mappings: FieldMappings,
    pub login_limiter: LoginRateLimiter,
}
