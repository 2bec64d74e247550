use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::auth::jwt::{Claims, encode_token};
use crate::auth::password::{self, MIN_PASSWORD_LEN};
use crate::db;
use crate::error::AppError;
use crate::models::User;
use crate::models::user::ROLE_ADMIN;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub user: User,
}

fn issue(user: User, secret: &str) -> Result<AuthResponse, AppError> {
    let claims = Claims::new(user.id, user.name.clone(), user.role.clone());
    let access_token = encode_token(&claims, secret).map_err(AppError::Internal)?;
    Ok(AuthResponse { access_token, user })
}

/// Bootstrap the first admin. Closed once any user exists.
pub async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    if req.email.trim().is_empty() {
        return Err(AppError::missing("email"));
    }
    if req.name.trim().is_empty() {
        return Err(AppError::missing("name"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }

    let pw_hash = password::hash(&req.password).map_err(AppError::Internal)?;

    // Advisory lock prevents concurrent bootstrap registrations
    let mut tx = state.pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock(1)")
        .execute(&mut *tx)
        .await?;

    if db::users::count_all(&mut *tx).await? > 0 {
        return Err(AppError::PermissionDenied(
            "Registration is disabled. Ask an administrator for an account.".to_string(),
        ));
    }

    let user = db::users::create(&mut *tx, &req.email, &pw_hash, &req.name, ROLE_ADMIN).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, "Bootstrap administrator registered");

    Ok(Json(issue(user, &state.config.jwt_secret)?))
}

pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    if state.login_limiter.check(&req.email).is_err() {
        return Err(AppError::RateLimited(
            "Too many login attempts. Please try again later.".to_string(),
        ));
    }

    let user = db::users::find_by_email(&state.pool, &req.email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

    let valid = password::verify(&req.password, &user.password_hash).map_err(AppError::Internal)?;
    if !valid {
        state.login_limiter.record_failure(&req.email);
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }
    state.login_limiter.clear(&req.email);

    Ok(Json(issue(user, &state.config.jwt_secret)?))
}
