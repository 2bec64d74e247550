use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use crate::auth::extractor::AuthUser;
use crate::auth::password::{self, MIN_PASSWORD_LEN};
use crate::db;
use crate::error::AppError;
use crate::models::User;
use crate::models::user::{ROLE_ADMIN, ROLE_TECHNICIAN};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: String,
}

pub async fn list(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<User>>, AppError> {
    auth.require_admin()?;
    let users = db::users::list_all(&state.pool).await?;
    Ok(Json(users))
}

pub async fn create(
    auth: AuthUser,
    State(state): State<SharedState>,
    Json(req): Json<CreateUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    auth.require_admin()?;

    if req.email.trim().is_empty() {
        return Err(AppError::missing("email"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    if req.role != ROLE_ADMIN && req.role != ROLE_TECHNICIAN {
        return Err(AppError::validation(
            "role",
            format!("Role must be '{ROLE_ADMIN}' or '{ROLE_TECHNICIAN}'"),
        ));
    }

    let pw_hash = password::hash(&req.password).map_err(AppError::Internal)?;

    let user = db::users::create(&state.pool, &req.email, &pw_hash, &req.name, &req.role)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("A user with this email already exists".to_string())
            }
            _ => AppError::Storage(e),
        })?;

    tracing::info!(user_id = %user.id, role = %user.role, created_by = %auth.user_id, "User created");

    Ok((StatusCode::CREATED, Json(user)))
}
