use serde_json::{Map, Value};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::models::Visit;

pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    id: &str,
    order_id: &str,
    data: &Map<String, Value>,
) -> Result<Visit, sqlx::Error> {
    sqlx::query_as::<_, Visit>(
        "INSERT INTO visits (id, order_id, data) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(id)
    .bind(order_id)
    .bind(Json(data))
    .fetch_one(executor)
    .await
}

/// Direct lookup through the visit primary key; no scan over orders.
pub async fn find_by_id<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    id: &str,
) -> Result<Option<Visit>, sqlx::Error> {
    sqlx::query_as::<_, Visit>("SELECT * FROM visits WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn list_by_order(pool: &PgPool, order_id: &str) -> Result<Vec<Visit>, sqlx::Error> {
    sqlx::query_as::<_, Visit>(
        "SELECT * FROM visits WHERE order_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await
}

/// Compare-and-swap write. Returns `None` when the stored version moved on
/// since `expected_version` was read.
pub async fn update_if_version<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    id: &str,
    expected_version: i64,
    data: &Map<String, Value>,
) -> Result<Option<Visit>, sqlx::Error> {
    sqlx::query_as::<_, Visit>(
        "UPDATE visits SET data = $3, version = version + 1, updated_at = now()
         WHERE id = $1 AND version = $2 RETURNING *",
    )
    .bind(id)
    .bind(expected_version)
    .bind(Json(data))
    .fetch_optional(executor)
    .await
}
