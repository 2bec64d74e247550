use serde_json::{Map, Value};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::models::Order;

pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    id: &str,
    data: &Map<String, Value>,
) -> Result<Order, sqlx::Error> {
    sqlx::query_as::<_, Order>("INSERT INTO orders (id, data) VALUES ($1, $2) RETURNING *")
        .bind(id)
        .bind(Json(data))
        .fetch_one(executor)
        .await
}

pub async fn find_by_id<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    id: &str,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}
