use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::AuditLogEntry;

/// Conjunctive filter; `None` means "any".
#[derive(Debug, Default, Clone)]
pub struct LogFilter {
    pub visit_id: Option<String>,
    pub order_id: Option<String>,
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

const FILTER_CLAUSE: &str = "($1::text IS NULL OR visit_id = $1)
       AND ($2::text IS NULL OR order_id = $2)
       AND ($3::text IS NULL OR user_id = $3)
       AND ($4::text IS NULL OR action = $4)
       AND ($5::timestamptz IS NULL OR logged_at >= $5)
       AND ($6::timestamptz IS NULL OR logged_at <= $6)";

/// Single-statement append; the table rejects UPDATE and DELETE.
pub async fn insert<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    entry: &AuditLogEntry,
) -> Result<AuditLogEntry, sqlx::Error> {
    sqlx::query_as::<_, AuditLogEntry>(
        "INSERT INTO audit_log
             (id, visit_id, order_id, logged_at, user_id, user_name, action,
              entity_type, changes, reason, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING *",
    )
    .bind(entry.id)
    .bind(&entry.visit_id)
    .bind(&entry.order_id)
    .bind(entry.timestamp)
    .bind(&entry.user_id)
    .bind(&entry.user_name)
    .bind(entry.action.as_str())
    .bind(&entry.entity_type)
    .bind(Json(&entry.changes))
    .bind(&entry.reason)
    .bind(Json(&entry.metadata))
    .fetch_one(executor)
    .await
}

pub async fn find_by_id<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<AuditLogEntry>, sqlx::Error> {
    sqlx::query_as::<_, AuditLogEntry>("SELECT * FROM audit_log WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Newest first; entries stamped in the same instant fall back to append order.
pub async fn list<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    filter: &LogFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<AuditLogEntry>, sqlx::Error> {
    sqlx::query_as::<_, AuditLogEntry>(&format!(
        "SELECT * FROM audit_log WHERE {FILTER_CLAUSE}
         ORDER BY logged_at DESC, seq DESC LIMIT $7 OFFSET $8"
    ))
    .bind(&filter.visit_id)
    .bind(&filter.order_id)
    .bind(&filter.user_id)
    .bind(&filter.action)
    .bind(filter.date_from)
    .bind(filter.date_to)
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await
}

pub async fn count<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    filter: &LogFilter,
) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM audit_log WHERE {FILTER_CLAUSE}"
    ))
    .bind(&filter.visit_id)
    .bind(&filter.order_id)
    .bind(&filter.user_id)
    .bind(&filter.action)
    .bind(filter.date_from)
    .bind(filter.date_to)
    .fetch_one(executor)
    .await?;
    Ok(row.0)
}

/// One page plus the full match count, read from the same snapshot so that
/// concurrent appends cannot make them disagree.
pub async fn page(
    pool: &PgPool,
    filter: &LogFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<AuditLogEntry>, i64), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
        .execute(&mut *tx)
        .await?;

    let logs = list(&mut *tx, filter, limit, offset).await?;
    let total = count(&mut *tx, filter).await?;
    tx.commit().await?;

    Ok((logs, total))
}
