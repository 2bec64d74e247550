use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::recorder::{self, RecordRequest};
use crate::audit::rollback::{self, RollbackOutcome, RollbackRequest};
use crate::audit::{RequestMeta, Source};
use crate::auth::extractor::AuthUser;
use crate::db;
use crate::db::audit_log::LogFilter;
use crate::error::AppError;
use crate::models::AuditLogEntry;
use crate::state::SharedState;

pub const DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    pub visit_id: Option<String>,
    pub order_id: Option<String>,
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(total: i64, limit: i64, offset: i64) -> Self {
        Pagination {
            total,
            limit,
            offset,
            has_more: offset.saturating_add(limit) < total,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogPage {
    pub logs: Vec<AuditLogEntry>,
    pub pagination: Pagination,
}

pub async fn query(
    _auth: AuthUser,
    State(state): State<SharedState>,
    Query(params): Query<LogQuery>,
) -> Result<Json<LogPage>, AppError> {
    Ok(Json(run_query(&state, params).await?))
}

pub async fn get(
    _auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AuditLogEntry>, AppError> {
    let entry = db::audit_log::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Audit log entry {id} not found")))?;
    Ok(Json(entry))
}

pub async fn append(
    auth: AuthUser,
    meta: RequestMeta,
    State(state): State<SharedState>,
    Json(req): Json<RecordRequest>,
) -> Result<(StatusCode, Json<AuditLogEntry>), AppError> {
    let mutation = req.validate(&state.mappings)?;
    let entry = recorder::record(&state.pool, mutation, meta.stamp(Source::Api, auth.actor_id())).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn rollback(
    auth: AuthUser,
    meta: RequestMeta,
    State(state): State<SharedState>,
    Json(req): Json<RollbackRequest>,
) -> Result<Json<RollbackOutcome>, AppError> {
    auth.require_admin()?;
    let outcome = rollback::rollback(
        &state.pool,
        req,
        &meta,
        auth.actor_id(),
        state.config.max_write_attempts,
    )
    .await?;
    Ok(Json(outcome))
}

pub async fn run_query(state: &SharedState, params: LogQuery) -> Result<LogPage, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if limit < 1 {
        return Err(AppError::validation("limit", "limit must be at least 1"));
    }
    let limit = limit.min(state.config.max_page_size);
    let offset = params.offset.unwrap_or(0);
    if offset < 0 {
        return Err(AppError::validation("offset", "offset must not be negative"));
    }

    let filter = LogFilter {
        visit_id: non_blank(params.visit_id),
        order_id: non_blank(params.order_id),
        user_id: non_blank(params.user_id),
        action: non_blank(params.action),
        date_from: parse_bound(params.date_from, "dateFrom", false)?,
        date_to: parse_bound(params.date_to, "dateTo", true)?,
    };

    let (logs, total) = db::audit_log::page(&state.pool, &filter, limit, offset).await?;

    Ok(LogPage {
        logs,
        pagination: Pagination::new(total, limit, offset),
    })
}

/// RFC 3339 instant, or a bare `YYYY-MM-DD` covering the whole day.
fn parse_bound(
    raw: Option<String>,
    field: &str,
    end_of_day: bool,
) -> Result<Option<DateTime<Utc>>, AppError> {
    let Some(raw) = non_blank(raw) else {
        return Ok(None);
    };
    let raw = raw.trim();

    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(instant.with_timezone(&Utc)));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        AppError::validation(field, format!("{field} must be an RFC 3339 instant or YYYY-MM-DD"))
    })?;
    let time = if end_of_day {
        date.and_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(time.map(|t| t.and_utc()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
