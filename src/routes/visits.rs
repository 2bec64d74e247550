use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::audit::diff;
use crate::audit::recorder::{self, Mutation};
use crate::audit::writer::{self, PlannedWrite, WriteOutcome};
use crate::audit::{FieldMappings, RequestMeta, Source};
use crate::auth::extractor::AuthUser;
use crate::db;
use crate::error::AppError;
use crate::models::audit_log::DEFAULT_ENTITY_TYPE;
use crate::models::{AuditAction, AuditLogEntry, Visit};
use crate::routes::audit_log::{self, LogPage, LogQuery};
use crate::state::SharedState;

const MAX_ID_LEN: usize = 64;
const DEFAULT_STATUS: &str = "scheduled";

#[derive(Debug, Deserialize)]
pub struct NewVisit {
    pub id: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVisit {
    #[serde(default)]
    pub fields: Map<String, Value>,
    pub action: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub visit: Visit,
    pub log: Option<AuditLogEntry>,
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Client-chosen id, or a fresh UUIDv7.
pub(crate) fn entity_id(id: Option<String>, field: &str) -> Result<String, AppError> {
    let Some(id) = id else {
        return Ok(Uuid::now_v7().to_string());
    };
    let id = id.trim();
    if id.is_empty() || id.len() > MAX_ID_LEN || id.chars().any(char::is_whitespace) {
        return Err(AppError::validation(
            field,
            format!("{field} must be 1-{MAX_ID_LEN} characters without whitespace"),
        ));
    }
    Ok(id.to_string())
}

fn check_fields(fields: &Map<String, Value>) -> Result<(), AppError> {
    match fields.keys().find(|k| !diff::is_writable(k)) {
        Some(key) => Err(AppError::validation(
            key.clone(),
            format!("'{key}' is managed by the store and cannot be set"),
        )),
        None => Ok(()),
    }
}

/// Create a visit and its `create` audit entry on the caller's transaction.
pub(crate) async fn insert_visit(
    conn: &mut PgConnection,
    order_id: &str,
    new: NewVisit,
    auth: &AuthUser,
    meta: &RequestMeta,
    source: Source,
    mappings: &FieldMappings,
) -> Result<Visit, AppError> {
    let id = entity_id(new.id, "id")?;
    check_fields(&new.fields)?;

    let mut data: Map<String, Value> = new
        .fields
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .collect();
    data.entry("status")
        .or_insert_with(|| Value::String(DEFAULT_STATUS.to_string()));

    let visit = db::visits::create(&mut *conn, &id, order_id, &data)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(format!("Visit {id} already exists"))
            }
            _ => AppError::Storage(e),
        })?;

    let mutation = Mutation {
        visit_id: visit.id.clone(),
        order_id: Some(visit.order_id.clone()),
        user_id: auth.actor_id(),
        user_name: Some(auth.name.clone()),
        action: AuditAction::Create,
        entity_type: DEFAULT_ENTITY_TYPE.to_string(),
        changes: diff::compute_diff(None, Some(&visit.data), mappings.for_entity(DEFAULT_ENTITY_TYPE)),
        reason: None,
    };
    recorder::record(&mut *conn, mutation, meta.stamp(source, auth.actor_id())).await?;

    Ok(visit)
}

pub async fn schedule(
    auth: AuthUser,
    meta: RequestMeta,
    State(state): State<SharedState>,
    Path(order_id): Path<String>,
    Json(req): Json<NewVisit>,
) -> Result<(StatusCode, Json<Visit>), AppError> {
    let mut tx = state.pool.begin().await?;

    db::orders::find_by_id(&mut *tx, &order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;

    let visit = insert_visit(
        &mut tx,
        &order_id,
        req,
        &auth,
        &meta,
        Source::VisitSchedule,
        &state.mappings,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(visit_id = %visit.id, order_id = %order_id, "Visit scheduled");
    Ok((StatusCode::CREATED, Json(visit)))
}

pub async fn get(
    _auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Visit>, AppError> {
    let visit = db::visits::find_by_id(&state.pool, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Visit {id} not found")))?;
    Ok(Json(visit))
}

/// Patch visit fields; `null` removes a field. A patch that changes nothing
/// writes nothing and logs nothing.
pub async fn update(
    auth: AuthUser,
    meta: RequestMeta,
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateVisit>,
) -> Result<Json<UpdateResponse>, AppError> {
    check_fields(&req.fields)?;
    let action = req
        .action
        .filter(|a| !a.trim().is_empty())
        .map(AuditAction::from)
        .unwrap_or(AuditAction::Update);
    if action == AuditAction::Rollback {
        return Err(AppError::validation(
            "action",
            "Rollbacks go through the rollback endpoint",
        ));
    }
    let reason = req.reason.filter(|r| !r.trim().is_empty());
    let names = state.mappings.for_entity(DEFAULT_ENTITY_TYPE);

    let outcome = writer::write_visit(&state.pool, &id, state.config.max_write_attempts, |visit| {
        let mut data = visit.data.clone();
        for (key, value) in &req.fields {
            if value.is_null() {
                data.remove(key);
            } else {
                data.insert(key.clone(), value.clone());
            }
        }

        let changes = diff::compute_diff(Some(&visit.data), Some(&data), names);
        if changes.is_empty() {
            return Ok(None);
        }

        Ok(Some(PlannedWrite {
            data,
            mutation: Mutation {
                visit_id: visit.id.clone(),
                order_id: Some(visit.order_id.clone()),
                user_id: auth.actor_id(),
                user_name: Some(auth.name.clone()),
                action: action.clone(),
                entity_type: DEFAULT_ENTITY_TYPE.to_string(),
                changes,
                reason: reason.clone(),
            },
            metadata: meta.stamp(Source::VisitUpdate, auth.actor_id()),
        }))
    })
    .await?;

    let response = match outcome {
        WriteOutcome::Unchanged(visit) => UpdateResponse { visit, log: None },
        WriteOutcome::Written { visit, entry } => UpdateResponse {
            visit,
            log: Some(entry),
        },
    };
    Ok(Json(response))
}

pub async fn history(
    _auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<LogPage>, AppError> {
    db::visits::find_by_id(&state.pool, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Visit {id} not found")))?;

    let query = LogQuery {
        visit_id: Some(id),
        limit: params.limit,
        offset: params.offset,
        ..LogQuery::default()
    };
    Ok(Json(audit_log::run_query(&state, query).await?))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn generated_id_when_absent() {
        let id = entity_id(None, "id").unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn rejects_blank_or_spaced_ids() {
        assert!(entity_id(Some("  ".to_string()), "id").is_err());
        assert!(entity_id(Some("V 1".to_string()), "id").is_err());
        assert_eq!(entity_id(Some(" V1 ".to_string()), "id").unwrap(), "V1");
    }

    #[test]
    fn store_keys_cannot_be_patched() {
        let fields = match json!({ "status": "completed", "version": 9 }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let err = check_fields(&fields).unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "version"));
    }

    #[test]
    fn new_visit_collects_remaining_keys_as_fields() {
        let new: NewVisit = serde_json::from_value(json!({
            "id": "V1",
            "scheduledDate": "2024-06-01",
            "technicianId": "T3"
        }))
        .unwrap();
        assert_eq!(new.id.as_deref(), Some("V1"));
        assert_eq!(new.fields.len(), 2);
    }
}
