use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::diff::{self, Snapshot};
use crate::audit::metadata::{RequestMeta, Source};
use crate::audit::recorder::Mutation;
use crate::audit::writer::{self, PlannedWrite, WriteOutcome};
use crate::db;
use crate::error::AppError;
use crate::models::audit_log::DEFAULT_ENTITY_TYPE;
use crate::models::{AuditAction, AuditLogEntry, FieldChange, Visit};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRequest {
    pub log_id: Option<String>,
    pub visit_id: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    pub visit: Visit,
    pub rollback_log: AuditLogEntry,
}

pub fn default_reason(log_id: Uuid) -> String {
    format!("Rollback of change {log_id}")
}

/// Changes of `target` that may be applied to stored visit data. Entries
/// written before store-managed fields were refused can still carry them.
fn revertible(target: &AuditLogEntry) -> Vec<FieldChange> {
    target
        .changes
        .iter()
        .filter(|change| diff::is_writable(&change.field))
        .cloned()
        .collect()
}

/// Revert the fields touched by `target` on `data`. Fields the entry did not
/// touch are left alone; fields changed again later are overwritten.
pub fn revert_fields(data: &Snapshot, target: &AuditLogEntry) -> Snapshot {
    let mut reverted = data.clone();
    diff::apply_old_values(&mut reverted, &revertible(target));
    reverted
}

/// The compensating entry for `target`: same fields, values swapped.
pub fn compensating_mutation(
    target: &AuditLogEntry,
    visit: &Visit,
    user_id: String,
    user_name: Option<String>,
    reason: String,
) -> Mutation {
    Mutation {
        visit_id: visit.id.clone(),
        order_id: Some(visit.order_id.clone()),
        user_id,
        user_name,
        action: AuditAction::Rollback,
        entity_type: target.entity_type.clone(),
        changes: diff::invert(&revertible(target)),
        reason: Some(reason),
    }
}

fn check_target(target: &AuditLogEntry, visit_id: &str) -> Result<(), AppError> {
    if target.visit_id != visit_id {
        return Err(AppError::validation(
            "visitId",
            format!("Audit log entry {} belongs to visit {}", target.id, target.visit_id),
        ));
    }
    if target.entity_type != DEFAULT_ENTITY_TYPE {
        return Err(AppError::validation(
            "logId",
            format!("Entries of type '{}' cannot be rolled back", target.entity_type),
        ));
    }
    if revertible(target).is_empty() {
        return Err(AppError::validation(
            "logId",
            format!("Audit log entry {} has no field changes to roll back", target.id),
        ));
    }
    Ok(())
}

pub async fn rollback(
    pool: &PgPool,
    req: RollbackRequest,
    meta: &RequestMeta,
    actor_id: String,
    max_attempts: u32,
) -> Result<RollbackOutcome, AppError> {
    let log_id = req
        .log_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::missing("logId"))?;
    let log_id: Uuid = log_id
        .trim()
        .parse()
        .map_err(|_| AppError::validation("logId", format!("'{log_id}' is not a valid log id")))?;
    let visit_id = req
        .visit_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::missing("visitId"))?;
    let user_id = req
        .user_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::missing("userId"))?;
    let user_name = req.user_name.filter(|s| !s.trim().is_empty());
    let reason = req
        .reason
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default_reason(log_id));

    let target = db::audit_log::find_by_id(pool, log_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Audit log entry {log_id} not found")))?;
    check_target(&target, &visit_id)?;

    let outcome = writer::write_visit(pool, &visit_id, max_attempts, |visit| {
        let mut metadata = meta.stamp(Source::Rollback, actor_id.clone());
        metadata.rolled_back_log_id = Some(log_id);
        Ok(Some(PlannedWrite {
            data: revert_fields(&visit.data, &target),
            mutation: compensating_mutation(
                &target,
                visit,
                user_id.clone(),
                user_name.clone(),
                reason.clone(),
            ),
            metadata,
        }))
    })
    .await?;

    match outcome {
        WriteOutcome::Written { visit, entry } => {
            tracing::info!(
                visit_id = %visit.id,
                rolled_back = %log_id,
                rollback_log = %entry.id,
                fields = entry.changes.len(),
                "Visit rolled back"
            );
            Ok(RollbackOutcome {
                visit,
                rollback_log: entry,
            })
        }
        WriteOutcome::Unchanged(_) => Err(AppError::Internal(format!(
            "Rollback of {log_id} produced no write"
        ))),
    }
}
