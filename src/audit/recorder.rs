use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::audit::diff::{self, Snapshot};
use crate::audit::mappings::{DisplayNames, FieldMappings};
use crate::db;
use crate::error::AppError;
use crate::models::audit_log::DEFAULT_ENTITY_TYPE;
use crate::models::{AuditAction, AuditLogEntry, AuditMetadata, FieldChange};

/// Append payload as received from a caller. Every field is optional so that
/// missing values surface as validation errors naming the field.
///
/// Provenance (`id`, `timestamp`, `metadata`) has no field here; such keys in
/// the body are dropped and the server stamps its own.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRequest {
    pub visit_id: Option<String>,
    pub order_id: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub action: Option<String>,
    #[serde(alias = "entityType")]
    pub entity: Option<String>,
    #[serde(default)]
    pub changes: Vec<ChangeInput>,
    pub reason: Option<String>,
    pub old_state: Option<Value>,
    pub new_state: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeInput {
    pub field: Option<String>,
    #[serde(default)]
    pub old_value: Option<Value>,
    #[serde(default)]
    pub new_value: Option<Value>,
    pub display_name: Option<String>,
}

/// A validated mutation, ready to be stamped and appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub visit_id: String,
    pub order_id: Option<String>,
    pub user_id: String,
    pub user_name: Option<String>,
    pub action: AuditAction,
    pub entity_type: String,
    pub changes: Vec<FieldChange>,
    pub reason: Option<String>,
}

impl Mutation {
    pub fn into_entry(self, metadata: AuditMetadata) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::now_v7(),
            visit_id: self.visit_id,
            order_id: self.order_id,
            timestamp: Utc::now(),
            user_id: self.user_id,
            user_name: self.user_name,
            action: self.action,
            entity_type: self.entity_type,
            changes: self.changes,
            reason: self.reason,
            metadata,
        }
    }
}

impl RecordRequest {
    pub fn validate(self, mappings: &FieldMappings) -> Result<Mutation, AppError> {
        let visit_id = required(self.visit_id, "visitId")?;
        let user_id = required(self.user_id, "userId")?;
        let action = required(self.action, "action")?;
        let entity_type =
            non_blank(self.entity).unwrap_or_else(|| DEFAULT_ENTITY_TYPE.to_string());
        let names = mappings.for_entity(&entity_type);

        let changes = if !self.changes.is_empty() {
            explicit_changes(self.changes, names)?
        } else if let (Some(old), Some(new)) = (self.old_state, self.new_state) {
            let old = as_snapshot(old, "oldState")?;
            let new = as_snapshot(new, "newState")?;
            let mut changes = diff::compute_diff(Some(&old), Some(&new), names);
            changes.retain(|change| diff::is_writable(&change.field));
            changes
        } else {
            Vec::new()
        };

        Ok(Mutation {
            visit_id,
            order_id: non_blank(self.order_id),
            user_id,
            user_name: non_blank(self.user_name),
            action: AuditAction::from(action),
            entity_type,
            changes,
            reason: non_blank(self.reason),
        })
    }
}

/// Stamp and append a mutation. Runs on whatever executor the caller holds so
/// it can share a transaction with the entity write.
pub async fn record<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    mutation: Mutation,
    metadata: AuditMetadata,
) -> Result<AuditLogEntry, AppError> {
    let entry = mutation.into_entry(metadata);
    let stored = db::audit_log::insert(executor, &entry).await?;
    tracing::debug!(
        log_id = %stored.id,
        visit_id = %stored.visit_id,
        action = %stored.action,
        changes = stored.changes.len(),
        "Audit entry appended"
    );
    Ok(stored)
}

fn explicit_changes(
    inputs: Vec<ChangeInput>,
    names: DisplayNames<'_>,
) -> Result<Vec<FieldChange>, AppError> {
    inputs
        .into_iter()
        .enumerate()
        .map(|(i, input)| {
            let field = input
                .field
                .filter(|f| !f.trim().is_empty())
                .ok_or_else(|| AppError::missing(&format!("changes[{i}].field")))?;
            if !diff::is_writable(&field) {
                return Err(AppError::validation(
                    format!("changes[{i}].field"),
                    format!("'{field}' is managed by the store and cannot be audited as a change"),
                ));
            }
            let old_value = input.old_value.filter(|v| !v.is_null());
            let new_value = input.new_value.filter(|v| !v.is_null());
            if old_value.is_none() && new_value.is_none() {
                return Err(AppError::validation(
                    format!("changes[{i}]"),
                    format!("Change of '{field}' has neither oldValue nor newValue"),
                ));
            }
            let display_name = non_blank(input.display_name).unwrap_or_else(|| names.resolve(&field));
            Ok(FieldChange {
                field,
                old_value,
                new_value,
                display_name,
            })
        })
        .collect()
}

fn as_snapshot(value: Value, field: &str) -> Result<Snapshot, AppError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::validation(field, format!("{field} must be an object"))),
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    non_blank(value).ok_or_else(|| AppError::missing(field))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
