use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_ENTITY_TYPE: &str = "visit";

/// One immutable row of the audit trail.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub visit_id: String,
    pub order_id: Option<String>,
    #[sqlx(rename = "logged_at")]
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub user_name: Option<String>,
    #[sqlx(try_from = "String")]
    pub action: AuditAction,
    pub entity_type: String,
    #[sqlx(json)]
    pub changes: Vec<FieldChange>,
    pub reason: Option<String>,
    #[sqlx(json)]
    pub metadata: AuditMetadata,
}

/// A single field's before/after pair. An absent value and `null` mean the same thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<serde_json::Value>,
    pub display_name: String,
}

impl FieldChange {
    /// The same change seen from the other side: old and new swapped.
    pub fn inverse(&self) -> FieldChange {
        FieldChange {
            field: self.field.clone(),
            old_value: self.new_value.clone(),
            new_value: self.old_value.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Request provenance. Always stamped server-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditMetadata {
    pub ip: String,
    pub user_agent: String,
    pub source: String,
    /// Authenticated caller, which can differ from the entry's `userId`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_log_id: Option<Uuid>,
}

/// Open set of audit actions; unknown strings are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuditAction {
    Create,
    Update,
    StatusChange,
    Reschedule,
    Rollback,
    Other(String),
}

impl AuditAction {
    pub fn as_str(&self) -> &str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::StatusChange => "status_change",
            AuditAction::Reschedule => "reschedule",
            AuditAction::Rollback => "rollback",
            AuditAction::Other(s) => s,
        }
    }
}

impl From<String> for AuditAction {
    fn from(s: String) -> Self {
        match s.as_str() {
            "create" => AuditAction::Create,
            "update" => AuditAction::Update,
            "status_change" => AuditAction::StatusChange,
            "reschedule" => AuditAction::Reschedule,
            "rollback" => AuditAction::Rollback,
            _ => AuditAction::Other(s),
        }
    }
}

impl From<&str> for AuditAction {
    fn from(s: &str) -> Self {
        AuditAction::from(s.to_string())
    }
}

impl From<AuditAction> for String {
    fn from(action: AuditAction) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_actions_parse_to_variants() {
        assert_eq!(AuditAction::from("status_change"), AuditAction::StatusChange);
        assert_eq!(AuditAction::from("rollback"), AuditAction::Rollback);
    }

    #[test]
    fn unknown_action_is_preserved() {
        let action = AuditAction::from("technician_assigned");
        assert_eq!(action, AuditAction::Other("technician_assigned".to_string()));
        assert_eq!(action.as_str(), "technician_assigned");
    }

    #[test]
    fn field_change_serializes_camel_case_and_skips_absent_values() {
        let change = FieldChange {
            field: "notes".to_string(),
            old_value: None,
            new_value: Some(serde_json::json!("bring spare pump")),
            display_name: "Notes".to_string(),
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "field": "notes",
                "newValue": "bring spare pump",
                "displayName": "Notes"
            })
        );
    }
}
