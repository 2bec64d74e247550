use std::collections::HashMap;
use std::path::Path;

/// Field → display-name tables, one per entity type.
#[derive(Debug, Clone, Default)]
pub struct FieldMappings {
    tables: HashMap<String, HashMap<String, String>>,
}

/// The display-name table of a single entity type.
#[derive(Debug, Clone, Copy)]
pub struct DisplayNames<'a> {
    table: Option<&'a HashMap<String, String>>,
}

impl DisplayNames<'_> {
    /// Names nothing; every field displays as its raw key.
    pub const RAW: DisplayNames<'static> = DisplayNames { table: None };

    pub fn resolve(&self, field: &str) -> String {
        self.table
            .and_then(|t| t.get(field))
            .cloned()
            .unwrap_or_else(|| field.to_string())
    }
}

const VISIT_FIELDS: &[(&str, &str)] = &[
    ("status", "Status"),
    ("scheduledDate", "Scheduled date"),
    ("scheduledTime", "Scheduled time"),
    ("technicianId", "Technician"),
    ("technicianName", "Technician name"),
    ("type", "Visit type"),
    ("priority", "Priority"),
    ("notes", "Notes"),
    ("technicianNotes", "Technician notes"),
    ("costs", "Costs"),
    ("partsCost", "Parts cost"),
    ("laborCost", "Labor cost"),
    ("totalCost", "Total cost"),
    ("completedAt", "Completed at"),
    ("cancelledAt", "Cancelled at"),
    ("duration", "Duration"),
];

const ORDER_FIELDS: &[(&str, &str)] = &[
    ("status", "Status"),
    ("clientName", "Client name"),
    ("clientPhone", "Client phone"),
    ("clientEmail", "Client email"),
    ("address", "Address"),
    ("deviceType", "Device type"),
    ("brand", "Brand"),
    ("model", "Model"),
    ("description", "Problem description"),
    ("priority", "Priority"),
];

impl FieldMappings {
    /// Built-in tables for `visit` and `order`.
    pub fn with_defaults() -> Self {
        let mut mappings = FieldMappings::default();
        mappings.extend("visit", VISIT_FIELDS.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        mappings.extend("order", ORDER_FIELDS.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        mappings
    }

    /// Defaults overlaid with a JSON file of the form
    /// `{"visit": {"status": "Visit status"}, "order": {...}}`.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let mut mappings = FieldMappings::with_defaults();
        let Some(path) = path else {
            return Ok(mappings);
        };

        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read field mappings {}: {e}", path.display()))?;
        let overrides: HashMap<String, HashMap<String, String>> = serde_json::from_str(&raw)
            .map_err(|e| format!("Invalid field mappings {}: {e}", path.display()))?;

        for (entity_type, table) in overrides {
            mappings.extend(&entity_type, table);
        }
        Ok(mappings)
    }

    pub fn extend(
        &mut self,
        entity_type: &str,
        entries: impl IntoIterator<Item = (String, String)>,
    ) {
        self.tables
            .entry(entity_type.to_string())
            .or_default()
            .extend(entries);
    }

    pub fn for_entity(&self, entity_type: &str) -> DisplayNames<'_> {
        DisplayNames {
            table: self.tables.get(entity_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_visit_field() {
        let mappings = FieldMappings::with_defaults();
        assert_eq!(mappings.for_entity("visit").resolve("status"), "Status");
    }

    #[test]
    fn falls_back_to_raw_key() {
        let mappings = FieldMappings::with_defaults();
        assert_eq!(mappings.for_entity("visit").resolve("warrantyId"), "warrantyId");
        assert_eq!(mappings.for_entity("invoice").resolve("status"), "status");
    }

    #[test]
    fn overrides_replace_defaults_only_for_their_keys() {
        let mut mappings = FieldMappings::with_defaults();
        mappings.extend("visit", [("status".to_string(), "Visit status".to_string())]);

        let names = mappings.for_entity("visit");
        assert_eq!(names.resolve("status"), "Visit status");
        assert_eq!(names.resolve("priority"), "Priority");
    }

    #[test]
    fn load_without_path_gives_defaults() {
        let mappings = FieldMappings::load(None).unwrap();
        assert_eq!(mappings.for_entity("order").resolve("brand"), "Brand");
    }
}
