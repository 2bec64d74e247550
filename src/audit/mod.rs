//! Audit trail for visits: field diffs, the append-only log, and
//! compensating rollbacks.

pub mod diff;
pub mod mappings;
pub mod metadata;
pub mod recorder;
pub mod rollback;
pub mod writer;

pub use mappings::FieldMappings;
pub use metadata::{RequestMeta, Source};
