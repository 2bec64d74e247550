pub mod audit_log;
pub mod order;
pub mod user;
pub mod visit;

pub use audit_log::{AuditAction, AuditLogEntry, AuditMetadata, FieldChange};
pub use order::Order;
pub use user::User;
pub use visit::Visit;
