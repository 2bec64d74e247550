pub mod audit_log;
pub mod orders;
pub mod users;
pub mod visits;
