use sqlx::PgPool;

use crate::audit::diff::Snapshot;
use crate::audit::recorder::{self, Mutation};
use crate::db;
use crate::error::AppError;
use crate::models::{AuditLogEntry, AuditMetadata, Visit};

/// The new visit state together with the audit entry describing it.
#[derive(Debug)]
pub struct PlannedWrite {
    pub data: Snapshot,
    pub mutation: Mutation,
    pub metadata: AuditMetadata,
}

#[derive(Debug)]
pub enum WriteOutcome {
    Unchanged(Visit),
    Written { visit: Visit, entry: AuditLogEntry },
}

/// Read-modify-write of one visit under optimistic concurrency.
///
/// `plan` sees the current visit and returns the write to perform, or `None`
/// to leave it untouched. The visit update and the audit append commit in the
/// same transaction: if either fails, neither is visible. A version mismatch
/// drops the transaction and replays `plan` against the fresh state, up to
/// `max_attempts` times.
pub async fn write_visit<F>(
    pool: &PgPool,
    visit_id: &str,
    max_attempts: u32,
    mut plan: F,
) -> Result<WriteOutcome, AppError>
where
    F: FnMut(&Visit) -> Result<Option<PlannedWrite>, AppError>,
{
    for attempt in 1..=max_attempts {
        let mut tx = pool.begin().await?;

        let current = db::visits::find_by_id(&mut *tx, visit_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Visit {visit_id} not found")))?;

        let Some(write) = plan(&current)? else {
            return Ok(WriteOutcome::Unchanged(current));
        };

        let Some(visit) =
            db::visits::update_if_version(&mut *tx, visit_id, current.version, &write.data)
                .await?
        else {
            tracing::warn!(
                visit_id,
                attempt,
                version = current.version,
                "Visit changed underneath write, retrying"
            );
            continue;
        };

        let entry = recorder::record(&mut *tx, write.mutation, write.metadata).await?;
        tx.commit().await?;

        return Ok(WriteOutcome::Written { visit, entry });
    }

    Err(AppError::Conflict(format!(
        "Visit {visit_id} kept changing during the write, giving up after {max_attempts} attempts"
    )))
}
