//! Claim persistence

use crate::models::{Claim, ClaimStatus};
use escrutinio_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Insert a claim in `generated` state. The UNIQUE index on
/// `claim_number` is the final arbiter of number uniqueness.
pub async fn insert(
    pool: &SqlitePool,
    consolidation_id: i64,
    claim_number: &str,
    kind: &str,
    description: &str,
    issued_to: &str,
    created_by: i64,
    created_at: &str,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO claims \
         (consolidation_id, claim_number, kind, description, issued_to, created_by, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(consolidation_id)
    .bind(claim_number)
    .bind(kind)
    .bind(description)
    .bind(issued_to)
    .bind(created_by)
    .bind(created_at)
    .execute(pool)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(e) if super::reference::is_unique_violation(&e, "claim_number") => Err(
            Error::Internal(format!("claim number collision: {}", claim_number)),
        ),
        Err(e) => Err(e.into()),
    }
}

pub async fn load(pool: &SqlitePool, id: i64) -> Result<Option<Claim>> {
    let row = sqlx::query(
        "SELECT id, consolidation_id, claim_number, kind, description, issued_to, status, \
                created_by, created_at, sent_at, reviewed_at, closed_at, last_transition_by \
         FROM claims WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(from_row).transpose()
}

/// Whether a claim number is already taken (collision probe before retrying)
pub async fn number_exists(pool: &SqlitePool, claim_number: &str) -> Result<bool> {
    let row = sqlx::query("SELECT 1 AS one FROM claims WHERE claim_number = ?")
        .bind(claim_number)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Write a status transition, stamping the matching timestamp column
/// and the acting user.
pub async fn write_transition(
    pool: &SqlitePool,
    id: i64,
    new_status: ClaimStatus,
    actor: i64,
    at: &str,
) -> Result<()> {
    let stamp_column = match new_status {
        ClaimStatus::Sent => Some("sent_at"),
        ClaimStatus::UnderReview => Some("reviewed_at"),
        ClaimStatus::Resolved | ClaimStatus::Rejected => Some("closed_at"),
        ClaimStatus::Generated => None,
    };

    let sql = match stamp_column {
        Some(column) => format!(
            "UPDATE claims SET status = ?, {} = ?, last_transition_by = ?, \
             updated_at = datetime('now') WHERE id = ?",
            column
        ),
        None => "UPDATE claims SET status = ?, last_transition_by = ?, \
                 updated_at = datetime('now') WHERE id = ?"
            .to_string(),
    };

    let mut query = sqlx::query(&sql).bind(new_status.as_str());
    if stamp_column.is_some() {
        query = query.bind(at);
    }
    query.bind(actor).bind(id).execute(pool).await?;
    Ok(())
}

pub async fn list_for_consolidation(pool: &SqlitePool, consolidation_id: i64) -> Result<Vec<Claim>> {
    let rows = sqlx::query(
        "SELECT id, consolidation_id, claim_number, kind, description, issued_to, status, \
                created_by, created_at, sent_at, reviewed_at, closed_at, last_transition_by \
         FROM claims WHERE consolidation_id = ? ORDER BY created_at DESC",
    )
    .bind(consolidation_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(from_row).collect()
}

fn from_row(row: sqlx::sqlite::SqliteRow) -> Result<Claim> {
    let status_str: String = row.get("status");
    let id: i64 = row.get("id");
    let status = ClaimStatus::parse(&status_str).ok_or_else(|| {
        Error::DataIntegrityViolation(format!("claim {} has unknown status '{}'", id, status_str))
    })?;
    Ok(Claim {
        id,
        consolidation_id: row.get("consolidation_id"),
        claim_number: row.get("claim_number"),
        kind: row.get("kind"),
        description: row.get("description"),
        issued_to: row.get("issued_to"),
        status,
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        sent_at: row.get("sent_at"),
        reviewed_at: row.get("reviewed_at"),
        closed_at: row.get("closed_at"),
        last_transition_by: row.get("last_transition_by"),
    })
}
