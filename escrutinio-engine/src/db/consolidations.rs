//! Consolidation (E-24) persistence

use crate::models::{
    Consolidation, ConsolidationStatus, MunicipalStatus, VerificationStatus,
};
use escrutinio_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Find the consolidation for a (municipality, election type, process) triple
pub async fn find_by_scope(
    pool: &SqlitePool,
    municipality_id: i64,
    election_type_id: i64,
    electoral_process_id: i64,
) -> Result<Option<Consolidation>> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM consolidations \
         WHERE municipality_id = ? AND election_type_id = ? AND electoral_process_id = ?"
    ))
    .bind(municipality_id)
    .bind(election_type_id)
    .bind(electoral_process_id)
    .fetch_optional(pool)
    .await?;
    row.map(from_row).transpose()
}

pub async fn load(pool: &SqlitePool, id: i64) -> Result<Option<Consolidation>> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM consolidations WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(from_row).transpose()
}

pub async fn insert(
    pool: &SqlitePool,
    municipality_id: i64,
    election_type_id: i64,
    electoral_process_id: i64,
    total_tables_expected: i64,
    started_by: i64,
    started_at: &str,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO consolidations \
         (municipality_id, election_type_id, electoral_process_id, total_tables_expected, \
          status, started_by, started_at) \
         VALUES (?, ?, ?, ?, 'consolidating', ?, ?)",
    )
    .bind(municipality_id)
    .bind(election_type_id)
    .bind(electoral_process_id)
    .bind(total_tables_expected)
    .bind(started_by)
    .bind(started_at)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Reactivate an existing consolidation for a new run series
pub async fn mark_consolidating(pool: &SqlitePool, id: i64, started_by: i64) -> Result<()> {
    sqlx::query(
        "UPDATE consolidations SET status = 'consolidating', started_by = ?, \
         updated_at = datetime('now') WHERE id = ?",
    )
    .bind(started_by)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Recomputed totals written by a consolidation run
#[derive(Debug, Clone, Copy)]
pub struct Totals {
    pub tables_processed: i64,
    pub total_valid_votes: i64,
    pub total_blank_votes: i64,
    pub total_null_votes: i64,
    pub total_unmarked: i64,
    pub total_ballots: i64,
}

/// Write the recomputed totals and derived status in one statement;
/// called inside the run transaction.
pub async fn write_totals<'e, E>(
    executor: E,
    id: i64,
    totals: &Totals,
    status: ConsolidationStatus,
    last_consolidated_at: &str,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "UPDATE consolidations SET \
             tables_processed = ?, total_valid_votes = ?, total_blank_votes = ?, \
             total_null_votes = ?, total_unmarked = ?, total_ballots = ?, \
             status = ?, last_consolidated_at = ?, updated_at = datetime('now') \
         WHERE id = ?",
    )
    .bind(totals.tables_processed)
    .bind(totals.total_valid_votes)
    .bind(totals.total_blank_votes)
    .bind(totals.total_null_votes)
    .bind(totals.total_unmarked)
    .bind(totals.total_ballots)
    .bind(status.as_str())
    .bind(last_consolidated_at)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn set_generated_e24_ref(pool: &SqlitePool, id: i64, artifact_ref: &str) -> Result<()> {
    sqlx::query(
        "UPDATE consolidations SET generated_e24_ref = ?, updated_at = datetime('now') WHERE id = ?",
    )
    .bind(artifact_ref)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_official_e24_ref(pool: &SqlitePool, id: i64, image_ref: &str) -> Result<()> {
    let result = sqlx::query(
        "UPDATE consolidations SET official_e24_ref = ?, updated_at = datetime('now') WHERE id = ?",
    )
    .bind(image_ref)
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::UnknownConsolidation(id));
    }
    Ok(())
}

/// Stamp the verification outcome; called inside the verify transaction.
pub async fn write_verification<'e, E>(
    executor: E,
    id: i64,
    status: VerificationStatus,
    verified_by: i64,
    verified_at: &str,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "UPDATE consolidations SET verification_status = ?, verified_by = ?, verified_at = ?, \
         updated_at = datetime('now') WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(verified_by)
    .bind(verified_at)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Municipality-wide rollup: counts by status, overall progress,
/// pending discrepancies and active claims.
pub async fn municipal_status(pool: &SqlitePool, municipality_id: i64) -> Result<MunicipalStatus> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total, \
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed, \
                COALESCE(SUM(CASE WHEN status = 'consolidating' THEN 1 ELSE 0 END), 0) AS consolidating, \
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) AS pending, \
                COALESCE(SUM(total_tables_expected), 0) AS expected, \
                COALESCE(SUM(tables_processed), 0) AS processed, \
                COALESCE(SUM(total_ballots), 0) AS ballots \
         FROM consolidations WHERE municipality_id = ?",
    )
    .bind(municipality_id)
    .fetch_one(pool)
    .await?;

    let pending_discrepancies: i64 = sqlx::query(
        "SELECT COUNT(*) AS n FROM discrepancies d \
         JOIN consolidations c ON d.consolidation_id = c.id \
         WHERE c.municipality_id = ? AND d.review_status = 'pending'",
    )
    .bind(municipality_id)
    .fetch_one(pool)
    .await?
    .get("n");

    let active_claims: i64 = sqlx::query(
        "SELECT COUNT(*) AS n FROM claims r \
         JOIN consolidations c ON r.consolidation_id = c.id \
         WHERE c.municipality_id = ? AND r.status IN ('generated', 'sent', 'under_review')",
    )
    .bind(municipality_id)
    .fetch_one(pool)
    .await?
    .get("n");

    Ok(MunicipalStatus {
        municipality_id,
        total_consolidations: row.get("total"),
        completed: row.get("completed"),
        consolidating: row.get("consolidating"),
        pending: row.get("pending"),
        total_tables_expected: row.get("expected"),
        tables_processed: row.get("processed"),
        total_ballots: row.get("ballots"),
        pending_discrepancies,
        active_claims,
    })
}

const COLUMNS: &str = "id, municipality_id, election_type_id, electoral_process_id, \
    total_tables_expected, tables_processed, total_valid_votes, total_blank_votes, \
    total_null_votes, total_unmarked, total_ballots, status, verification_status, \
    generated_e24_ref, official_e24_ref, started_by, verified_by, started_at, \
    last_consolidated_at, verified_at";

fn from_row(row: sqlx::sqlite::SqliteRow) -> Result<Consolidation> {
    let status_str: String = row.get("status");
    let verification_str: String = row.get("verification_status");
    let id: i64 = row.get("id");

    let status = ConsolidationStatus::parse(&status_str).ok_or_else(|| {
        Error::DataIntegrityViolation(format!("consolidation {} has unknown status '{}'", id, status_str))
    })?;
    let verification_status = VerificationStatus::parse(&verification_str).ok_or_else(|| {
        Error::DataIntegrityViolation(format!(
            "consolidation {} has unknown verification status '{}'",
            id, verification_str
        ))
    })?;

    Ok(Consolidation {
        id,
        municipality_id: row.get("municipality_id"),
        election_type_id: row.get("election_type_id"),
        electoral_process_id: row.get("electoral_process_id"),
        total_tables_expected: row.get("total_tables_expected"),
        tables_processed: row.get("tables_processed"),
        total_valid_votes: row.get("total_valid_votes"),
        total_blank_votes: row.get("total_blank_votes"),
        total_null_votes: row.get("total_null_votes"),
        total_unmarked: row.get("total_unmarked"),
        total_ballots: row.get("total_ballots"),
        status,
        verification_status,
        generated_e24_ref: row.get("generated_e24_ref"),
        official_e24_ref: row.get("official_e24_ref"),
        started_by: row.get("started_by"),
        verified_by: row.get("verified_by"),
        started_at: row.get("started_at"),
        last_consolidated_at: row.get("last_consolidated_at"),
        verified_at: row.get("verified_at"),
    })
}
