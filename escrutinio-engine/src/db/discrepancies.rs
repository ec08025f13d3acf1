//! Discrepancy persistence

use crate::models::{Discrepancy, DiscrepancyKind, Severity};
use escrutinio_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Insert one discrepancy row; called inside the verification transaction.
pub async fn insert<'e, E>(executor: E, discrepancy: &NewDiscrepancy<'_>) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO discrepancies \
         (consolidation_id, kind, field_name, generated_value, official_value, \
          delta, severity, description) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(discrepancy.consolidation_id)
    .bind(discrepancy.kind.as_str())
    .bind(discrepancy.field_name)
    .bind(discrepancy.generated_value)
    .bind(discrepancy.official_value)
    .bind(discrepancy.delta)
    .bind(discrepancy.severity.as_str())
    .bind(discrepancy.description)
    .execute(executor)
    .await?;
    Ok(result.last_insert_rowid())
}

#[derive(Debug, Clone)]
pub struct NewDiscrepancy<'a> {
    pub consolidation_id: i64,
    pub kind: DiscrepancyKind,
    pub field_name: &'a str,
    pub generated_value: i64,
    pub official_value: i64,
    pub delta: i64,
    pub severity: Severity,
    pub description: &'a str,
}

/// Drop every discrepancy of a consolidation (re-verification replaces
/// the whole set); called inside the verification transaction.
pub async fn delete_for_consolidation<'e, E>(executor: E, consolidation_id: i64) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query("DELETE FROM discrepancies WHERE consolidation_id = ?")
        .bind(consolidation_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Discrepancies of a consolidation, most severe first
pub async fn list_for_consolidation(
    pool: &SqlitePool,
    consolidation_id: i64,
) -> Result<Vec<Discrepancy>> {
    let rows = sqlx::query(
        "SELECT id, consolidation_id, kind, field_name, generated_value, official_value, \
                delta, severity, description, review_status \
         FROM discrepancies WHERE consolidation_id = ? \
         ORDER BY CASE severity WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END, id",
    )
    .bind(consolidation_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let kind_str: String = row.get("kind");
            let severity_str: String = row.get("severity");
            let id: i64 = row.get("id");
            Ok(Discrepancy {
                id,
                consolidation_id: row.get("consolidation_id"),
                kind: DiscrepancyKind::parse(&kind_str).ok_or_else(|| {
                    Error::DataIntegrityViolation(format!(
                        "discrepancy {} has unknown kind '{}'",
                        id, kind_str
                    ))
                })?,
                field_name: row.get("field_name"),
                generated_value: row.get("generated_value"),
                official_value: row.get("official_value"),
                delta: row.get("delta"),
                severity: Severity::parse(&severity_str).ok_or_else(|| {
                    Error::DataIntegrityViolation(format!(
                        "discrepancy {} has unknown severity '{}'",
                        id, severity_str
                    ))
                })?,
                description: row.get("description"),
                review_status: row.get("review_status"),
            })
        })
        .collect()
}

pub async fn count_for_consolidation(pool: &SqlitePool, consolidation_id: i64) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM discrepancies WHERE consolidation_id = ?")
        .bind(consolidation_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get("n"))
}
