//! Witness assignment persistence

use crate::models::witness::{PlaceCoverage, TableCoverage};
use crate::models::{AssignmentRole, AssignmentStatus, WitnessAssignment};
use escrutinio_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Insert an assignment in `assigned` state. The partial unique index
/// rejects a second active principal for the same (table, process).
pub async fn insert_assignment(
    pool: &SqlitePool,
    witness_id: i64,
    polling_table_id: i64,
    electoral_process_id: i64,
    role: AssignmentRole,
    assigned_at: &str,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO witness_assignments \
         (witness_id, polling_table_id, electoral_process_id, role, assigned_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(witness_id)
    .bind(polling_table_id)
    .bind(electoral_process_id)
    .bind(role.as_str())
    .bind(assigned_at)
    .execute(pool)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(e) if super::reference::is_unique_violation(&e, "ux_witness_principal") => {
            Err(Error::PrincipalWitnessAlreadyAssigned {
                table_id: polling_table_id,
                process_id: electoral_process_id,
            })
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn load_assignment(pool: &SqlitePool, id: i64) -> Result<Option<WitnessAssignment>> {
    let row = sqlx::query(
        "SELECT id, witness_id, polling_table_id, electoral_process_id, role, status, assigned_at \
         FROM witness_assignments WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(from_row).transpose()
}

/// The active principal assignment for a (table, process), if any
pub async fn active_principal(
    pool: &SqlitePool,
    polling_table_id: i64,
    electoral_process_id: i64,
) -> Result<Option<WitnessAssignment>> {
    let row = sqlx::query(
        "SELECT id, witness_id, polling_table_id, electoral_process_id, role, status, assigned_at \
         FROM witness_assignments \
         WHERE polling_table_id = ? AND electoral_process_id = ? \
           AND role = 'principal' AND status != 'reassigned'",
    )
    .bind(polling_table_id)
    .bind(electoral_process_id)
    .fetch_optional(pool)
    .await?;
    row.map(from_row).transpose()
}

pub async fn write_status(pool: &SqlitePool, id: i64, status: AssignmentStatus) -> Result<()> {
    sqlx::query(
        "UPDATE witness_assignments SET status = ?, updated_at = datetime('now') WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Per-table coverage across a municipality: which tables have an
/// active principal witness for the process.
pub async fn coverage_rows(
    pool: &SqlitePool,
    municipality_id: i64,
    electoral_process_id: i64,
) -> Result<Vec<TableCoverage>> {
    let rows = sqlx::query(
        "SELECT pt.id AS table_id, pt.table_number, pp.id AS place_id, pp.name AS place_name, \
                wa.id AS assignment_id \
         FROM polling_tables pt \
         JOIN polling_places pp ON pt.polling_place_id = pp.id \
         LEFT JOIN witness_assignments wa \
           ON wa.polling_table_id = pt.id \
          AND wa.electoral_process_id = ? \
          AND wa.role = 'principal' AND wa.status != 'reassigned' \
         WHERE pp.municipality_id = ? AND pt.active = 1 \
         ORDER BY pp.name, pt.table_number",
    )
    .bind(electoral_process_id)
    .bind(municipality_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| TableCoverage {
            table_id: row.get("table_id"),
            table_number: row.get("table_number"),
            polling_place_id: row.get("place_id"),
            polling_place_name: row.get("place_name"),
            has_active_principal: row.get::<Option<i64>, _>("assignment_id").is_some(),
        })
        .collect())
}

/// Fold table coverage into per-place rollups, preserving place order
pub fn rollup_by_place(tables: &[TableCoverage]) -> Vec<PlaceCoverage> {
    let mut places: Vec<PlaceCoverage> = Vec::new();
    for table in tables {
        match places.iter_mut().find(|p| p.polling_place_id == table.polling_place_id) {
            Some(place) => {
                place.total_tables += 1;
                if table.has_active_principal {
                    place.covered_tables += 1;
                }
            }
            None => places.push(PlaceCoverage {
                polling_place_id: table.polling_place_id,
                polling_place_name: table.polling_place_name.clone(),
                covered_tables: table.has_active_principal as i64,
                total_tables: 1,
            }),
        }
    }
    places
}

fn from_row(row: sqlx::sqlite::SqliteRow) -> Result<WitnessAssignment> {
    let role_str: String = row.get("role");
    let status_str: String = row.get("status");
    let id: i64 = row.get("id");
    Ok(WitnessAssignment {
        id,
        witness_id: row.get("witness_id"),
        polling_table_id: row.get("polling_table_id"),
        electoral_process_id: row.get("electoral_process_id"),
        role: AssignmentRole::parse(&role_str).ok_or_else(|| {
            Error::DataIntegrityViolation(format!("assignment {} has unknown role '{}'", id, role_str))
        })?,
        status: AssignmentStatus::parse(&status_str).ok_or_else(|| {
            Error::DataIntegrityViolation(format!(
                "assignment {} has unknown status '{}'",
                id, status_str
            ))
        })?,
        assigned_at: row.get("assigned_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::reference;
    use escrutinio_common::db::init_schema;

    async fn setup() -> (SqlitePool, i64, i64, Vec<i64>) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        let mun = reference::insert_municipality(&pool, "Florencia", None).await.unwrap();
        let place = reference::insert_polling_place(&pool, mun, "Colegio Central", None)
            .await
            .unwrap();
        let mut tables = Vec::new();
        for n in 1..=3 {
            tables.push(reference::insert_polling_table(&pool, place, n, 300).await.unwrap());
        }
        let process = reference::insert_electoral_process(&pool, "Elecciones 2026", None)
            .await
            .unwrap();
        for national_id in ["100", "200"] {
            reference::insert_witness(&pool, national_id, "Testigo", None).await.unwrap();
        }
        (pool, mun, process, tables)
    }

    #[tokio::test]
    async fn test_second_principal_rejected_until_reassigned() {
        let (pool, _mun, process, tables) = setup().await;

        let first = insert_assignment(&pool, 1, tables[0], process, AssignmentRole::Principal, "t")
            .await
            .unwrap();
        let err = insert_assignment(&pool, 2, tables[0], process, AssignmentRole::Principal, "t")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "PRINCIPAL_WITNESS_ALREADY_ASSIGNED");

        write_status(&pool, first, AssignmentStatus::Reassigned).await.unwrap();
        insert_assignment(&pool, 2, tables[0], process, AssignmentRole::Principal, "t")
            .await
            .expect("slot should be free after reassignment");
    }

    #[tokio::test]
    async fn test_coverage_rows_and_rollup() {
        let (pool, mun, process, tables) = setup().await;
        insert_assignment(&pool, 1, tables[0], process, AssignmentRole::Principal, "t")
            .await
            .unwrap();
        insert_assignment(&pool, 2, tables[2], process, AssignmentRole::Principal, "t")
            .await
            .unwrap();

        let rows = coverage_rows(&pool, mun, process).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].has_active_principal);
        assert!(!rows[1].has_active_principal);
        assert!(rows[2].has_active_principal);

        let places = rollup_by_place(&rows);
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].covered_tables, 2);
        assert_eq!(places[0].total_tables, 3);
    }
}
