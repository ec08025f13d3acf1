//! Witness assignment
//!
//! Assigns witnesses from a coordinator's pool to polling tables, one
//! active principal per (table, process). The slot lock plus the
//! partial unique index keep concurrent assignments honest; coverage
//! reporting tells coordinators which tables are still uncovered.

use crate::db::{audit, reference, witnesses};
use crate::models::witness::CoverageReport;
use crate::models::{AssignmentRole, AssignmentStatus, WitnessAssignment};
use crate::services::lock_map::LockMap;
use escrutinio_common::events::{EventBus, ScrutinyEvent};
use escrutinio_common::{time, Error, Result};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct WitnessAssigner {
    db: SqlitePool,
    event_bus: EventBus,
    slot_locks: LockMap<(i64, i64)>,
}

impl WitnessAssigner {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Self {
        Self {
            db,
            event_bus,
            slot_locks: LockMap::new(),
        }
    }

    /// Assign a witness to a table for one electoral process.
    ///
    /// For the principal role, at most one active assignment may exist
    /// per (table, process); violations surface as
    /// `PRINCIPAL_WITNESS_ALREADY_ASSIGNED`.
    pub async fn assign(
        &self,
        witness_id: i64,
        polling_table_id: i64,
        electoral_process_id: i64,
        role: AssignmentRole,
    ) -> Result<i64> {
        let witness = reference::load_witness(&self.db, witness_id)
            .await?
            .ok_or(Error::UnknownWitness(witness_id))?;
        if !witness.active {
            return Err(Error::UnknownWitness(witness_id));
        }
        reference::load_polling_table(&self.db, polling_table_id)
            .await?
            .ok_or(Error::UnknownTable(polling_table_id))?;
        reference::load_electoral_process(&self.db, electoral_process_id)
            .await?
            .ok_or_else(|| {
                Error::InvalidInput(format!("unknown electoral process {}", electoral_process_id))
            })?;

        let _guard = self
            .slot_locks
            .acquire((polling_table_id, electoral_process_id))
            .await;

        if role == AssignmentRole::Principal {
            if let Some(existing) =
                witnesses::active_principal(&self.db, polling_table_id, electoral_process_id).await?
            {
                tracing::debug!(
                    existing_assignment = existing.id,
                    polling_table_id,
                    "principal slot already taken"
                );
                return Err(Error::PrincipalWitnessAlreadyAssigned {
                    table_id: polling_table_id,
                    process_id: electoral_process_id,
                });
            }
        }

        let assignment_id = witnesses::insert_assignment(
            &self.db,
            witness_id,
            polling_table_id,
            electoral_process_id,
            role,
            &time::now_iso(),
        )
        .await?;

        tracing::info!(
            assignment_id,
            witness_id,
            polling_table_id,
            role = role.as_str(),
            "witness assigned"
        );

        audit::record_lossy(
            &self.db,
            witness_id,
            "assign_witness",
            "witness_assignment",
            assignment_id,
            &format!("table {} process {}", polling_table_id, electoral_process_id),
        )
        .await;

        self.event_bus.emit_lossy(ScrutinyEvent::WitnessAssigned {
            assignment_id,
            witness_id,
            polling_table_id,
            electoral_process_id,
            timestamp: time::now(),
        });

        Ok(assignment_id)
    }

    /// Apply a lifecycle transition to an assignment. Reassignment ends
    /// it and frees the slot for a new principal.
    pub async fn set_status(&self, assignment_id: i64, new_status: AssignmentStatus) -> Result<()> {
        let assignment = witnesses::load_assignment(&self.db, assignment_id)
            .await?
            .ok_or(Error::UnknownAssignment(assignment_id))?;

        if !assignment.status.can_transition_to(new_status) {
            return Err(Error::IllegalAssignmentTransition {
                from: assignment.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        witnesses::write_status(&self.db, assignment_id, new_status).await?;

        tracing::info!(
            assignment_id,
            from = assignment.status.as_str(),
            to = new_status.as_str(),
            "witness assignment transitioned"
        );

        self.event_bus.emit_lossy(ScrutinyEvent::WitnessStatusChanged {
            assignment_id,
            old_status: assignment.status.as_str().to_string(),
            new_status: new_status.as_str().to_string(),
            timestamp: time::now(),
        });

        Ok(())
    }

    pub async fn assignment(&self, assignment_id: i64) -> Result<Option<WitnessAssignment>> {
        witnesses::load_assignment(&self.db, assignment_id).await
    }

    /// Pure read: per-table principal coverage for a municipality with
    /// per-place rollups.
    pub async fn coverage(
        &self,
        municipality_id: i64,
        electoral_process_id: i64,
    ) -> Result<CoverageReport> {
        let tables = witnesses::coverage_rows(&self.db, municipality_id, electoral_process_id).await?;
        let places = witnesses::rollup_by_place(&tables);
        let covered_tables = tables.iter().filter(|t| t.has_active_principal).count() as i64;
        let total_tables = tables.len() as i64;

        Ok(CoverageReport {
            municipality_id,
            electoral_process_id,
            tables,
            places,
            covered_tables,
            total_tables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::reference;
    use escrutinio_common::db::init_schema;

    struct Fixture {
        assigner: WitnessAssigner,
        municipality: i64,
        process: i64,
        tables: Vec<i64>,
        witnesses: Vec<i64>,
    }

    async fn fixture() -> Fixture {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();

        let municipality = reference::insert_municipality(&pool, "Florencia", None).await.unwrap();
        let place_a = reference::insert_polling_place(&pool, municipality, "Colegio Central", None)
            .await
            .unwrap();
        let place_b = reference::insert_polling_place(&pool, municipality, "Escuela Norte", None)
            .await
            .unwrap();
        let mut tables = Vec::new();
        for n in 1..=2 {
            tables.push(reference::insert_polling_table(&pool, place_a, n, 300).await.unwrap());
        }
        tables.push(reference::insert_polling_table(&pool, place_b, 1, 250).await.unwrap());

        let process = reference::insert_electoral_process(&pool, "Elecciones 2026", None)
            .await
            .unwrap();

        let mut witness_ids = Vec::new();
        for (i, name) in ["Ana Castro", "Luis Herrera", "Carmen Díaz"].iter().enumerate() {
            witness_ids.push(
                reference::insert_witness(&pool, &format!("nid-{}", i), name, Some(1))
                    .await
                    .unwrap(),
            );
        }

        Fixture {
            assigner: WitnessAssigner::new(pool, EventBus::new(32)),
            municipality,
            process,
            tables,
            witnesses: witness_ids,
        }
    }

    #[tokio::test]
    async fn test_single_active_principal_per_slot() {
        let fixture = fixture().await;
        fixture
            .assigner
            .assign(fixture.witnesses[0], fixture.tables[0], fixture.process, AssignmentRole::Principal)
            .await
            .unwrap();

        let err = fixture
            .assigner
            .assign(fixture.witnesses[1], fixture.tables[0], fixture.process, AssignmentRole::Principal)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "PRINCIPAL_WITNESS_ALREADY_ASSIGNED");

        // An alternate on the same table is fine
        fixture
            .assigner
            .assign(fixture.witnesses[1], fixture.tables[0], fixture.process, AssignmentRole::Alternate)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reassignment_frees_the_slot() {
        let fixture = fixture().await;
        let first = fixture
            .assigner
            .assign(fixture.witnesses[0], fixture.tables[0], fixture.process, AssignmentRole::Principal)
            .await
            .unwrap();

        fixture
            .assigner
            .set_status(first, AssignmentStatus::Reassigned)
            .await
            .unwrap();

        fixture
            .assigner
            .assign(fixture.witnesses[1], fixture.tables[0], fixture.process, AssignmentRole::Principal)
            .await
            .expect("slot should be free after reassignment");
    }

    #[tokio::test]
    async fn test_absent_keeps_the_slot() {
        let fixture = fixture().await;
        let id = fixture
            .assigner
            .assign(fixture.witnesses[0], fixture.tables[0], fixture.process, AssignmentRole::Principal)
            .await
            .unwrap();
        fixture.assigner.set_status(id, AssignmentStatus::Absent).await.unwrap();

        // A no-show does not open the table to a second principal
        let err = fixture
            .assigner
            .assign(fixture.witnesses[1], fixture.tables[0], fixture.process, AssignmentRole::Principal)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "PRINCIPAL_WITNESS_ALREADY_ASSIGNED");
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let fixture = fixture().await;
        let id = fixture
            .assigner
            .assign(fixture.witnesses[0], fixture.tables[0], fixture.process, AssignmentRole::Principal)
            .await
            .unwrap();

        fixture.assigner.set_status(id, AssignmentStatus::Confirmed).await.unwrap();
        fixture.assigner.set_status(id, AssignmentStatus::Present).await.unwrap();

        let err = fixture
            .assigner
            .set_status(id, AssignmentStatus::Confirmed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ILLEGAL_ASSIGNMENT_TRANSITION");

        let assignment = fixture.assigner.assignment(id).await.unwrap().unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Present);
    }

    #[tokio::test]
    async fn test_coverage_report() {
        let fixture = fixture().await;
        fixture
            .assigner
            .assign(fixture.witnesses[0], fixture.tables[0], fixture.process, AssignmentRole::Principal)
            .await
            .unwrap();
        fixture
            .assigner
            .assign(fixture.witnesses[2], fixture.tables[2], fixture.process, AssignmentRole::Principal)
            .await
            .unwrap();

        let report = fixture
            .assigner
            .coverage(fixture.municipality, fixture.process)
            .await
            .unwrap();
        assert_eq!(report.total_tables, 3);
        assert_eq!(report.covered_tables, 2);
        assert_eq!(report.uncovered().count(), 1);
        assert_eq!(report.places.len(), 2);
        assert!((report.coverage_percent() - 66.6).abs() < 1.0);
    }

    #[tokio::test]
    async fn test_unknown_witness_rejected() {
        let fixture = fixture().await;
        let err = fixture
            .assigner
            .assign(404, fixture.tables[0], fixture.process, AssignmentRole::Principal)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "UNKNOWN_WITNESS");
    }
}
