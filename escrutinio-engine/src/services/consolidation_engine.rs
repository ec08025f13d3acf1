//! Consolidation engine
//!
//! Maintains one E-24 record per (municipality, election type,
//! electoral process) whose totals are the exact sum of the currently
//! confirmed E-14 captures of that municipality's tables. The recompute
//! is a full re-derivation from the captures rather than an incremental
//! update, trading CPU for freedom from stale-partial-sum bugs; runs on
//! the same consolidation are serialised through a per-id lock, runs on
//! different consolidations proceed in parallel.

use crate::db::{audit, captures, consolidations, reference};
use crate::models::{Consolidation, ConsolidationStatus, ConsolidationSummary, MunicipalStatus};
use crate::services::e24_renderer;
use crate::services::lock_map::LockMap;
use escrutinio_common::events::{EventBus, ScrutinyEvent};
use escrutinio_common::{time, Error, Result};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;

#[derive(Clone)]
pub struct ConsolidationEngine {
    db: SqlitePool,
    event_bus: EventBus,
    artifacts_dir: PathBuf,
    run_locks: LockMap<i64>,
}

impl ConsolidationEngine {
    pub fn new(db: SqlitePool, event_bus: EventBus, artifacts_dir: PathBuf) -> Self {
        Self {
            db,
            event_bus,
            artifacts_dir,
            run_locks: LockMap::new(),
        }
    }

    /// Begin (or resume) consolidation for a scope. Idempotent: an
    /// existing consolidation for the triple is reused and moved back
    /// to `consolidating`; on first creation `total_tables_expected` is
    /// frozen from the municipality's active table count.
    pub async fn begin(
        &self,
        municipality_id: i64,
        election_type_id: i64,
        electoral_process_id: i64,
        user: i64,
    ) -> Result<i64> {
        reference::load_municipality(&self.db, municipality_id)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("unknown municipality {}", municipality_id)))?;
        reference::load_election_type(&self.db, election_type_id)
            .await?
            .ok_or(Error::UnknownElectionType(election_type_id))?;
        reference::load_electoral_process(&self.db, electoral_process_id)
            .await?
            .ok_or_else(|| {
                Error::InvalidInput(format!("unknown electoral process {}", electoral_process_id))
            })?;

        let existing = consolidations::find_by_scope(
            &self.db,
            municipality_id,
            election_type_id,
            electoral_process_id,
        )
        .await?;

        let consolidation_id = match existing {
            Some(consolidation) => {
                consolidations::mark_consolidating(&self.db, consolidation.id, user).await?;
                tracing::info!(
                    consolidation_id = consolidation.id,
                    municipality_id,
                    "consolidation resumed"
                );
                consolidation.id
            }
            None => {
                let total_tables = reference::count_active_tables(&self.db, municipality_id).await?;
                let id = consolidations::insert(
                    &self.db,
                    municipality_id,
                    election_type_id,
                    electoral_process_id,
                    total_tables,
                    user,
                    &time::now_iso(),
                )
                .await?;
                tracing::info!(
                    consolidation_id = id,
                    municipality_id,
                    election_type_id,
                    total_tables,
                    "consolidation started"
                );
                id
            }
        };

        audit::record_lossy(
            &self.db,
            user,
            "start_consolidation",
            "consolidation",
            consolidation_id,
            &format!("municipality {} type {}", municipality_id, election_type_id),
        )
        .await;

        self.event_bus.emit_lossy(ScrutinyEvent::ConsolidationStarted {
            consolidation_id,
            municipality_id,
            election_type_id,
            electoral_process_id,
            timestamp: time::now(),
        });

        Ok(consolidation_id)
    }

    /// Full recompute of a consolidation's totals from the confirmed
    /// captures. Deterministic and idempotent; the write is one
    /// transaction, so a failure leaves the record untouched.
    pub async fn run(&self, consolidation_id: i64) -> Result<ConsolidationSummary> {
        let _guard = self.run_locks.acquire(consolidation_id).await;

        let consolidation = consolidations::load(&self.db, consolidation_id)
            .await?
            .ok_or(Error::UnknownConsolidation(consolidation_id))?;

        // A confirmed capture pointing at a vanished table means the
        // reference data is broken; stop before aggregating over it.
        let orphans =
            captures::orphaned_confirmed_captures(&self.db, consolidation.election_type_id).await?;
        if !orphans.is_empty() {
            return Err(Error::DataIntegrityViolation(format!(
                "confirmed captures {:?} reference missing polling tables",
                orphans
            )));
        }

        let totals = self.aggregate(&consolidation).await?;
        let status = if totals.tables_processed >= consolidation.total_tables_expected {
            ConsolidationStatus::Completed
        } else {
            ConsolidationStatus::Consolidating
        };

        let last_consolidated_at = time::now_iso();
        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|_| Error::ConsolidationRetryRequired(consolidation_id))?;
        consolidations::write_totals(&mut *tx, consolidation_id, &totals, status, &last_consolidated_at)
            .await
            .map_err(|_| Error::ConsolidationRetryRequired(consolidation_id))?;
        tx.commit()
            .await
            .map_err(|_| Error::ConsolidationRetryRequired(consolidation_id))?;

        let summary = ConsolidationSummary {
            consolidation_id,
            tables_processed: totals.tables_processed,
            total_tables_expected: consolidation.total_tables_expected,
            total_valid_votes: totals.total_valid_votes,
            total_blank_votes: totals.total_blank_votes,
            total_null_votes: totals.total_null_votes,
            total_unmarked: totals.total_unmarked,
            total_ballots: totals.total_ballots,
            completed: status == ConsolidationStatus::Completed,
        };

        tracing::info!(
            consolidation_id,
            tables_processed = summary.tables_processed,
            total_ballots = summary.total_ballots,
            completed = summary.completed,
            "consolidation run finished"
        );

        self.event_bus.emit_lossy(ScrutinyEvent::ConsolidationUpdated {
            consolidation_id,
            tables_processed: summary.tables_processed,
            total_tables_expected: summary.total_tables_expected,
            total_valid_votes: summary.total_valid_votes,
            total_blank_votes: summary.total_blank_votes,
            total_null_votes: summary.total_null_votes,
            total_ballots: summary.total_ballots,
            completed: summary.completed,
            timestamp: time::now(),
        });

        Ok(summary)
    }

    /// Render the current totals into an E-24 artifact and record its
    /// reference. Rendering failures do not alter the consolidation.
    pub async fn generate_e24(&self, consolidation_id: i64, user: i64) -> Result<String> {
        let consolidation = consolidations::load(&self.db, consolidation_id)
            .await?
            .ok_or(Error::UnknownConsolidation(consolidation_id))?;

        let municipality = reference::load_municipality(&self.db, consolidation.municipality_id)
            .await?
            .ok_or_else(|| {
                Error::DataIntegrityViolation(format!(
                    "consolidation {} references missing municipality {}",
                    consolidation_id, consolidation.municipality_id
                ))
            })?;
        let election_type = reference::load_election_type(&self.db, consolidation.election_type_id)
            .await?
            .ok_or_else(|| {
                Error::DataIntegrityViolation(format!(
                    "consolidation {} references missing election type {}",
                    consolidation_id, consolidation.election_type_id
                ))
            })?;

        let path = e24_renderer::render_artifact(
            &consolidation,
            &municipality.name,
            &election_type.name,
            &self.artifacts_dir,
        )?;
        let artifact_ref = path.to_string_lossy().into_owned();

        consolidations::set_generated_e24_ref(&self.db, consolidation_id, &artifact_ref).await?;

        audit::record_lossy(
            &self.db,
            user,
            "generate_e24",
            "consolidation",
            consolidation_id,
            &artifact_ref,
        )
        .await;

        self.event_bus.emit_lossy(ScrutinyEvent::E24Generated {
            consolidation_id,
            artifact_ref: artifact_ref.clone(),
            timestamp: time::now(),
        });

        Ok(artifact_ref)
    }

    /// Municipality-wide rollup for coordinator dashboards
    pub async fn municipal_status(&self, municipality_id: i64) -> Result<MunicipalStatus> {
        consolidations::municipal_status(&self.db, municipality_id).await
    }

    /// Attach a listener that reruns consolidating scopes when an E-14
    /// is confirmed. Advisory only: callers that need up-to-the-moment
    /// totals still invoke `run` themselves.
    pub fn spawn_confirmation_listener(&self) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();
        let mut rx = self.event_bus.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if let ScrutinyEvent::E14Confirmed {
                    polling_table_id,
                    election_type_id,
                    ..
                } = event
                {
                    if let Err(e) = engine
                        .rerun_for_confirmation(polling_table_id, election_type_id)
                        .await
                    {
                        tracing::warn!(
                            polling_table_id,
                            election_type_id,
                            "confirmation-triggered rerun failed: {}",
                            e
                        );
                    }
                }
            }
        })
    }

    async fn rerun_for_confirmation(
        &self,
        polling_table_id: i64,
        election_type_id: i64,
    ) -> Result<()> {
        let rows = sqlx::query(
            "SELECT c.id FROM consolidations c \
             JOIN polling_places pp ON pp.municipality_id = c.municipality_id \
             JOIN polling_tables pt ON pt.polling_place_id = pp.id \
             WHERE pt.id = ? AND c.election_type_id = ? AND c.status = 'consolidating'",
        )
        .bind(polling_table_id)
        .bind(election_type_id)
        .fetch_all(&self.db)
        .await?;

        for row in rows {
            let consolidation_id: i64 = row.get("id");
            self.run(consolidation_id).await?;
        }
        Ok(())
    }

    /// Sum the confirmed captures of the consolidation's municipality
    /// and election type. Tables without a confirmed capture contribute
    /// nothing; captures for other election types or other
    /// municipalities never enter the join.
    async fn aggregate(&self, consolidation: &Consolidation) -> Result<consolidations::Totals> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT c.polling_table_id) AS tables_processed, \
                    COALESCE(SUM(cv.votes_sum), 0) AS valid, \
                    COALESCE(SUM(c.blank_votes), 0) AS blank, \
                    COALESCE(SUM(c.null_votes), 0) AS null_votes, \
                    COALESCE(SUM(c.unmarked_ballots), 0) AS unmarked \
             FROM e14_captures c \
             JOIN polling_tables pt ON c.polling_table_id = pt.id \
             JOIN polling_places pp ON pt.polling_place_id = pp.id \
             LEFT JOIN (SELECT capture_id, SUM(votes) AS votes_sum \
                        FROM e14_candidate_votes GROUP BY capture_id) cv \
               ON cv.capture_id = c.id \
             WHERE pp.municipality_id = ? \
               AND c.election_type_id = ? \
               AND c.status = 'confirmed' \
               AND pt.active = 1",
        )
        .bind(consolidation.municipality_id)
        .bind(consolidation.election_type_id)
        .fetch_one(&self.db)
        .await?;

        let total_valid_votes: i64 = row.get("valid");
        let total_blank_votes: i64 = row.get("blank");
        let total_null_votes: i64 = row.get("null_votes");

        Ok(consolidations::Totals {
            tables_processed: row.get("tables_processed"),
            total_valid_votes,
            total_blank_votes,
            total_null_votes,
            total_unmarked: row.get("unmarked"),
            total_ballots: total_valid_votes + total_blank_votes + total_null_votes,
        })
    }
}
