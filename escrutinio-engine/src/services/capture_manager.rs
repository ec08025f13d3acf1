//! E-14 record manager
//!
//! Owns the capture lifecycle: created from an upload, edited freely by
//! the witness while in `captured` state, immutable once confirmed, and
//! superseded (never deleted) when an administrative re-capture is
//! needed. Confirmation emits the domain event the consolidation engine
//! listens for.

use crate::db::{audit, captures, reference};
use crate::models::{CaptureEdits, CaptureStatus, E14Capture, OcrResult};
use escrutinio_common::events::{EventBus, ScrutinyEvent};
use escrutinio_common::{time, Error, Result};
use sqlx::SqlitePool;

/// Allowed excess of counted ballots over enrolled voters before an
/// overcount warning is raised. Absorbs ordinary transcription error.
const OVERCOUNT_SLACK: i64 = 5;

/// Non-fatal findings surfaced alongside a successful confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyWarning {
    /// Counted ballots exceed enrolled voters beyond the slack.
    /// The confirming user may override; confirmation is never blocked.
    Overcount {
        counted: i64,
        enrolled: i64,
        excess: i64,
    },
}

impl TallyWarning {
    pub fn kind(&self) -> &'static str {
        match self {
            TallyWarning::Overcount { .. } => "TALLY_OVERCOUNT_WARNING",
        }
    }
}

/// Successful confirmation result
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub capture_id: i64,
    pub warnings: Vec<TallyWarning>,
}

pub struct CaptureManager {
    db: SqlitePool,
    event_bus: EventBus,
}

impl CaptureManager {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Self {
        Self { db, event_bus }
    }

    /// Create a capture in `captured` state from an uploaded image and
    /// its OCR result.
    ///
    /// A confirmed capture may already exist for the same (table,
    /// election type): the new one is then the pending re-capture and
    /// stays blocked from confirmation until the old one is superseded.
    pub async fn create_capture(
        &self,
        polling_table_id: i64,
        election_type_id: i64,
        image_ref: &str,
        ocr: &OcrResult,
        captured_by: i64,
    ) -> Result<i64> {
        reference::load_polling_table(&self.db, polling_table_id)
            .await?
            .ok_or(Error::UnknownTable(polling_table_id))?;
        reference::load_election_type(&self.db, election_type_id)
            .await?
            .ok_or(Error::UnknownElectionType(election_type_id))?;

        let captured_at = time::now_iso();
        let capture_id = captures::insert_capture(
            &self.db,
            polling_table_id,
            election_type_id,
            image_ref,
            ocr,
            captured_by,
            &captured_at,
        )
        .await?;

        tracing::info!(
            capture_id,
            polling_table_id,
            election_type_id,
            needs_manual_entry = ocr.needs_manual_entry,
            "E-14 capture created"
        );

        audit::record_lossy(
            &self.db,
            captured_by,
            "create_e14_capture",
            "e14_capture",
            capture_id,
            &format!("table {} type {}", polling_table_id, election_type_id),
        )
        .await;

        self.event_bus.emit_lossy(ScrutinyEvent::E14Captured {
            capture_id,
            polling_table_id,
            election_type_id,
            needs_manual_entry: ocr.needs_manual_entry,
            timestamp: time::now(),
        });

        Ok(capture_id)
    }

    /// Apply witness corrections to a `captured`-state record.
    pub async fn edit_capture(&self, capture_id: i64, edits: &CaptureEdits) -> Result<()> {
        let capture = self.require_capture(capture_id).await?;
        match capture.status {
            CaptureStatus::Captured => {}
            CaptureStatus::Confirmed | CaptureStatus::Superseded => {
                return Err(Error::EditOnConfirmed(capture_id));
            }
        }

        for &(vote_row_id, votes) in &edits.candidate_votes {
            if votes < 0 {
                return Err(Error::InvalidInput(format!(
                    "negative vote count {} for row {}",
                    votes, vote_row_id
                )));
            }
            captures::update_candidate_vote(&self.db, capture_id, vote_row_id, votes).await?;
        }

        captures::update_special_votes(
            &self.db,
            capture_id,
            edits.blank_votes,
            edits.null_votes,
            edits.unmarked_ballots,
            edits.observations.as_deref(),
        )
        .await?;

        tracing::debug!(capture_id, "E-14 capture edited");
        Ok(())
    }

    /// Confirm a capture, making it immutable and eligible for
    /// consolidation. Returns overcount warnings rather than failing:
    /// the witness signs off on what the sheet says.
    pub async fn confirm_capture(
        &self,
        capture_id: i64,
        confirming_user: i64,
    ) -> Result<ConfirmOutcome> {
        let capture = self.require_capture(capture_id).await?;
        match capture.status {
            CaptureStatus::Captured => {}
            CaptureStatus::Confirmed => return Err(Error::AlreadyConfirmed(capture_id)),
            CaptureStatus::Superseded => {
                return Err(Error::InvalidInput(format!(
                    "capture {} is superseded and cannot be confirmed",
                    capture_id
                )))
            }
        }

        // One confirmed capture per (table, election type)
        if let Some(existing) = captures::load_confirmed_capture(
            &self.db,
            capture.polling_table_id,
            capture.election_type_id,
        )
        .await?
        {
            if existing.id != capture_id {
                return Err(Error::TableAlreadyHasConfirmedCapture {
                    table_id: capture.polling_table_id,
                    election_type_id: capture.election_type_id,
                });
            }
        }

        let warnings = self.overcount_warnings(&capture).await?;

        let confirmed_at = time::now_iso();
        captures::mark_confirmed(&self.db, &capture, confirming_user, &confirmed_at).await?;

        tracing::info!(
            capture_id,
            polling_table_id = capture.polling_table_id,
            election_type_id = capture.election_type_id,
            warnings = warnings.len(),
            "E-14 capture confirmed"
        );

        audit::record_lossy(
            &self.db,
            confirming_user,
            "confirm_e14_capture",
            "e14_capture",
            capture_id,
            &format!("table {}", capture.polling_table_id),
        )
        .await;

        self.event_bus.emit_lossy(ScrutinyEvent::E14Confirmed {
            capture_id,
            polling_table_id: capture.polling_table_id,
            election_type_id: capture.election_type_id,
            timestamp: time::now(),
        });

        Ok(ConfirmOutcome {
            capture_id,
            warnings,
        })
    }

    /// Administrative supersede: frees the confirmed slot for a
    /// re-capture while preserving the record for audit.
    pub async fn supersede_capture(
        &self,
        capture_id: i64,
        reason: &str,
        actor: i64,
    ) -> Result<()> {
        let capture = self.require_capture(capture_id).await?;
        if capture.status != CaptureStatus::Confirmed {
            return Err(Error::SupersedeOnUnconfirmed(capture_id));
        }

        let superseded_at = time::now_iso();
        captures::mark_superseded(&self.db, capture_id, reason, &superseded_at).await?;

        tracing::info!(capture_id, reason, "E-14 capture superseded");

        audit::record_lossy(
            &self.db,
            actor,
            "supersede_e14_capture",
            "e14_capture",
            capture_id,
            reason,
        )
        .await;

        self.event_bus.emit_lossy(ScrutinyEvent::E14Superseded {
            capture_id,
            polling_table_id: capture.polling_table_id,
            election_type_id: capture.election_type_id,
            reason: reason.to_string(),
            timestamp: time::now(),
        });

        Ok(())
    }

    /// Compute overcount warnings for a capture about to be confirmed:
    /// candidate votes + blank + null measured against enrolled voters
    /// plus the slack.
    async fn overcount_warnings(&self, capture: &E14Capture) -> Result<Vec<TallyWarning>> {
        let table = reference::load_polling_table(&self.db, capture.polling_table_id)
            .await?
            .ok_or_else(|| {
                Error::DataIntegrityViolation(format!(
                    "capture {} references missing table {}",
                    capture.id, capture.polling_table_id
                ))
            })?;

        let candidate_sum = captures::candidate_vote_sum(&self.db, capture.id).await?;
        let counted = candidate_sum + capture.blank_votes + capture.null_votes;
        let excess = counted - table.enrolled_voters;

        let mut warnings = Vec::new();
        if excess > OVERCOUNT_SLACK {
            tracing::warn!(
                capture_id = capture.id,
                counted,
                enrolled = table.enrolled_voters,
                excess,
                "tally overcount beyond slack"
            );
            warnings.push(TallyWarning::Overcount {
                counted,
                enrolled: table.enrolled_voters,
                excess,
            });
        }
        Ok(warnings)
    }

    async fn require_capture(&self, capture_id: i64) -> Result<E14Capture> {
        captures::load_capture(&self.db, capture_id)
            .await?
            .ok_or(Error::UnknownCapture(capture_id))
    }
}
