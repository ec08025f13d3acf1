//! E-24 verification engine
//!
//! Compares a completed consolidation field-by-field against the
//! officially issued E-24 and attaches classified discrepancies.
//! Re-verification discards the previous discrepancy set and recomputes
//! it, so the set always reflects the current official image.

use crate::db::{audit, consolidations, discrepancies};
use crate::models::{
    Consolidation, ConsolidationStatus, Discrepancy, DiscrepancyKind, Severity, VerificationStatus,
};
use crate::services::tally_parser::{self, E24Fields};
use crate::services::tesseract_client::TesseractClient;
use escrutinio_common::config::OcrConfig;
use escrutinio_common::events::{EventBus, ScrutinyEvent};
use escrutinio_common::{time, Error, Result};
use sqlx::SqlitePool;
use std::path::Path;

pub struct VerificationEngine {
    db: SqlitePool,
    event_bus: EventBus,
    ocr_config: OcrConfig,
}

/// Outcome of a verification pass
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub consolidation_id: i64,
    pub verification_status: VerificationStatus,
    pub discrepancies: Vec<Discrepancy>,
}

impl VerificationEngine {
    pub fn new(db: SqlitePool, event_bus: EventBus, ocr_config: OcrConfig) -> Self {
        Self {
            db,
            event_bus,
            ocr_config,
        }
    }

    /// Store the official E-24 image reference ahead of verification.
    pub async fn attach_official_e24(
        &self,
        consolidation_id: i64,
        image_ref: &str,
        user: i64,
    ) -> Result<()> {
        consolidations::set_official_e24_ref(&self.db, consolidation_id, image_ref).await?;

        audit::record_lossy(
            &self.db,
            user,
            "attach_official_e24",
            "consolidation",
            consolidation_id,
            image_ref,
        )
        .await;

        Ok(())
    }

    /// Verify a consolidation against its attached official E-24.
    ///
    /// Requires the consolidation to be complete. The official document
    /// is parsed directly when it is a text-layout E-24 and OCR'd when
    /// it is a raster image; a document yielding none of the expected
    /// fields is reported unreadable and nothing is changed.
    pub async fn verify(&self, consolidation_id: i64, user: i64) -> Result<VerificationOutcome> {
        let consolidation = consolidations::load(&self.db, consolidation_id)
            .await?
            .ok_or(Error::UnknownConsolidation(consolidation_id))?;

        if consolidation.status != ConsolidationStatus::Completed {
            return Err(Error::VerificationRequiresCompleteConsolidation(consolidation_id));
        }

        let official_ref = consolidation
            .official_e24_ref
            .clone()
            .ok_or(Error::MissingOfficialE24(consolidation_id))?;

        let official = self.read_official_fields(Path::new(&official_ref)).await?;
        let deltas = field_deltas(&consolidation, &official);

        // Delete-and-replace inside one transaction so the stored set
        // always matches the freshly computed one.
        let mut tx = self.db.begin().await?;
        discrepancies::delete_for_consolidation(&mut *tx, consolidation_id).await?;
        for delta in &deltas {
            discrepancies::insert(
                &mut *tx,
                &discrepancies::NewDiscrepancy {
                    consolidation_id,
                    kind: delta.kind,
                    field_name: delta.field_name,
                    generated_value: delta.generated,
                    official_value: delta.official,
                    delta: delta.delta,
                    severity: delta.severity,
                    description: &delta.description,
                },
            )
            .await?;
        }

        let verification_status = if deltas.is_empty() {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Discrepancies
        };
        consolidations::write_verification(
            &mut *tx,
            consolidation_id,
            verification_status,
            user,
            &time::now_iso(),
        )
        .await?;
        tx.commit().await?;

        let stored = discrepancies::list_for_consolidation(&self.db, consolidation_id).await?;

        tracing::info!(
            consolidation_id,
            discrepancies = stored.len(),
            status = verification_status.as_str(),
            "verification completed"
        );

        audit::record_lossy(
            &self.db,
            user,
            "verify_e24",
            "consolidation",
            consolidation_id,
            &format!("{} discrepancies", stored.len()),
        )
        .await;

        self.event_bus.emit_lossy(ScrutinyEvent::VerificationCompleted {
            consolidation_id,
            discrepancy_count: stored.len(),
            verified: verification_status == VerificationStatus::Verified,
            timestamp: time::now(),
        });

        Ok(VerificationOutcome {
            consolidation_id,
            verification_status,
            discrepancies: stored,
        })
    }

    pub async fn discrepancies(&self, consolidation_id: i64) -> Result<Vec<Discrepancy>> {
        discrepancies::list_for_consolidation(&self.db, consolidation_id).await
    }

    /// Extract the E-24 field set from the official document. Text
    /// documents (the layout E-24s are issued in) parse directly;
    /// raster images go through the OCR tier first.
    async fn read_official_fields(&self, official_path: &Path) -> Result<E24Fields> {
        if !official_path.exists() {
            return Err(Error::OcrImageUnreadable(format!(
                "official E-24 not found: {}",
                official_path.display()
            )));
        }

        if let Ok(text) = std::fs::read_to_string(official_path) {
            let fields = tally_parser::parse_e24_fields(&text);
            if !fields.is_empty() {
                return Ok(fields);
            }
        }

        // Not a readable text layout; try recognition
        let client = TesseractClient::new(self.ocr_config.clone()).map_err(|e| {
            Error::OcrImageUnreadable(format!(
                "official E-24 is not text and OCR is unavailable: {}",
                e
            ))
        })?;
        let prepared = crate::services::preprocess::prepare_to_temp_file(official_path)?;
        let recognized = client.recognize(&prepared).await;
        let _ = std::fs::remove_file(&prepared);

        let text = recognized
            .map_err(|e| Error::OcrImageUnreadable(format!("official E-24 recognition: {}", e)))?;
        let fields = tally_parser::parse_e24_fields(&text);
        if fields.is_empty() {
            return Err(Error::OcrImageUnreadable(format!(
                "no E-24 fields recognised in {}",
                official_path.display()
            )));
        }
        Ok(fields)
    }
}

struct FieldDelta {
    kind: DiscrepancyKind,
    field_name: &'static str,
    generated: i64,
    official: i64,
    delta: i64,
    severity: Severity,
    description: String,
}

/// Diff the generated record against the official field set. Fields the
/// official document does not carry are skipped rather than treated as
/// zero.
fn field_deltas(consolidation: &Consolidation, official: &E24Fields) -> Vec<FieldDelta> {
    let comparisons: [(DiscrepancyKind, &'static str, i64, Option<i64>); 5] = [
        (
            DiscrepancyKind::VoteTotal,
            "total_valid_votes",
            consolidation.total_valid_votes,
            official.total_valid_votes,
        ),
        (
            DiscrepancyKind::Blank,
            "total_blank_votes",
            consolidation.total_blank_votes,
            official.total_blank_votes,
        ),
        (
            DiscrepancyKind::Null,
            "total_null_votes",
            consolidation.total_null_votes,
            official.total_null_votes,
        ),
        (
            DiscrepancyKind::VoteTotal,
            "total_ballots",
            consolidation.total_ballots,
            official.total_ballots,
        ),
        (
            DiscrepancyKind::TableCount,
            "tables_processed",
            consolidation.tables_processed,
            official.tables_processed,
        ),
    ];

    comparisons
        .into_iter()
        .filter_map(|(kind, field_name, generated, official_value)| {
            let official_value = official_value?;
            let delta = generated - official_value;
            if delta == 0 {
                return None;
            }
            let severity = Severity::classify(delta, consolidation.total_ballots);
            Some(FieldDelta {
                kind,
                field_name,
                generated,
                official: official_value,
                delta,
                severity,
                description: format!(
                    "{}: generated {} vs official {} (delta {})",
                    field_name, generated, official_value, delta
                ),
            })
        })
        .collect()
}
