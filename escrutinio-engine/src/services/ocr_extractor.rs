//! OCR extraction front-end
//!
//! Ties preprocessing, external recognition and text parsing into the
//! two-tier contract: a real OCR attempt over the image, falling back
//! to a well-formed zeroed result flagged `needs_manual_entry` whenever
//! the OCR subsystem is unavailable or recognises nothing. This service
//! never fails the capture flow; the witness hand-enters values when
//! recognition comes up empty.

use crate::db::reference;
use crate::models::OcrResult;
use crate::services::preprocess;
use crate::services::tally_parser;
use crate::services::tesseract_client::TesseractClient;
use escrutinio_common::config::OcrConfig;
use escrutinio_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

pub struct OcrExtractor {
    db: SqlitePool,
    config: OcrConfig,
}

impl OcrExtractor {
    pub fn new(db: SqlitePool, config: OcrConfig) -> Self {
        Self { db, config }
    }

    /// Extract a structured tally from an E-14 image.
    ///
    /// The election type selects the expected candidate list, which
    /// only feeds the confidence score; extracted lines are advisory
    /// and never reconciled against reference data here.
    ///
    /// Returns `OCR_IMAGE_UNREADABLE` only when the image bytes do not
    /// decode; every other degraded path yields the manual-entry
    /// fallback result.
    pub async fn extract(&self, image_path: &Path, election_type_id: i64) -> Result<OcrResult> {
        let expected = reference::candidates_for_election_type(&self.db, election_type_id)
            .await?
            .len();

        let client = match TesseractClient::new(self.config.clone()) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("OCR unavailable ({}), falling back to manual entry", e);
                return Ok(OcrResult::manual_entry_fallback());
            }
        };

        let prepared = preprocess::prepare_to_temp_file(image_path)?;

        let recognized = client.recognize(&prepared).await;
        let _ = std::fs::remove_file(&prepared);

        let text = match recognized {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("OCR recognition failed ({}), falling back to manual entry", e);
                return Ok(OcrResult::manual_entry_fallback());
            }
        };

        let (candidates, specials) = tally_parser::parse_e14_text(&text);
        let result = tally_parser::build_result(candidates, specials, expected);

        if result.needs_manual_entry {
            tracing::info!(
                image = %image_path.display(),
                "no candidates recognised, capture flagged for manual entry"
            );
        } else {
            tracing::info!(
                image = %image_path.display(),
                candidates = result.candidates.len(),
                confidence = result.confidence,
                "OCR extraction completed"
            );
        }

        Ok(result)
    }

    /// Parse already-recognised text (used by tests and by re-extraction
    /// tools that keep the raw OCR text around).
    pub async fn extract_from_text(&self, text: &str, election_type_id: i64) -> Result<OcrResult> {
        let expected = reference::candidates_for_election_type(&self.db, election_type_id)
            .await?
            .len();
        let (candidates, specials) = tally_parser::parse_e14_text(text);
        Ok(tally_parser::build_result(candidates, specials, expected))
    }
}
