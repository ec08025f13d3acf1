//! Structured OCR output attached to an E-14 capture

use serde::{Deserialize, Serialize};

/// One candidate line recognised on the tally sheet.
///
/// Labels are raw OCR text; they are advisory and never reconciled
/// against the candidate reference list. The witness-edited values are
/// authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedCandidate {
    pub candidate_identifier: String,
    pub party_label: Option<String>,
    pub ballot_number: Option<i64>,
    pub votes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Blank / null / unmarked counts recognised from keyword-anchored lines
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpecialVotes {
    pub blank: i64,
    pub null: i64,
    pub unmarked: i64,
}

/// Result of one OCR extraction run over a tally-sheet image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    pub candidates: Vec<RecognizedCandidate>,
    pub specials: SpecialVotes,
    /// Fraction of expected candidates matched × 0.9; 0.0 on fallback.
    /// Informational only, never used for automatic acceptance.
    pub confidence: f64,
    /// Set when OCR was unavailable or recognised nothing; the witness
    /// will hand-enter every value.
    pub needs_manual_entry: bool,
}

impl OcrResult {
    /// The deterministic fallback tier: well-formed, zeroed, flagged.
    pub fn manual_entry_fallback() -> Self {
        Self {
            candidates: Vec::new(),
            specials: SpecialVotes::default(),
            confidence: 0.0,
            needs_manual_entry: true,
        }
    }

    /// Sum of recognised per-candidate votes
    pub fn candidate_vote_total(&self) -> i64 {
        self.candidates.iter().map(|c| c.votes).sum()
    }
}
