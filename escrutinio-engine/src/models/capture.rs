//! E-14 capture records

/// Lifecycle state of an E-14 capture.
///
/// `captured` records are freely editable; `confirmed` records are
/// immutable; `superseded` records are audit-preserved and excluded
/// from aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Captured,
    Confirmed,
    Superseded,
}

impl CaptureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureStatus::Captured => "captured",
            CaptureStatus::Confirmed => "confirmed",
            CaptureStatus::Superseded => "superseded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "captured" => Some(CaptureStatus::Captured),
            "confirmed" => Some(CaptureStatus::Confirmed),
            "superseded" => Some(CaptureStatus::Superseded),
            _ => None,
        }
    }
}

/// Per-candidate vote row on a capture
#[derive(Debug, Clone)]
pub struct CandidateVote {
    pub id: i64,
    pub capture_id: i64,
    pub candidate_label: String,
    pub party_label: Option<String>,
    pub ballot_number: Option<i64>,
    pub votes: i64,
    pub ocr_confidence: Option<f64>,
}

/// The per-table tally record, keyed by (polling_table, election_type)
#[derive(Debug, Clone)]
pub struct E14Capture {
    pub id: i64,
    pub polling_table_id: i64,
    pub election_type_id: i64,
    pub image_ref: String,
    pub blank_votes: i64,
    pub null_votes: i64,
    pub unmarked_ballots: i64,
    pub observations: Option<String>,
    pub status: CaptureStatus,
    pub needs_manual_entry: bool,
    pub ocr_confidence: f64,
    pub captured_by: i64,
    pub captured_at: String,
    pub confirmed_by: Option<i64>,
    pub confirmed_at: Option<String>,
    pub superseded_at: Option<String>,
    pub supersede_reason: Option<String>,
}

/// Witness corrections applied to a `captured`-state record.
///
/// `None` fields are left untouched; candidate rows are addressed by
/// their row id.
#[derive(Debug, Clone, Default)]
pub struct CaptureEdits {
    pub candidate_votes: Vec<(i64, i64)>,
    pub blank_votes: Option<i64>,
    pub null_votes: Option<i64>,
    pub unmarked_ballots: Option<i64>,
    pub observations: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_status_round_trip() {
        for status in [
            CaptureStatus::Captured,
            CaptureStatus::Confirmed,
            CaptureStatus::Superseded,
        ] {
            assert_eq!(CaptureStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CaptureStatus::parse("pending"), None);
    }
}
