//! E-24 consolidation records

use serde::{Deserialize, Serialize};

/// Progress state of a consolidation.
///
/// `completed` holds exactly when every expected table has a confirmed
/// capture folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolidationStatus {
    Pending,
    Consolidating,
    Completed,
}

impl ConsolidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsolidationStatus::Pending => "pending",
            ConsolidationStatus::Consolidating => "consolidating",
            ConsolidationStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ConsolidationStatus::Pending),
            "consolidating" => Some(ConsolidationStatus::Consolidating),
            "completed" => Some(ConsolidationStatus::Completed),
            _ => None,
        }
    }
}

/// Outcome of comparing the generated E-24 against the official one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    NotVerified,
    Verified,
    Discrepancies,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::NotVerified => "not_verified",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Discrepancies => "discrepancies",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_verified" => Some(VerificationStatus::NotVerified),
            "verified" => Some(VerificationStatus::Verified),
            "discrepancies" => Some(VerificationStatus::Discrepancies),
            _ => None,
        }
    }
}

/// The aggregation record, one per (municipality, election type, process)
#[derive(Debug, Clone)]
pub struct Consolidation {
    pub id: i64,
    pub municipality_id: i64,
    pub election_type_id: i64,
    pub electoral_process_id: i64,
    pub total_tables_expected: i64,
    pub tables_processed: i64,
    pub total_valid_votes: i64,
    pub total_blank_votes: i64,
    pub total_null_votes: i64,
    pub total_unmarked: i64,
    pub total_ballots: i64,
    pub status: ConsolidationStatus,
    pub verification_status: VerificationStatus,
    pub generated_e24_ref: Option<String>,
    pub official_e24_ref: Option<String>,
    pub started_by: Option<i64>,
    pub verified_by: Option<i64>,
    pub started_at: Option<String>,
    pub last_consolidated_at: Option<String>,
    pub verified_at: Option<String>,
}

impl Consolidation {
    /// Completion fraction in percent, 0 when no tables are expected
    pub fn progress_percent(&self) -> f64 {
        if self.total_tables_expected == 0 {
            return 0.0;
        }
        self.tables_processed as f64 / self.total_tables_expected as f64 * 100.0
    }
}

/// Totals returned by a consolidation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationSummary {
    pub consolidation_id: i64,
    pub tables_processed: i64,
    pub total_tables_expected: i64,
    pub total_valid_votes: i64,
    pub total_blank_votes: i64,
    pub total_null_votes: i64,
    pub total_unmarked: i64,
    pub total_ballots: i64,
    pub completed: bool,
}

/// Municipality-wide consolidation rollup for coordinator dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MunicipalStatus {
    pub municipality_id: i64,
    pub total_consolidations: i64,
    pub completed: i64,
    pub consolidating: i64,
    pub pending: i64,
    pub total_tables_expected: i64,
    pub tables_processed: i64,
    pub total_ballots: i64,
    pub pending_discrepancies: i64,
    pub active_claims: i64,
}

impl MunicipalStatus {
    pub fn overall_progress_percent(&self) -> f64 {
        if self.total_tables_expected == 0 {
            return 0.0;
        }
        self.tables_processed as f64 / self.total_tables_expected as f64 * 100.0
    }
}
