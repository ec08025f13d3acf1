//! Common error types for escrutinio

use thiserror::Error;

/// Common result type for escrutinio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the escrutinio core.
///
/// Every public operation returns one of these; there is no exception-based
/// control flow across component boundaries. `kind()` yields the stable
/// machine-readable tag callers dispatch on.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Referenced polling table does not exist
    #[error("Unknown polling table: {0}")]
    UnknownTable(i64),

    /// Referenced election type does not exist
    #[error("Unknown election type: {0}")]
    UnknownElectionType(i64),

    /// Referenced E-14 capture does not exist
    #[error("Unknown capture: {0}")]
    UnknownCapture(i64),

    /// Referenced consolidation does not exist
    #[error("Unknown consolidation: {0}")]
    UnknownConsolidation(i64),

    /// Referenced claim does not exist
    #[error("Unknown claim: {0}")]
    UnknownClaim(i64),

    /// Referenced witness does not exist or is inactive
    #[error("Unknown witness: {0}")]
    UnknownWitness(i64),

    /// Referenced witness assignment does not exist
    #[error("Unknown witness assignment: {0}")]
    UnknownAssignment(i64),

    /// Ballot number already used within the election type
    #[error("Ballot number {ballot_number} already taken for election type {election_type_id}")]
    BallotNumberTaken {
        election_type_id: i64,
        ballot_number: i64,
    },

    /// Confirming this capture would leave two confirmed E-14s for the table
    #[error("Polling table {table_id} already has a confirmed E-14 for election type {election_type_id}")]
    TableAlreadyHasConfirmedCapture {
        table_id: i64,
        election_type_id: i64,
    },

    /// The confirmed-capture unique index rejected a concurrent confirm
    #[error("Duplicate confirmed capture for table {table_id}, election type {election_type_id}")]
    DuplicateConfirmedCapture {
        table_id: i64,
        election_type_id: i64,
    },

    /// Capture is confirmed and therefore immutable
    #[error("Capture {0} is confirmed and cannot be edited")]
    EditOnConfirmed(i64),

    /// Capture is already in the confirmed state
    #[error("Capture {0} is already confirmed")]
    AlreadyConfirmed(i64),

    /// Only confirmed captures can be superseded
    #[error("Capture {0} is not confirmed and cannot be superseded")]
    SupersedeOnUnconfirmed(i64),

    /// The consolidation transaction was rejected; the caller should retry
    #[error("Consolidation {0} could not be committed, retry required")]
    ConsolidationRetryRequired(i64),

    /// Referential data is inconsistent (e.g. capture pointing at a missing table)
    #[error("Data integrity violation: {0}")]
    DataIntegrityViolation(String),

    /// Verification requires the consolidation to cover every expected table
    #[error("Consolidation {0} is not complete; verification requires all tables processed")]
    VerificationRequiresCompleteConsolidation(i64),

    /// No official E-24 image has been attached to the consolidation
    #[error("Consolidation {0} has no official E-24 attached")]
    MissingOfficialE24(i64),

    /// The image could not be decoded or yielded no usable text
    #[error("Image unreadable: {0}")]
    OcrImageUnreadable(String),

    /// Claims can only be raised against consolidations with discrepancies
    #[error("Consolidation {0} has no discrepancies to claim")]
    NoDiscrepanciesToClaim(i64),

    /// The requested claim status transition is not legal
    #[error("Illegal claim transition from {from} to {to}")]
    IllegalClaimTransition { from: String, to: String },

    /// The polling table already has an active principal witness
    #[error("Polling table {table_id} already has an active principal witness for process {process_id}")]
    PrincipalWitnessAlreadyAssigned { table_id: i64, process_id: i64 },

    /// The requested assignment status transition is not legal
    #[error("Illegal assignment transition from {from} to {to}")]
    IllegalAssignmentTransition { from: String, to: String },

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable tag for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Database(_) => "DATABASE_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::UnknownTable(_) => "UNKNOWN_TABLE",
            Error::UnknownElectionType(_) => "UNKNOWN_ELECTION_TYPE",
            Error::UnknownCapture(_) => "UNKNOWN_CAPTURE",
            Error::UnknownConsolidation(_) => "UNKNOWN_CONSOLIDATION",
            Error::UnknownClaim(_) => "UNKNOWN_CLAIM",
            Error::UnknownWitness(_) => "UNKNOWN_WITNESS",
            Error::UnknownAssignment(_) => "UNKNOWN_ASSIGNMENT",
            Error::BallotNumberTaken { .. } => "BALLOT_NUMBER_TAKEN",
            Error::TableAlreadyHasConfirmedCapture { .. } => "TABLE_ALREADY_HAS_CONFIRMED_CAPTURE",
            Error::DuplicateConfirmedCapture { .. } => "DUPLICATE_CONFIRMED_CAPTURE",
            Error::EditOnConfirmed(_) => "EDIT_ON_CONFIRMED",
            Error::AlreadyConfirmed(_) => "ALREADY_CONFIRMED",
            Error::SupersedeOnUnconfirmed(_) => "SUPERSEDE_ON_UNCONFIRMED",
            Error::ConsolidationRetryRequired(_) => "CONSOLIDATION_RETRY_REQUIRED",
            Error::DataIntegrityViolation(_) => "DATA_INTEGRITY_VIOLATION",
            Error::VerificationRequiresCompleteConsolidation(_) => {
                "VERIFICATION_REQUIRES_COMPLETE_CONSOLIDATION"
            }
            Error::MissingOfficialE24(_) => "MISSING_OFFICIAL_E24",
            Error::OcrImageUnreadable(_) => "OCR_IMAGE_UNREADABLE",
            Error::NoDiscrepanciesToClaim(_) => "NO_DISCREPANCIES_TO_CLAIM",
            Error::IllegalClaimTransition { .. } => "ILLEGAL_CLAIM_TRANSITION",
            Error::PrincipalWitnessAlreadyAssigned { .. } => "PRINCIPAL_WITNESS_ALREADY_ASSIGNED",
            Error::IllegalAssignmentTransition { .. } => "ILLEGAL_ASSIGNMENT_TRANSITION",
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for transient failures the caller is expected to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConsolidationRetryRequired(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_stable() {
        assert_eq!(
            Error::TableAlreadyHasConfirmedCapture {
                table_id: 1,
                election_type_id: 2
            }
            .kind(),
            "TABLE_ALREADY_HAS_CONFIRMED_CAPTURE"
        );
        assert_eq!(Error::EditOnConfirmed(7).kind(), "EDIT_ON_CONFIRMED");
        assert_eq!(
            Error::ConsolidationRetryRequired(3).kind(),
            "CONSOLIDATION_RETRY_REQUIRED"
        );
        assert_eq!(
            Error::IllegalClaimTransition {
                from: "sent".into(),
                to: "generated".into()
            }
            .kind(),
            "ILLEGAL_CLAIM_TRANSITION"
        );
    }

    #[test]
    fn test_only_consolidation_retry_is_retryable() {
        assert!(Error::ConsolidationRetryRequired(1).is_retryable());
        assert!(!Error::DataIntegrityViolation("orphan capture".into()).is_retryable());
        assert!(!Error::AlreadyConfirmed(1).is_retryable());
    }
}
