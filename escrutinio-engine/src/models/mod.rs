//! Domain model types

pub mod capture;
pub mod claim;
pub mod consolidation;
pub mod discrepancy;
pub mod ocr;
pub mod reference;
pub mod witness;

pub use capture::{CaptureEdits, CaptureStatus, CandidateVote, E14Capture};
pub use claim::{Claim, ClaimStatus};
pub use consolidation::{
    Consolidation, ConsolidationStatus, ConsolidationSummary, MunicipalStatus, VerificationStatus,
};
pub use discrepancy::{Discrepancy, DiscrepancyKind, Severity};
pub use ocr::{OcrResult, RecognizedCandidate, SpecialVotes};
pub use reference::{
    Affiliation, Candidate, ElectionType, ElectoralProcess, Municipality, Party, PollingPlace,
    PollingTable, Witness,
};
pub use witness::{AssignmentRole, AssignmentStatus, WitnessAssignment};
