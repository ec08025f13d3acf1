//! Formal claims raised from verification discrepancies

/// Claim lifecycle.
///
/// Forward-only except for `under_review -> sent` (re-submission);
/// `resolved` and `rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    Generated,
    Sent,
    UnderReview,
    Resolved,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Generated => "generated",
            ClaimStatus::Sent => "sent",
            ClaimStatus::UnderReview => "under_review",
            ClaimStatus::Resolved => "resolved",
            ClaimStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generated" => Some(ClaimStatus::Generated),
            "sent" => Some(ClaimStatus::Sent),
            "under_review" => Some(ClaimStatus::UnderReview),
            "resolved" => Some(ClaimStatus::Resolved),
            "rejected" => Some(ClaimStatus::Rejected),
            _ => None,
        }
    }

    /// Whether the transition `self -> to` is legal
    pub fn can_transition_to(&self, to: ClaimStatus) -> bool {
        matches!(
            (self, to),
            (ClaimStatus::Generated, ClaimStatus::Sent)
                | (ClaimStatus::Sent, ClaimStatus::UnderReview)
                | (ClaimStatus::UnderReview, ClaimStatus::Resolved)
                | (ClaimStatus::UnderReview, ClaimStatus::Rejected)
                | (ClaimStatus::UnderReview, ClaimStatus::Sent)
        )
    }
}

#[derive(Debug, Clone)]
pub struct Claim {
    pub id: i64,
    pub consolidation_id: i64,
    pub claim_number: String,
    pub kind: String,
    pub description: String,
    pub issued_to: String,
    pub status: ClaimStatus,
    pub created_by: i64,
    pub created_at: String,
    pub sent_at: Option<String>,
    pub reviewed_at: Option<String>,
    pub closed_at: Option<String>,
    pub last_transition_by: Option<i64>,
}
