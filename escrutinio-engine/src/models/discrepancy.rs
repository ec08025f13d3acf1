//! Field-level discrepancies between a generated and an official E-24

/// Which field family the discrepancy affects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscrepancyKind {
    VoteTotal,
    CandidateVote,
    Blank,
    Null,
    Unmarked,
    TableCount,
}

impl DiscrepancyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscrepancyKind::VoteTotal => "vote_total",
            DiscrepancyKind::CandidateVote => "candidate_vote",
            DiscrepancyKind::Blank => "blank",
            DiscrepancyKind::Null => "null",
            DiscrepancyKind::Unmarked => "unmarked",
            DiscrepancyKind::TableCount => "table_count",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vote_total" => Some(DiscrepancyKind::VoteTotal),
            "candidate_vote" => Some(DiscrepancyKind::CandidateVote),
            "blank" => Some(DiscrepancyKind::Blank),
            "null" => Some(DiscrepancyKind::Null),
            "unmarked" => Some(DiscrepancyKind::Unmarked),
            "table_count" => Some(DiscrepancyKind::TableCount),
            _ => None,
        }
    }
}

/// Severity of a field delta, classified against the ballot volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }

    /// Classify a delta: low when |delta| ≤ 2 or ≤ 0.1% of total
    /// ballots, medium up to 1%, high beyond.
    ///
    /// A zero ballot total leaves no percentage to measure against, so
    /// anything past the absolute allowance is high.
    pub fn classify(delta: i64, total_ballots: i64) -> Self {
        let abs = delta.abs();
        if abs <= 2 {
            return Severity::Low;
        }
        if total_ballots <= 0 {
            return Severity::High;
        }
        let percent = abs as f64 / total_ballots as f64 * 100.0;
        if percent <= 0.1 {
            Severity::Low
        } else if percent <= 1.0 {
            Severity::Medium
        } else {
            Severity::High
        }
    }
}

/// One field delta attached to a consolidation
#[derive(Debug, Clone)]
pub struct Discrepancy {
    pub id: i64,
    pub consolidation_id: i64,
    pub kind: DiscrepancyKind,
    pub field_name: String,
    pub generated_value: i64,
    pub official_value: i64,
    pub delta: i64,
    pub severity: Severity,
    pub description: String,
    pub review_status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_small_absolute_delta_is_low() {
        assert_eq!(Severity::classify(1, 64), Severity::Low);
        assert_eq!(Severity::classify(-2, 64), Severity::Low);
        // Small absolute deltas are low even against a tiny total
        assert_eq!(Severity::classify(2, 3), Severity::Low);
    }

    #[test]
    fn test_classify_percentage_bands() {
        // 10 of 20000 = 0.05% -> low
        assert_eq!(Severity::classify(10, 20_000), Severity::Low);
        // 100 of 20000 = 0.5% -> medium
        assert_eq!(Severity::classify(100, 20_000), Severity::Medium);
        // 300 of 20000 = 1.5% -> high
        assert_eq!(Severity::classify(-300, 20_000), Severity::High);
    }

    #[test]
    fn test_classify_boundaries() {
        // Exactly 1% is still medium
        assert_eq!(Severity::classify(200, 20_000), Severity::Medium);
        // Exactly 0.1% is still low
        assert_eq!(Severity::classify(20, 20_000), Severity::Low);
    }

    #[test]
    fn test_classify_zero_total_ballots() {
        assert_eq!(Severity::classify(2, 0), Severity::Low);
        assert_eq!(Severity::classify(3, 0), Severity::High);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            DiscrepancyKind::VoteTotal,
            DiscrepancyKind::CandidateVote,
            DiscrepancyKind::Blank,
            DiscrepancyKind::Null,
            DiscrepancyKind::Unmarked,
            DiscrepancyKind::TableCount,
        ] {
            assert_eq!(DiscrepancyKind::parse(kind.as_str()), Some(kind));
        }
    }
}
