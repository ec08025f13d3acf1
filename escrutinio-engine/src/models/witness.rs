//! Witness-to-table assignments

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentRole {
    Principal,
    Alternate,
}

impl AssignmentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentRole::Principal => "principal",
            AssignmentRole::Alternate => "alternate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "principal" => Some(AssignmentRole::Principal),
            "alternate" => Some(AssignmentRole::Alternate),
            _ => None,
        }
    }
}

/// Assignment lifecycle. `reassigned` ends the assignment and frees the
/// table's principal slot; every other status counts as active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStatus {
    Assigned,
    Confirmed,
    Present,
    Absent,
    Reassigned,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::Confirmed => "confirmed",
            AssignmentStatus::Present => "present",
            AssignmentStatus::Absent => "absent",
            AssignmentStatus::Reassigned => "reassigned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "assigned" => Some(AssignmentStatus::Assigned),
            "confirmed" => Some(AssignmentStatus::Confirmed),
            "present" => Some(AssignmentStatus::Present),
            "absent" => Some(AssignmentStatus::Absent),
            "reassigned" => Some(AssignmentStatus::Reassigned),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, AssignmentStatus::Reassigned)
    }

    /// Legal transitions: assigned -> confirmed; assigned|confirmed ->
    /// present|absent; anything active -> reassigned.
    pub fn can_transition_to(&self, to: AssignmentStatus) -> bool {
        match (self, to) {
            (AssignmentStatus::Assigned, AssignmentStatus::Confirmed) => true,
            (
                AssignmentStatus::Assigned | AssignmentStatus::Confirmed,
                AssignmentStatus::Present | AssignmentStatus::Absent,
            ) => true,
            (from, AssignmentStatus::Reassigned) => from.is_active(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WitnessAssignment {
    pub id: i64,
    pub witness_id: i64,
    pub polling_table_id: i64,
    pub electoral_process_id: i64,
    pub role: AssignmentRole,
    pub status: AssignmentStatus,
    pub assigned_at: String,
}

/// Coverage of one polling table in a coverage report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCoverage {
    pub table_id: i64,
    pub table_number: i64,
    pub polling_place_id: i64,
    pub polling_place_name: String,
    pub has_active_principal: bool,
}

/// Per-polling-place rollup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceCoverage {
    pub polling_place_id: i64,
    pub polling_place_name: String,
    pub covered_tables: i64,
    pub total_tables: i64,
}

/// Coverage report for a municipality under one electoral process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    pub municipality_id: i64,
    pub electoral_process_id: i64,
    pub tables: Vec<TableCoverage>,
    pub places: Vec<PlaceCoverage>,
    pub covered_tables: i64,
    pub total_tables: i64,
}

impl CoverageReport {
    pub fn coverage_percent(&self) -> f64 {
        if self.total_tables == 0 {
            return 0.0;
        }
        self.covered_tables as f64 / self.total_tables as f64 * 100.0
    }

    /// Tables still lacking an active principal witness
    pub fn uncovered(&self) -> impl Iterator<Item = &TableCoverage> {
        self.tables.iter().filter(|t| !t.has_active_principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_transitions() {
        assert!(AssignmentStatus::Assigned.can_transition_to(AssignmentStatus::Confirmed));
        assert!(AssignmentStatus::Assigned.can_transition_to(AssignmentStatus::Present));
        assert!(AssignmentStatus::Confirmed.can_transition_to(AssignmentStatus::Absent));
        assert!(AssignmentStatus::Present.can_transition_to(AssignmentStatus::Reassigned));
        assert!(AssignmentStatus::Absent.can_transition_to(AssignmentStatus::Reassigned));

        assert!(!AssignmentStatus::Present.can_transition_to(AssignmentStatus::Confirmed));
        assert!(!AssignmentStatus::Reassigned.can_transition_to(AssignmentStatus::Assigned));
        assert!(!AssignmentStatus::Reassigned.can_transition_to(AssignmentStatus::Reassigned));
    }

    #[test]
    fn test_active_statuses() {
        assert!(AssignmentStatus::Assigned.is_active());
        assert!(AssignmentStatus::Absent.is_active());
        assert!(!AssignmentStatus::Reassigned.is_active());
    }

    #[test]
    fn test_coverage_percent() {
        let report = CoverageReport {
            municipality_id: 1,
            electoral_process_id: 1,
            tables: vec![],
            places: vec![],
            covered_tables: 3,
            total_tables: 4,
        };
        assert_eq!(report.coverage_percent(), 75.0);
    }
}
