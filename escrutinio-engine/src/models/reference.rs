//! Reference data: geography, election types, parties, candidates, witnesses
//!
//! Read-only to the pipeline; populated at setup time by importers
//! outside the core.

/// Municipality, the aggregation unit for E-24 consolidation
#[derive(Debug, Clone)]
pub struct Municipality {
    pub id: i64,
    pub name: String,
    pub divipola_code: Option<String>,
    pub active: bool,
}

/// Physical location hosting one or more polling tables
#[derive(Debug, Clone)]
pub struct PollingPlace {
    pub id: i64,
    pub municipality_id: i64,
    pub name: String,
    pub address: Option<String>,
    pub active: bool,
}

/// The smallest voting unit. Immutable after setup.
#[derive(Debug, Clone)]
pub struct PollingTable {
    pub id: i64,
    pub polling_place_id: i64,
    pub table_number: i64,
    pub enrolled_voters: i64,
    pub active: bool,
}

/// Election type (senate, house, mayoral, ...) selecting a candidate set
#[derive(Debug, Clone)]
pub struct ElectionType {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub active: bool,
}

/// A single election event; multiple election types may run under it
#[derive(Debug, Clone)]
pub struct ElectoralProcess {
    pub id: i64,
    pub name: String,
    pub held_on: Option<String>,
    pub status: String,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct Party {
    pub id: i64,
    pub name: String,
    pub abbreviation: Option<String>,
    pub active: bool,
}

/// Candidate affiliation. Exactly one applies per candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affiliation {
    Party,
    Coalition,
    Independent,
}

impl Affiliation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Affiliation::Party => "party",
            Affiliation::Coalition => "coalition",
            Affiliation::Independent => "independent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "party" => Some(Affiliation::Party),
            "coalition" => Some(Affiliation::Coalition),
            "independent" => Some(Affiliation::Independent),
            _ => None,
        }
    }
}

/// Candidate scoped to one election type; `ballot_number` is unique
/// within that election type.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: i64,
    pub national_id: String,
    pub full_name: String,
    pub affiliation: Affiliation,
    pub party_id: Option<i64>,
    pub coalition_name: Option<String>,
    pub election_type_id: i64,
    pub ballot_number: i64,
    pub active: bool,
}

/// Person authorised to record E-14s on behalf of a party
#[derive(Debug, Clone)]
pub struct Witness {
    pub id: i64,
    pub national_id: String,
    pub full_name: String,
    pub coordinator_id: Option<i64>,
    pub active: bool,
}
