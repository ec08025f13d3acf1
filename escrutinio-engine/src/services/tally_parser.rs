//! Recognized-text parsing for E-14 and E-24 tally sheets
//!
//! Tally sheets from different printers lay out candidate lines in a
//! handful of known shapes. Parsing tries a priority-ordered pattern
//! list; the first pattern that matches at least one line wins for the
//! whole run and the rest are not applied. Special-vote totals are
//! captured independently by keyword-anchored patterns over the full
//! text.

use crate::models::{OcrResult, RecognizedCandidate, SpecialVotes};
use once_cell::sync::Lazy;
use regex::Regex;

/// Candidate-line patterns, most specific first.
///
/// Shapes, in priority order:
/// 1. `01 Juan Pérez - Partido Liberal: 145` (ballot, name, party, count)
/// 2. `Juan Pérez García  Partido Liberal  145` (column layout)
/// 3. `PARTIDO LIBERAL - Juan Pérez: 145` (party first)
/// 4. `Juan Pérez García 145` (name and count only)
static CANDIDATE_PATTERNS: Lazy<Vec<(CandidateShape, Regex)>> = Lazy::new(|| {
    vec![
        (
            CandidateShape::BallotNameParty,
            Regex::new(
                r"(?m)^\s*(\d{1,2})\s+([A-ZÁÉÍÓÚÑ][A-Za-zÁ-úñ\s]+?)\s*[-–]\s*([A-ZÁÉÍÓÚÑ][A-Za-zÁ-úñ\s]+?)[\s:]+(\d+)\s*$",
            )
            .expect("ballot-name-party pattern"),
        ),
        (
            CandidateShape::NameParty,
            Regex::new(
                r"(?m)^\s*([A-ZÁÉÍÓÚÑ][A-Za-zÁ-úñ]+(?:\s[A-Za-zÁ-úñ]+){1,4})\s{2,}([A-ZÁÉÍÓÚÑ][A-Za-zÁ-úñ]+(?:\s[A-Za-zÁ-úñ]+){0,4})\s{2,}(\d{1,5})\s*$",
            )
            .expect("name-party pattern"),
        ),
        (
            CandidateShape::PartyName,
            Regex::new(
                r"(?m)^\s*([A-ZÁÉÍÓÚÑ][A-ZÁÉÍÓÚÑa-zá-úñ\s]{4,29})\s*[-–]\s*([A-ZÁÉÍÓÚÑ][A-Za-zÁ-úñ\s]{9,39})[\s:]+(\d+)\s*$",
            )
            .expect("party-name pattern"),
        ),
        (
            CandidateShape::NameOnly,
            Regex::new(
                r"(?m)^\s*([A-ZÁÉÍÓÚÑ][A-Za-zÁ-úñ\s]{14,49})\s+(\d{1,5})\s*$",
            )
            .expect("name-only pattern"),
        ),
    ]
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateShape {
    BallotNameParty,
    NameParty,
    PartyName,
    NameOnly,
}

static BLANK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)VOTOS?\s+EN\s+BLANCO\s*[:\-]?\s*(\d+)",
        r"(?i)EN\s+BLANCO\s*[:\-]?\s*(\d+)",
        r"(?i)BLANCOS?\s*[:\-]?\s*(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("blank-vote pattern"))
    .collect()
});

static NULL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)VOTOS?\s+NULOS?\s*[:\-]?\s*(\d+)",
        r"(?i)TARJETAS?\s+NULAS?\s*[:\-]?\s*(\d+)",
        r"(?i)NULOS?\s*[:\-]?\s*(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("null-vote pattern"))
    .collect()
});

static UNMARKED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)TARJETAS?\s+NO\s+MARCADAS?\s*[:\-]?\s*(\d+)",
        r"(?i)NO\s+MARCADAS?\s*[:\-]?\s*(\d+)",
        r"(?i)SIN\s+MARCAR\s*[:\-]?\s*(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("unmarked pattern"))
    .collect()
});

/// Parse recognised E-14 text into candidate lines and special votes.
pub fn parse_e14_text(text: &str) -> (Vec<RecognizedCandidate>, SpecialVotes) {
    let mut candidates = Vec::new();

    for (shape, pattern) in CANDIDATE_PATTERNS.iter() {
        let matches: Vec<_> = pattern.captures_iter(text).collect();
        if matches.is_empty() {
            continue;
        }
        tracing::debug!(shape = ?shape, lines = matches.len(), "candidate pattern matched");

        for captures in matches {
            let candidate = match shape {
                CandidateShape::BallotNameParty => RecognizedCandidate {
                    candidate_identifier: captures[2].trim().to_string(),
                    party_label: Some(captures[3].trim().to_string()),
                    ballot_number: captures[1].parse().ok(),
                    votes: parse_count(&captures[4]),
                    confidence: None,
                },
                CandidateShape::NameParty => RecognizedCandidate {
                    candidate_identifier: captures[1].trim().to_string(),
                    party_label: Some(captures[2].trim().to_string()),
                    ballot_number: None,
                    votes: parse_count(&captures[3]),
                    confidence: None,
                },
                CandidateShape::PartyName => RecognizedCandidate {
                    candidate_identifier: captures[2].trim().to_string(),
                    party_label: Some(captures[1].trim().to_string()),
                    ballot_number: None,
                    votes: parse_count(&captures[3]),
                    confidence: None,
                },
                CandidateShape::NameOnly => RecognizedCandidate {
                    candidate_identifier: captures[1].trim().to_string(),
                    party_label: None,
                    ballot_number: None,
                    votes: parse_count(&captures[2]),
                    confidence: None,
                },
            };
            candidates.push(candidate);
        }
        // First shape with matches wins for this run
        break;
    }

    (candidates, parse_special_votes(text))
}

/// Special-vote totals; each family tries its keyword patterns in order.
pub fn parse_special_votes(text: &str) -> SpecialVotes {
    SpecialVotes {
        blank: first_count(&BLANK_PATTERNS, text),
        null: first_count(&NULL_PATTERNS, text),
        unmarked: first_count(&UNMARKED_PATTERNS, text),
    }
}

fn first_count(patterns: &[Regex], text: &str) -> i64 {
    for pattern in patterns {
        if let Some(captures) = pattern.captures(text) {
            return parse_count(&captures[1]);
        }
    }
    0
}

fn parse_count(digits: &str) -> i64 {
    digits.trim().parse().unwrap_or(0)
}

/// Assemble an [`OcrResult`] from parsed lines, scoring confidence as
/// the fraction of expected candidates matched × 0.9 (0.0 on fallback).
pub fn build_result(
    candidates: Vec<RecognizedCandidate>,
    specials: SpecialVotes,
    expected_candidates: usize,
) -> OcrResult {
    if candidates.is_empty() {
        return OcrResult::manual_entry_fallback();
    }
    let confidence = if expected_candidates == 0 {
        0.0
    } else {
        (candidates.len().min(expected_candidates) as f64 / expected_candidates as f64) * 0.9
    };
    OcrResult {
        candidates,
        specials,
        confidence,
        needs_manual_entry: false,
    }
}

// ---------------------------------------------------------------------------
// E-24 field extraction (verification side)
// ---------------------------------------------------------------------------

/// Field set shared by generated and official E-24 documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct E24Fields {
    pub total_valid_votes: Option<i64>,
    pub total_blank_votes: Option<i64>,
    pub total_null_votes: Option<i64>,
    pub total_ballots: Option<i64>,
    pub tables_processed: Option<i64>,
}

static E24_VALID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)VOTOS?\s+V[ÁA]LIDOS?\s*[:\-]?\s*(\d+)").expect("e24 valid"));
static E24_BALLOTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)TOTAL\s+(?:TARJETONES|VOTOS)\s*[:\-]?\s*(\d+)").expect("e24 ballots")
});
static E24_TABLES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)MESAS\s+(?:PROCESADAS|ESCRUTADAS)\s*[:\-]?\s*(\d+)").expect("e24 tables")
});

/// Extract the E-24 field set from recognised or rendered text.
pub fn parse_e24_fields(text: &str) -> E24Fields {
    let specials = parse_special_votes(text);
    E24Fields {
        total_valid_votes: E24_VALID.captures(text).map(|c| parse_count(&c[1])),
        total_blank_votes: BLANK_PATTERNS
            .iter()
            .any(|p| p.is_match(text))
            .then_some(specials.blank),
        total_null_votes: NULL_PATTERNS
            .iter()
            .any(|p| p.is_match(text))
            .then_some(specials.null),
        total_ballots: E24_BALLOTS.captures(text).map(|c| parse_count(&c[1])),
        tables_processed: E24_TABLES.captures(text).map(|c| parse_count(&c[1])),
    }
}

impl E24Fields {
    /// A document with none of the expected labels is unreadable for
    /// verification purposes.
    pub fn is_empty(&self) -> bool {
        self.total_valid_votes.is_none()
            && self.total_blank_votes.is_none()
            && self.total_null_votes.is_none()
            && self.total_ballots.is_none()
            && self.tables_processed.is_none()
    }
}
