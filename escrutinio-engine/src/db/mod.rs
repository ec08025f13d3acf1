//! Database access for escrutinio-engine
//!
//! Thin sqlx accessors over the shared SQLite schema. Services own all
//! invariant checking; these functions only move rows.

pub mod audit;
pub mod captures;
pub mod claims;
pub mod consolidations;
pub mod discrepancies;
pub mod reference;
pub mod witnesses;
