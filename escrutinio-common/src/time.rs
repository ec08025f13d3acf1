//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC timestamp as ISO-8601 text, the format stored in TEXT columns
pub fn now_iso() -> String {
    now().to_rfc3339()
}

/// Compact `YYYYMMDDhhmmss` stamp used in claim numbers and artifact names
pub fn compact_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}
