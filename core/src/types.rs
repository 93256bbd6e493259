//! Job field names and the JSON shape jobs travel in.
//!
//! # Design
//! Jobs are kept as an open `serde_json::Map` instead of a fixed struct: the
//! platform defines dozens of fields and adds new ones, and every field must
//! round-trip verbatim. Typed accessors on `Job` cover the well-known ones.

use serde_json::{Map, Value};

/// A job (or a partial job) as a JSON object.
pub type JobData = Map<String, Value>;

pub const FIELD_ID: &str = "id";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_INSTRUCTIONS: &str = "instructions";
pub const FIELD_CML: &str = "cml";

/// Server-managed fields. Local writes to these are rejected.
pub const READ_ONLY_FIELDS: &[&str] = &[
    "completed",
    "completed_at",
    "created_at",
    "gold",
    "golds_count",
    FIELD_ID,
    "judgments_count",
    "units_count",
    "updated_at",
];

pub fn is_read_only(field: &str) -> bool {
    READ_ONLY_FIELDS.contains(&field)
}

/// Extract a job id from a JSON object. The platform sends integers, but
/// numeric strings are accepted too.
pub fn job_id(data: &JobData) -> Option<u64> {
    match data.get(FIELD_ID)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
