//! Data models for the recipe version service.
//!
//! Internal records (`Commit`, `Branch`, `Snapshot`) are kept apart from the
//! camelCase descriptors exchanged with clients.

mod branch;
mod commit;
mod recipe;
mod snapshot;

pub use branch::*;
pub use commit::*;
pub use recipe::*;
pub use snapshot::*;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Generate an opaque identifier for a branch or commit.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time at the precision the stores keep.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 text; lexical order matches chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp written by [`format_timestamp`].
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
}
