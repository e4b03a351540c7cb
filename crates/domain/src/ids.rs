//! Id and timestamp helpers shared by sources and the engine.

use crate::primitives::VersionToken;
use chrono::{DateTime, SecondsFormat, Utc};

const TRUNCATE_ABOVE: usize = 20;
const TRUNCATE_KEEP: usize = 8;

/// Stable md5 hex digest of an arbitrary id, for sources whose native ids are
/// too long or unsafe to use directly.
#[must_use]
pub fn hash_id(raw: &str) -> String {
    format!("{:x}", md5::compute(raw.as_bytes()))
}

/// Shorten long ids for log lines: `first8...last8`.
#[must_use]
pub fn truncate_id(id: &str) -> String {
    let count = id.chars().count();
    if count <= TRUNCATE_ABOVE {
        return id.to_string();
    }
    let head: String = id.chars().take(TRUNCATE_KEEP).collect();
    let tail: String = id.chars().skip(count - TRUNCATE_KEEP).collect();
    format!("{head}...{tail}")
}

/// ISO-8601 UTC timestamp with microseconds and `+00:00` offset.
#[must_use]
pub fn iso_utc(when: DateTime<Utc>) -> String {
    when.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Fresh version token for documents that carry none.
#[must_use]
pub fn now_token() -> VersionToken {
    VersionToken::new(iso_utc(Utc::now()))
}
