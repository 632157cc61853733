//! Encodings for the keys of a rule's exception sets.
//!
//! Two encodings exist in stored data:
//!
//! * canonical: the UTC instant as ISO-8601 with milliseconds, `.` replaced
//!   by `,` because the database rejects dots in keys
//!   (`2024-03-11T12:00:00,000Z`);
//! * legacy: the clinic-local wall clock as `YYYY-MM-DDTHH-MM-SS`.
//!
//! Readers accept both. Writers only emit the canonical form.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::models::ExceptionSet;

const LEGACY_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

pub fn canonical_key(instant: DateTime<Utc>) -> String {
    instant
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace('.', ",")
}

pub fn legacy_key(instant: DateTime<Utc>, timezone: Tz) -> String {
    instant.with_timezone(&timezone).format(LEGACY_FORMAT).to_string()
}

/// Every key under which an exception for `instant` may have been stored.
pub fn lookup_keys(instant: DateTime<Utc>, timezone: Tz) -> [String; 2] {
    [canonical_key(instant), legacy_key(instant, timezone)]
}

pub fn is_excepted(set: &ExceptionSet, instant: DateTime<Utc>, timezone: Tz) -> bool {
    lookup_keys(instant, timezone).iter().any(|key| set.contains(key))
}
