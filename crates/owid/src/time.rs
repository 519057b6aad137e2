//! Bidirectional mapping between wall-clock time and OWID's compact "minutes
//! since epoch base" `u32` timestamp.
//!
//! The source this format was distilled from built its epoch base from
//! *local* calendar fields, making the absolute instant host-timezone
//! dependent — an interop hazard flagged as an open question. This crate
//! fixes the interpretation at `2020-01-01T00:00:00Z` (UTC), as the spec's
//! design notes recommend. All participants must agree on this.

use chrono::{DateTime, TimeZone, Utc};

/// The instant from which OWID timestamps are measured, in minutes.
pub fn epoch_base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single().expect("fixed calendar date is always valid")
}

/// Converts a wall-clock instant to the on-wire "minutes since epoch base"
/// representation, flooring any partial minute.
///
/// Returns `None` if `instant` predates the epoch base or the minute count
/// does not fit in a `u32` (roughly 8,171 years after the base).
pub fn to_minutes(instant: DateTime<Utc>) -> Option<u32> {
    let delta = instant.signed_duration_since(epoch_base());
    let minutes = delta.num_milliseconds().div_euclid(60_000);
    u32::try_from(minutes).ok()
}

/// The inverse of [`to_minutes`].
pub fn from_minutes(minutes: u32) -> DateTime<Utc> {
    epoch_base() + chrono::Duration::minutes(i64::from(minutes))
}

/// The current instant expressed as minutes since the epoch base.
///
/// Panics only if the system clock is set before 2020, which would make any
/// OWID signed "now" unrepresentable anyway.
pub fn now_in_minutes() -> u32 {
    to_minutes(Utc::now()).expect("system clock must be at or after the OWID epoch base")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_base_round_trips_to_zero() {
        assert_eq!(to_minutes(epoch_base()), Some(0));
    }

    #[test]
    fn one_hour_is_sixty_minutes() {
        let instant = epoch_base() + chrono::Duration::hours(1);
        assert_eq!(to_minutes(instant), Some(60));
    }

    #[test]
    fn from_minutes_round_trips() {
        let instant = from_minutes(123_456);
        assert_eq!(to_minutes(instant), Some(123_456));
    }

    #[test]
    fn floors_partial_minutes() {
        let instant = epoch_base() + chrono::Duration::seconds(90);
        assert_eq!(to_minutes(instant), Some(1));
    }
}
