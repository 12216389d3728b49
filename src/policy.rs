// src/policy.rs
//! # Delivery Policy
//! Pure rules deciding *whether* an event is due for notification at a given
//! instant and in *which order* simultaneously due events go out. No I/O.
//!
//! An event at `t` is eligible for `now` in the half-open window
//! `[t - LEAD_WINDOW, t)`. Order is High, Medium, Low; ties keep table order.

use chrono::{Duration as ChronoDuration, NaiveDateTime};

use crate::table::EventRecord;

/// Lead window length in seconds (5 minutes).
pub const LEAD_WINDOW_SECS: i64 = 5 * 60;

pub fn lead_window() -> ChronoDuration {
    ChronoDuration::seconds(LEAD_WINDOW_SECS)
}

/// `event_at - LEAD_WINDOW <= now < event_at`
pub fn is_eligible(event_at: NaiveDateTime, now: NaiveDateTime) -> bool {
    event_at - lead_window() <= now && now < event_at
}

/// Eligible records, in table order.
pub fn select<'a, I>(records: I, now: NaiveDateTime) -> Vec<&'a EventRecord>
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    records
        .into_iter()
        .filter(|r| is_eligible(r.scheduled_at(), now))
        .collect()
}

/// Stable sort by importance rank.
pub fn order(records: &mut [&EventRecord]) {
    records.sort_by_key(|r| r.importance.rank());
}
