// src/clock.rs
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Zone the event table is published in.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Sao_Paulo;

/// Wall-clock source in the same local time the event table is written in.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Where "now" is read from: a named IANA zone or the host's local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockZone {
    Named(Tz),
    Local,
}

impl Default for ClockZone {
    fn default() -> Self {
        ClockZone::Named(DEFAULT_TIMEZONE)
    }
}

impl ClockZone {
    /// `"local"` (any case) or an IANA name such as `America/Sao_Paulo`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("local") {
            return Some(ClockZone::Local);
        }
        raw.parse::<Tz>().ok().map(ClockZone::Named)
    }

    /// Wall-clock reading of `instant` in this zone.
    pub fn wall_clock(self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            ClockZone::Named(tz) => instant.with_timezone(&tz).naive_local(),
            ClockZone::Local => instant.with_timezone(&Local).naive_local(),
        }
    }
}

impl std::fmt::Display for ClockZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClockZone::Named(tz) => f.write_str(tz.name()),
            ClockZone::Local => f.write_str("local"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    zone: ClockZone,
}

impl SystemClock {
    pub fn new(zone: ClockZone) -> Self {
        Self { zone }
    }

    pub fn local() -> Self {
        Self::new(ClockZone::Local)
    }

    pub fn zone(&self) -> ClockZone {
        self.zone
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        self.zone.wall_clock(Utc::now())
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: NaiveDateTime) {
        *self.now.lock().expect("clock mutex poisoned") = to;
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().expect("clock mutex poisoned")
    }
}
