// src/dedup.rs
use std::collections::HashSet;
use std::fmt;

use chrono::{NaiveDate, NaiveTime};

use crate::table::{DATE_FORMAT, TIME_FORMAT};

/// Delivery key of an event: `"<dd/mm/yyyy> <HH:MM> <name>"`.
///
/// Two rows sharing date, time and name map to the same identity and are
/// delivered once between them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlertIdentity(String);

impl AlertIdentity {
    pub fn new(date: NaiveDate, time: NaiveTime, name: &str) -> Self {
        Self(format!(
            "{} {} {}",
            date.format(DATE_FORMAT),
            time.format(TIME_FORMAT),
            name
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Append-only set of identities already handed to the sink.
///
/// There is no removal: an identity leaves eligibility only by being marked.
#[derive(Debug, Default)]
pub struct DedupStore {
    dispatched: HashSet<AlertIdentity>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &AlertIdentity) -> bool {
        self.dispatched.contains(id)
    }

    /// Returns `true` when the identity was not marked before.
    pub fn mark(&mut self, id: AlertIdentity) -> bool {
        self.dispatched.insert(id)
    }

    pub fn len(&self) -> usize {
        self.dispatched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatched.is_empty()
    }
}
