// src/notify/mod.rs
//! Notification boundary between the alert engine and the presentation layer.
//!
//! The engine only knows [`NotificationSink`]. Sinks must hand the alert off
//! without waiting for the user to see it: [`channel::ChannelSink`] posts to the
//! presentation loop, [`log_sink::LogSink`] writes a tracing record, and
//! [`NotifierMux`] fans out to several sinks.

pub mod channel;
pub mod log_sink;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::dedup::AlertIdentity;
use crate::table::{EventRecord, Importance};

pub use channel::ChannelSink;
pub use log_sink::LogSink;

/// What the presentation layer needs to show one event notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub identity: AlertIdentity,
    pub name: String,
    pub currency: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub importance: Importance,
}

impl Alert {
    pub fn scheduled_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

impl From<&EventRecord> for Alert {
    fn from(r: &EventRecord) -> Self {
        Self {
            identity: r.identity(),
            name: r.name.clone(),
            currency: r.currency.clone(),
            date: r.date,
            time: r.time,
            importance: r.importance,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("presentation channel closed")]
    ChannelClosed,

    #[error("{sink}: {message}")]
    Sink { sink: &'static str, message: String },

    #[error("{} sink(s) failed: {}", .0.len(), join_errors(.0))]
    Fanout(Vec<DispatchError>),
}

fn join_errors(errs: &[DispatchError]) -> String {
    errs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Hand-off point for alerts. Implementations must not block on acknowledgment.
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn dispatch(&self, alert: &Alert) -> Result<(), DispatchError>;
}

/// Dispatches to every child sink; one failing child does not stop the others.
#[derive(Default)]
pub struct NotifierMux {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl NotificationSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl NotificationSink for NotifierMux {
    fn name(&self) -> &'static str {
        "mux"
    }

    fn dispatch(&self, alert: &Alert) -> Result<(), DispatchError> {
        let errors: Vec<DispatchError> = self
            .sinks
            .iter()
            .filter_map(|s| s.dispatch(alert).err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::Fanout(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting(Arc<AtomicUsize>);
    impl NotificationSink for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn dispatch(&self, _alert: &Alert) -> Result<(), DispatchError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Broken;
    impl NotificationSink for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn dispatch(&self, _alert: &Alert) -> Result<(), DispatchError> {
            Err(DispatchError::Sink {
                sink: "broken",
                message: "audio device busy".into(),
            })
        }
    }

    fn sample() -> Alert {
        let rec = EventRecord {
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            name: "CPI".into(),
            currency: "USD".into(),
            importance: Importance::High,
            forecast: None,
            previous: None,
            actual: None,
        };
        Alert::from(&rec)
    }

    #[test]
    fn alert_carries_record_identity() {
        assert_eq!(sample().identity.as_str(), "10/03/2025 09:00 CPI");
    }

    #[test]
    fn mux_tries_every_sink_and_reports_failures() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mux = NotifierMux::new()
            .with(Broken)
            .with(Counting(hits.clone()));

        let err = mux.dispatch(&sample()).unwrap_err();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(err.to_string().contains("audio device busy"));
    }
}
