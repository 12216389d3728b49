// src/notify/log_sink.rs
use super::{Alert, DispatchError, NotificationSink};

/// Writes each alert as a structured tracing record.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn dispatch(&self, alert: &Alert) -> Result<(), DispatchError> {
        tracing::info!(
            target: "alerts",
            id = %alert.identity,
            currency = %alert.currency,
            importance = %alert.importance,
            at = %alert.scheduled_at(),
            "upcoming event: {}",
            alert.name
        );
        Ok(())
    }
}
