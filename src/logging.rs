// src/logging.rs
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::app::LOG_FILE_NAME;

/// Used when `RUST_LOG` is unset. Events carry short targets (`engine`,
/// `alerts`, ...) rather than module paths, so each one is listed.
pub const DEFAULT_FILTER: &str = "warn,econ_calendar_alerts=info,alerts=info,app=info,\
engine=info,refresh=info,registrar=info,settings=info,table=info";

/// Install the global subscriber: compact stdout plus `<log_dir>/app.log`.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// whole process. Without a log directory only stdout is used.
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .with(file_layer)
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    use chrono::{NaiveDate, NaiveTime};
    use tracing::{debug, info};
    use tracing_subscriber::fmt::MakeWriter;

    use crate::notify::{Alert, LogSink, NotificationSink};
    use crate::table::{EventRecord, Importance};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn default_filter_keeps_the_alert_and_workflow_targets() {
        let out = Captured::default();
        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new(DEFAULT_FILTER))
            .with(fmt::layer().with_writer(out.clone()).with_ansi(false));

        let alert = Alert::from(&EventRecord {
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            name: "CPI".into(),
            currency: "USD".into(),
            importance: Importance::High,
            forecast: None,
            previous: None,
            actual: None,
        });

        tracing::subscriber::with_default(subscriber, || {
            LogSink.dispatch(&alert).unwrap();
            info!(target: "registrar", "scheduled task created");
            info!(target: "engine", "alert engine started");
            info!(target: "hyper", "chatty dependency");
            debug!(target: "engine", "tick detail");
        });

        let text = out.text();
        assert!(text.contains("upcoming event: CPI"), "{text}");
        assert!(text.contains("scheduled task created"), "{text}");
        assert!(text.contains("alert engine started"), "{text}");
        assert!(!text.contains("chatty dependency"), "{text}");
        assert!(!text.contains("tick detail"), "{text}");
    }
}
