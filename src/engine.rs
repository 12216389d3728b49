//! # Alert Engine
//! Background polling loop that turns the event table into notifications.
//!
//! Every poll interval the loop loads a fresh [`EventTable`], asks the
//! [`policy`] which not-yet-dispatched events are inside their lead window,
//! and hands them to the [`NotificationSink`] highest importance first. Each
//! identity is marked in the [`DedupStore`] right after its dispatch attempt,
//! successful or not, so an event is handed over at most once per engine.
//!
//! The decision part of a tick is [`plan_tick`], a pure function of
//! `(table, now, dedup)`; the loop only adds I/O and timing around it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::dedup::DedupStore;
use crate::notify::{Alert, DispatchError, NotificationSink};
use crate::policy;
use crate::table::{EventRecord, EventTable, Importance};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Event name carried by [`AlertEngine::send_test_alert`].
pub const TEST_ALERT_NAME: &str = "Test notification";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("calendar_ticks_total", "Poll ticks started.");
        describe_counter!(
            "calendar_ticks_skipped_total",
            "Ticks skipped because the event table could not be loaded."
        );
        describe_counter!(
            "calendar_rows_malformed_total",
            "Table rows excluded for an unparseable date or time."
        );
        describe_counter!(
            "calendar_alerts_dispatched_total",
            "Alerts accepted by the notification sink."
        );
        describe_counter!(
            "calendar_dispatch_failures_total",
            "Alerts the notification sink rejected."
        );
        describe_gauge!("calendar_last_tick_ts", "Unix ts of the last poll tick.");
    });
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub table_path: PathBuf,
    pub poll_interval: Duration,
}

impl EngineConfig {
    pub fn new(table_path: impl Into<PathBuf>) -> Self {
        Self {
            table_path: table_path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Outcome of one tick, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// `false` when the table could not be loaded and the tick was skipped.
    pub loaded: bool,
    pub records: usize,
    pub malformed: usize,
    pub eligible: usize,
    pub dispatched: usize,
    pub failed: usize,
    /// Stop was requested while alerts were still queued.
    pub interrupted: bool,
}

/// Alerts due at `now` that have not been dispatched yet, in delivery order.
pub fn plan_tick(table: &EventTable, now: NaiveDateTime, dedup: &DedupStore) -> Vec<Alert> {
    let fresh = table
        .records
        .iter()
        .filter(|r| !dedup.contains(&r.identity()));
    let mut due = policy::select(fresh, now);
    policy::order(&mut due);
    due.into_iter().map(Alert::from).collect()
}

struct Shared {
    config: EngineConfig,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    // Only the loop touches this; the mutex lets a restarted loop continue the same set.
    dedup: Mutex<DedupStore>,
    active: AtomicBool,
}

impl Shared {
    fn dedup(&self) -> MutexGuard<'_, DedupStore> {
        // Never held across a sink call, so a poisoned guard still holds a consistent set.
        self.dedup.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand one alert to the sink; a panicking sink counts as a failed dispatch.
    fn dispatch(&self, alert: &Alert) -> Result<(), DispatchError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.sink.dispatch(alert))) {
            Ok(result) => result,
            Err(payload) => Err(DispatchError::Sink {
                sink: self.sink.name(),
                message: format!("panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }

    async fn tick(&self, cancel: &CancellationToken) -> TickReport {
        counter!("calendar_ticks_total").increment(1);
        gauge!("calendar_last_tick_ts").set(Utc::now().timestamp() as f64);

        let table = match EventTable::load(&self.config.table_path).await {
            Ok(t) => t,
            Err(e) => {
                warn!(target: "engine", error = %e, "event table unavailable, skipping tick");
                counter!("calendar_ticks_skipped_total").increment(1);
                return TickReport::default();
            }
        };

        let now = self.clock.now();
        let mut report = TickReport {
            loaded: true,
            records: table.len(),
            malformed: table.skipped.len(),
            ..TickReport::default()
        };

        let alerts = plan_tick(&table, now, &self.dedup());
        report.eligible = alerts.len();

        for alert in alerts {
            if cancel.is_cancelled() {
                report.interrupted = true;
                info!(target: "engine", pending = report.eligible - report.dispatched - report.failed, "stop requested, dropping remaining alerts");
                break;
            }
            match self.dispatch(&alert) {
                Ok(()) => {
                    report.dispatched += 1;
                    counter!("calendar_alerts_dispatched_total").increment(1);
                    info!(target: "engine", id = %alert.identity, importance = %alert.importance, "alert dispatched");
                }
                Err(e) => {
                    report.failed += 1;
                    counter!("calendar_dispatch_failures_total").increment(1);
                    warn!(target: "engine", id = %alert.identity, sink = self.sink.name(), error = %e, "dispatch failed");
                }
            }
            self.dedup().mark(alert.identity);
        }

        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

struct Run {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Idle/Active state machine around the polling loop.
pub struct AlertEngine {
    shared: Arc<Shared>,
    run: Mutex<Option<Run>>,
}

impl AlertEngine {
    pub fn new(
        config: EngineConfig,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            shared: Arc::new(Shared {
                config,
                sink,
                clock,
                dedup: Mutex::new(DedupStore::new()),
                active: AtomicBool::new(false),
            }),
            run: Mutex::new(None),
        }
    }

    fn run_slot(&self) -> MutexGuard<'_, Option<Run>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Idle → Active. Spawns the loop on the current tokio runtime and returns
    /// `true`; returns `false` without spawning when already Active.
    pub fn start(&self) -> bool {
        let mut run = self.run_slot();
        if self
            .shared
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(target: "engine", "start ignored, already active");
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(self.shared.clone(), cancel.clone()));
        *run = Some(Run { cancel, handle });

        info!(
            target: "engine",
            table = %self.shared.config.table_path.display(),
            interval_ms = self.shared.config.poll_interval.as_millis() as u64,
            "alert engine started"
        );
        true
    }

    /// Active → Idle. Signals the loop and returns immediately; returns `false`
    /// when already Idle.
    pub fn stop(&self) -> bool {
        let run = self.run_slot();
        if !self.shared.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(r) = run.as_ref() {
            r.cancel.cancel();
        }
        info!(target: "engine", "alert engine stopping");
        true
    }

    /// Stop and wait for the loop task to finish its current tick.
    pub async fn shutdown(&self) {
        self.stop();
        let run = self.run_slot().take();
        if let Some(r) = run {
            if let Err(e) = r.handle.await {
                warn!(target: "engine", error = %e, "alert loop task ended abnormally");
            }
        }
    }

    /// Run a single tick now, independent of the loop.
    pub async fn run_tick(&self) -> TickReport {
        self.shared.tick(&CancellationToken::new()).await
    }

    pub fn dispatched_count(&self) -> usize {
        self.shared.dedup().len()
    }

    /// Push a synthetic High-importance alert stamped with the current time
    /// through the sink. The dispatched set is left alone.
    pub fn send_test_alert(&self) -> Result<Alert, DispatchError> {
        let now = self.shared.clock.now();
        let record = EventRecord {
            date: now.date(),
            time: now.time(),
            name: TEST_ALERT_NAME.to_string(),
            currency: "TEST".to_string(),
            importance: Importance::High,
            forecast: None,
            previous: None,
            actual: None,
        };
        let alert = Alert::from(&record);
        self.shared.dispatch(&alert)?;
        info!(target: "engine", id = %alert.identity, "test alert dispatched");
        Ok(alert)
    }
}

/// Clears `active` if the loop ends without being asked to.
struct LoopExit<'a> {
    shared: &'a Shared,
    cancel: &'a CancellationToken,
}

impl Drop for LoopExit<'_> {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            self.shared.active.store(false, Ordering::Release);
            warn!(target: "engine", "alert loop exited unexpectedly, engine is idle");
        }
    }
}

async fn poll_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let _exit = LoopExit {
        shared: &shared,
        cancel: &cancel,
    };
    let mut ticker = tokio::time::interval(shared.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let report = shared.tick(&cancel).await;
        debug!(
            target: "engine",
            loaded = report.loaded,
            records = report.records,
            malformed = report.malformed,
            eligible = report.eligible,
            dispatched = report.dispatched,
            failed = report.failed,
            "tick"
        );
    }

    info!(target: "engine", "alert loop stopped");
}
