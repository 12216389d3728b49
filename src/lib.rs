// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod app;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod logging;
pub mod notify;
pub mod policy;
pub mod refresh;
pub mod registrar;
pub mod table;

// ---- Re-exports for stable public API ----
pub use crate::app::App;
pub use crate::engine::{plan_tick, AlertEngine, EngineConfig, TickReport};
pub use crate::notify::{Alert, NotificationSink, NotifierMux};
pub use crate::registrar::{TaskRegistrar, TaskScheduler};
pub use crate::table::{EventRecord, EventTable, Importance};
