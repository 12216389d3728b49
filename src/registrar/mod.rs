// src/registrar/mod.rs
//! # Task Registrar
//! Keeps the executable registered with the host task scheduler so it is
//! relaunched at logon and once a day, and removes that registration on
//! uninstall.
//!
//! Both directions are idempotent: `ensure` never touches a task that already
//! exists, and `remove` treats "not found" as done. Failures are logged and
//! returned as outcomes; nothing here aborts the caller's workflow.

pub mod memory;
pub mod schtasks;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveTime;
use tracing::{info, warn};

pub use memory::InMemoryScheduler;
pub use schtasks::SchtasksScheduler;

/// Argument that makes a relaunched process refresh the table silently and exit.
pub const BACKGROUND_UPDATE_FLAG: &str = "--background-update";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    OnLogon,
    DailyAt(NaiveTime),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::OnLogon => f.write_str("at logon"),
            Trigger::DailyAt(t) => write!(f, "daily at {}", t.format("%H:%M")),
        }
    }
}

/// Run level of the registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Privilege {
    #[default]
    Highest,
}

/// Program plus arguments the scheduler launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl TaskCommand {
    pub fn background_update(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![BACKGROUND_UPDATE_FLAG.to_string()],
        }
    }

    /// Single command line with the program path quoted.
    pub fn command_line(&self) -> String {
        let mut line = format!("\"{}\"", self.program.display());
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// One OS-level registration. Identity is `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTaskSpec {
    pub name: String,
    pub trigger: Trigger,
    pub command: TaskCommand,
    pub privilege: Privilege,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    Deleted,
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{op} of task {name:?} failed: {detail}")]
    Command {
        op: &'static str,
        name: String,
        detail: String,
    },

    #[error("task {0:?} already exists")]
    AlreadyExists(String),

    #[error("no task scheduler available on this platform")]
    Unsupported,
}

/// The scheduler protocol: query, create, delete by name.
pub trait TaskScheduler: Send + Sync {
    fn query(&self, name: &str) -> Result<bool, SchedulerError>;
    fn create(&self, spec: &ScheduledTaskSpec) -> Result<(), SchedulerError>;
    fn delete(&self, name: &str) -> Result<DeleteStatus, SchedulerError>;
}

/// Stand-in for hosts without a supported scheduler; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedScheduler;

impl TaskScheduler for UnsupportedScheduler {
    fn query(&self, _name: &str) -> Result<bool, SchedulerError> {
        Err(SchedulerError::Unsupported)
    }
    fn create(&self, _spec: &ScheduledTaskSpec) -> Result<(), SchedulerError> {
        Err(SchedulerError::Unsupported)
    }
    fn delete(&self, _name: &str) -> Result<DeleteStatus, SchedulerError> {
        Err(SchedulerError::Unsupported)
    }
}

/// `schtasks.exe` on Windows, [`UnsupportedScheduler`] elsewhere.
pub fn default_scheduler() -> Arc<dyn TaskScheduler> {
    if cfg!(windows) {
        Arc::new(SchtasksScheduler::default())
    } else {
        Arc::new(UnsupportedScheduler)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    AlreadyRegistered,
    Created,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
    Failed(String),
}

/// Per-task result of a bulk operation.
pub trait Outcome {
    fn failure(&self) -> Option<&str>;
}

impl Outcome for EnsureOutcome {
    fn failure(&self) -> Option<&str> {
        match self {
            EnsureOutcome::Failed(msg) => Some(msg),
            _ => None,
        }
    }
}

impl Outcome for RemoveOutcome {
    fn failure(&self) -> Option<&str> {
        match self {
            RemoveOutcome::Failed(msg) => Some(msg),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrarReport<O> {
    pub entries: Vec<(String, O)>,
}

impl<O: Outcome> RegistrarReport<O> {
    pub fn all_ok(&self) -> bool {
        self.entries.iter().all(|(_, o)| o.failure().is_none())
    }

    /// `(task name, error message)` for each failed entry.
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(name, o)| o.failure().map(|msg| (name.as_str(), msg)))
            .collect()
    }

    pub fn outcome(&self, name: &str) -> Option<&O> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, o)| o)
    }
}

pub type EnsureReport = RegistrarReport<EnsureOutcome>;
pub type RemoveReport = RegistrarReport<RemoveOutcome>;

#[derive(Clone)]
pub struct TaskRegistrar {
    scheduler: Arc<dyn TaskScheduler>,
}

impl TaskRegistrar {
    pub fn new(scheduler: Arc<dyn TaskScheduler>) -> Self {
        Self { scheduler }
    }

    /// Create the task unless one with the same name exists. An existing task
    /// keeps its trigger and command.
    pub fn ensure(&self, spec: &ScheduledTaskSpec) -> EnsureOutcome {
        match self.scheduler.query(&spec.name) {
            Ok(true) => {
                info!(target: "registrar", task = %spec.name, "task already registered");
                return EnsureOutcome::AlreadyRegistered;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(target: "registrar", task = %spec.name, error = %e, "task query failed");
                return EnsureOutcome::Failed(e.to_string());
            }
        }

        info!(target: "registrar", task = %spec.name, trigger = %spec.trigger, "creating scheduled task");
        match self.scheduler.create(spec) {
            Ok(()) => {
                info!(target: "registrar", task = %spec.name, "scheduled task created");
                EnsureOutcome::Created
            }
            Err(e) => {
                warn!(target: "registrar", task = %spec.name, error = %e, "scheduled task creation failed");
                EnsureOutcome::Failed(e.to_string())
            }
        }
    }

    /// Delete the task; a missing task counts as removed.
    pub fn remove(&self, name: &str) -> RemoveOutcome {
        info!(target: "registrar", task = %name, "deleting scheduled task");
        match self.scheduler.delete(name) {
            Ok(DeleteStatus::Deleted) => {
                info!(target: "registrar", task = %name, "scheduled task deleted");
                RemoveOutcome::Removed
            }
            Ok(DeleteStatus::NotFound) => {
                warn!(target: "registrar", task = %name, "scheduled task not found for deletion");
                RemoveOutcome::NotFound
            }
            Err(e) => {
                warn!(target: "registrar", task = %name, error = %e, "scheduled task deletion failed");
                RemoveOutcome::Failed(e.to_string())
            }
        }
    }

    /// Ensure every spec; each one is attempted whatever happened to the others.
    pub fn ensure_all(&self, specs: &[ScheduledTaskSpec]) -> EnsureReport {
        RegistrarReport {
            entries: specs
                .iter()
                .map(|s| (s.name.clone(), self.ensure(s)))
                .collect(),
        }
    }

    pub fn remove_all<S: AsRef<str>>(&self, names: &[S]) -> RemoveReport {
        RegistrarReport {
            entries: names
                .iter()
                .map(|n| (n.as_ref().to_string(), self.remove(n.as_ref())))
                .collect(),
        }
    }
}
