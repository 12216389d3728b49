// src/app.rs
//! # Workflows
//! The caller-visible operations, wired from an [`AppConfig`]:
//! refresh-and-monitor, background update, uninstall and status.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, Settings, SettingsStore};
use crate::engine::AlertEngine;
use crate::notify::Alert;
use crate::refresh::{
    CalendarRefresher, CommandRefresher, ExistingTableRefresher, RefreshSummary,
};
use crate::registrar::{
    EnsureReport, Privilege, RemoveReport, ScheduledTaskSpec, TaskCommand, TaskRegistrar,
    TaskScheduler, Trigger,
};

/// The logon and daily registrations that relaunch the executable in
/// background-update mode.
pub fn standard_tasks(config: &AppConfig) -> Vec<ScheduledTaskSpec> {
    let command = TaskCommand::background_update(&config.exe_path);
    vec![
        ScheduledTaskSpec {
            name: config.logon_task_name.clone(),
            trigger: Trigger::OnLogon,
            command: command.clone(),
            privilege: Privilege::Highest,
        },
        ScheduledTaskSpec {
            name: config.daily_task_name.clone(),
            trigger: Trigger::DailyAt(config.daily_time),
            command,
            privilege: Privilege::Highest,
        },
    ]
}

/// Refresher selected by configuration.
pub fn refresher_for(config: &AppConfig) -> Result<Arc<dyn CalendarRefresher>> {
    Ok(match &config.refresh_command {
        Some(cmd) => Arc::new(CommandRefresher::new(cmd.clone(), &config.table_path)?),
        None => Arc::new(ExistingTableRefresher::new(&config.table_path)),
    })
}

pub fn clock_for(config: &AppConfig) -> Arc<dyn Clock> {
    info!(target: "app", timezone = %config.timezone, "clock zone");
    Arc::new(SystemClock::new(config.timezone))
}

#[derive(Debug, Clone)]
pub struct MonitorOutcome {
    pub message: String,
    pub refresh: RefreshSummary,
    pub registration: EnsureReport,
    /// `false` when the engine was already running.
    pub started: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UninstallReport {
    pub tasks: Option<RemoveReport>,
    pub table_removed: bool,
    pub settings_removed: bool,
    pub errors: Vec<String>,
}

impl UninstallReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.tasks.as_ref().map_or(true, |t| t.all_ok())
    }

    pub fn summary(&self) -> String {
        if self.is_clean() {
            return "Uninstall complete.".to_string();
        }
        let mut problems: Vec<String> = self
            .tasks
            .iter()
            .flat_map(|t| t.failures())
            .map(|(name, msg)| format!("task {name}: {msg}"))
            .collect();
        problems.extend(self.errors.iter().cloned());
        format!("Uninstall finished with errors: {}", problems.join("; "))
    }
}

pub struct App {
    config: AppConfig,
    settings: SettingsStore,
    engine: Arc<AlertEngine>,
    registrar: TaskRegistrar,
    refresher: Arc<dyn CalendarRefresher>,
}

impl App {
    pub fn new(
        config: AppConfig,
        engine: Arc<AlertEngine>,
        scheduler: Arc<dyn TaskScheduler>,
        refresher: Arc<dyn CalendarRefresher>,
    ) -> Self {
        Self {
            settings: SettingsStore::new(&config.settings_path),
            registrar: TaskRegistrar::new(scheduler),
            config,
            engine,
            refresher,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<AlertEngine> {
        &self.engine
    }

    pub fn settings_store(&self) -> &SettingsStore {
        &self.settings
    }

    /// Save `settings`, refresh the table, then register the scheduled tasks
    /// and start the alert engine. Registration problems are reported in the
    /// outcome; only invalid settings or a failed refresh return `Err`.
    pub async fn refresh_and_monitor(&self, settings: Settings) -> Result<MonitorOutcome> {
        settings.validate()?;
        if let Err(e) = self.settings.save(&settings) {
            warn!(target: "app", error = %e, "could not save settings, continuing");
        }

        let refresh = self
            .refresher
            .refresh(&settings)
            .await
            .context("updating the calendar")?;

        let registration = self.register_tasks().await?;
        let started = self.engine.start();

        let mut message = format!(
            "Calendar updated with {} events. Alerts are active.",
            refresh.records
        );
        let failures = registration.failures();
        if !failures.is_empty() {
            let names: Vec<&str> = failures.iter().map(|(n, _)| *n).collect();
            message.push_str(&format!(
                " Automatic updates could not be scheduled ({}).",
                names.join(", ")
            ));
        }
        info!(target: "app", records = refresh.records, started, "monitoring");

        Ok(MonitorOutcome {
            message,
            refresh,
            registration,
            started,
        })
    }

    /// Silent refresh with the saved settings, for scheduled relaunches.
    pub async fn background_update(&self) -> Result<RefreshSummary> {
        let settings = self.settings.load();
        info!(target: "app", importances = %settings.importance_list(), "background update");
        let summary = self
            .refresher
            .refresh(&settings)
            .await
            .context("background update")?;
        info!(target: "app", records = summary.records, "background update finished");
        Ok(summary)
    }

    /// Stop alerts, delete both scheduled tasks, then the table and settings
    /// files. Every step runs whatever happened to the previous one.
    pub async fn uninstall(&self) -> UninstallReport {
        info!(target: "app", "uninstalling");
        self.engine.shutdown().await;

        let mut report = UninstallReport::default();

        let registrar = self.registrar.clone();
        let names = vec![
            self.config.logon_task_name.clone(),
            self.config.daily_task_name.clone(),
        ];
        match tokio::task::spawn_blocking(move || registrar.remove_all(&names)).await {
            Ok(tasks) => report.tasks = Some(tasks),
            Err(e) => report.errors.push(format!("task removal did not complete: {e}")),
        }

        match remove_if_present(&self.config.table_path) {
            Ok(removed) => report.table_removed = removed,
            Err(e) => report.errors.push(format!(
                "could not delete {}: {e}",
                self.config.table_path.display()
            )),
        }
        match self.settings.remove() {
            Ok(removed) => report.settings_removed = removed,
            Err(e) => report.errors.push(format!(
                "could not delete {}: {e}",
                self.settings.path().display()
            )),
        }

        if report.is_clean() {
            info!(target: "app", "uninstall complete");
        } else {
            warn!(target: "app", summary = %report.summary(), "uninstall finished with errors");
        }
        report
    }

    /// Send one synthetic High-importance alert through the engine's sink so
    /// the user can check that notices and sound work. Nothing is recorded as
    /// dispatched.
    pub fn test_notification(&self) -> Result<Alert> {
        let alert = self
            .engine
            .send_test_alert()
            .context("sending the test notification")?;
        info!(target: "app", "test notification sent");
        Ok(alert)
    }

    /// Modification time of the event table, if it exists.
    pub fn last_update(&self) -> Option<DateTime<Local>> {
        let modified = fs::metadata(&self.config.table_path)
            .and_then(|m| m.modified())
            .ok()?;
        Some(DateTime::<Local>::from(modified))
    }

    async fn register_tasks(&self) -> Result<EnsureReport> {
        let registrar = self.registrar.clone();
        let specs = standard_tasks(&self.config);
        tokio::task::spawn_blocking(move || registrar.ensure_all(&specs))
            .await
            .context("registering scheduled tasks")
    }
}

fn remove_if_present(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(target: "app", path = %path.display(), "file deleted");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
