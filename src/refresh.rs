// src/refresh.rs
//! Table refresh: produce or re-check the event table the engine polls.
//!
//! Acquisition itself (browser automation, scraping) lives outside this crate.
//! [`CommandRefresher`] runs it as an external program; [`ExistingTableRefresher`]
//! only validates whatever file is already there.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::app::ENV_TABLE_PATH;
use crate::config::Settings;
use crate::table::EventTable;

pub const ENV_IMPORTANCES: &str = "CALENDAR_IMPORTANCES";
pub const ENV_START_TIME: &str = "CALENDAR_START_TIME";
pub const ENV_END_TIME: &str = "CALENDAR_END_TIME";

pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    pub table_path: PathBuf,
    pub records: usize,
    pub malformed: usize,
}

#[async_trait::async_trait]
pub trait CalendarRefresher: Send + Sync {
    /// Bring the table up to date for `settings`. An empty result is an error.
    async fn refresh(&self, settings: &Settings) -> Result<RefreshSummary>;
    fn name(&self) -> &'static str;
}

/// Load the table and require at least one usable row.
pub async fn validate_table(path: &Path) -> Result<RefreshSummary> {
    let table = EventTable::load(path)
        .await
        .with_context(|| format!("reading refreshed table {}", path.display()))?;
    if table.is_empty() {
        bail!("no events found with the selected filters");
    }
    Ok(RefreshSummary {
        table_path: path.to_path_buf(),
        records: table.len(),
        malformed: table.skipped.len(),
    })
}

/// Runs an external acquisition program. Settings are passed through
/// `CALENDAR_*` environment variables; the program must write the table to
/// `$CALENDAR_TABLE_PATH` and exit 0.
pub struct CommandRefresher {
    program: String,
    args: Vec<String>,
    table_path: PathBuf,
    timeout: Duration,
}

impl CommandRefresher {
    pub fn new(command: Vec<String>, table_path: impl Into<PathBuf>) -> Result<Self> {
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("refresh command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
            table_path: table_path.into(),
            timeout: DEFAULT_REFRESH_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl CalendarRefresher for CommandRefresher {
    async fn refresh(&self, settings: &Settings) -> Result<RefreshSummary> {
        info!(
            target: "refresh",
            program = %self.program,
            importances = %settings.importance_list(),
            "running refresh command"
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(ENV_IMPORTANCES, settings.importance_list())
            .env(ENV_START_TIME, settings.start_time.format("%H:%M").to_string())
            .env(ENV_END_TIME, settings.end_time.format("%H:%M").to_string())
            .env(ENV_TABLE_PATH, &self.table_path)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| anyhow!("refresh command timed out after {:?}", self.timeout))?
            .with_context(|| format!("spawning refresh command {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(target: "refresh", status = %output.status, stderr = %stderr.trim(), "refresh command failed");
            bail!("refresh command exited with {}: {}", output.status, stderr.trim());
        }

        let summary = validate_table(&self.table_path).await?;
        info!(target: "refresh", records = summary.records, malformed = summary.malformed, "table refreshed");
        Ok(summary)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

/// Accepts the table already on disk, if it has rows.
pub struct ExistingTableRefresher {
    table_path: PathBuf,
}

impl ExistingTableRefresher {
    pub fn new(table_path: impl Into<PathBuf>) -> Self {
        Self {
            table_path: table_path.into(),
        }
    }
}

#[async_trait::async_trait]
impl CalendarRefresher for ExistingTableRefresher {
    async fn refresh(&self, _settings: &Settings) -> Result<RefreshSummary> {
        let summary = validate_table(&self.table_path).await?;
        info!(target: "refresh", records = summary.records, "using existing table");
        Ok(summary)
    }

    fn name(&self) -> &'static str {
        "existing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TABLE: &str = "Data,Hora,Evento,Moeda,Importância\n10/03/2025,09:00,CPI,USD,High\n";

    #[tokio::test]
    async fn existing_table_must_have_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let refresher = ExistingTableRefresher::new(&path);

        assert!(refresher.refresh(&Settings::default()).await.is_err());

        std::fs::write(&path, "Data,Hora,Evento,Moeda,Importância\n").unwrap();
        let err = refresher.refresh(&Settings::default()).await.unwrap_err();
        assert!(err.to_string().contains("no events found"));

        std::fs::write(&path, TABLE).unwrap();
        let summary = refresher.refresh(&Settings::default()).await.unwrap();
        assert_eq!(summary.records, 1);
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandRefresher::new(vec![], "t.csv").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_receives_settings_and_writes_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let script = r#"printf 'Data,Hora,Evento,Moeda,Importância\n10/03/2025,%s,"Filtered %s",USD,High\n' "$CALENDAR_START_TIME" "$CALENDAR_IMPORTANCES" > "$CALENDAR_TABLE_PATH""#;
        let refresher =
            CommandRefresher::new(vec!["sh".into(), "-c".into(), script.into()], &path).unwrap();

        let summary = refresher.refresh(&Settings::default()).await.unwrap();
        assert_eq!(summary.records, 1);

        let table = EventTable::load(&path).await.unwrap();
        assert_eq!(table.records[0].name, "Filtered low,medium,high");
        assert_eq!(table.records[0].time.format("%H:%M").to_string(), "08:45");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_is_an_error() {
        let dir = tempdir().unwrap();
        let refresher = CommandRefresher::new(
            vec!["sh".into(), "-c".into(), "echo boom >&2; exit 3".into()],
            dir.path().join("t.csv"),
        )
        .unwrap();
        let err = refresher.refresh(&Settings::default()).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
