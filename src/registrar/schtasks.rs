// src/registrar/schtasks.rs
//! Windows Task Scheduler through `schtasks.exe`.

use std::path::PathBuf;
use std::process::{Command, Output};

use tracing::debug;

use super::{
    DeleteStatus, Privilege, ScheduledTaskSpec, SchedulerError, TaskScheduler, Trigger,
};

/// Fragments of the "task does not exist" message across Windows UI languages.
const NOT_FOUND_MARKERS: &[&str] = &[
    "cannot find",
    "does not exist",
    "não foi possível encontrar",
    "nao foi possivel encontrar",
    "no se puede encontrar",
];

pub struct SchtasksScheduler {
    program: PathBuf,
}

impl Default for SchtasksScheduler {
    fn default() -> Self {
        Self::new("schtasks")
    }
}

impl SchtasksScheduler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[String]) -> Result<Output, SchedulerError> {
        Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| SchedulerError::Spawn {
                program: self.program.display().to_string(),
                source,
            })
    }
}

pub fn query_args(name: &str) -> Vec<String> {
    ["/Query", "/TN", name].map(String::from).to_vec()
}

/// No `/F`: creation must fail rather than overwrite a task that appeared
/// after the query.
pub fn create_args(spec: &ScheduledTaskSpec) -> Vec<String> {
    let run_level = match spec.privilege {
        Privilege::Highest => "HIGHEST",
    };
    let mut args: Vec<String> = vec![
        "/Create".into(),
        "/RL".into(),
        run_level.into(),
        "/TN".into(),
        spec.name.clone(),
        "/TR".into(),
        spec.command.command_line(),
        "/SC".into(),
    ];
    match spec.trigger {
        Trigger::OnLogon => args.push("ONLOGON".into()),
        Trigger::DailyAt(t) => {
            args.push("DAILY".into());
            args.push("/ST".into());
            args.push(t.format("%H:%M").to_string());
        }
    }
    args
}

pub fn delete_args(name: &str) -> Vec<String> {
    ["/Delete", "/TN", name, "/F"].map(String::from).to_vec()
}

pub fn is_not_found(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m))
}

fn failure_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exit code {}", output.status.code().unwrap_or(-1))
    } else {
        stderr
    }
}

impl TaskScheduler for SchtasksScheduler {
    fn query(&self, name: &str) -> Result<bool, SchedulerError> {
        let output = self.run(&query_args(name))?;
        if !output.status.success() {
            debug!(target: "registrar", task = %name, detail = %failure_detail(&output), "query reported absent");
        }
        Ok(output.status.success())
    }

    fn create(&self, spec: &ScheduledTaskSpec) -> Result<(), SchedulerError> {
        let output = self.run(&create_args(spec))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SchedulerError::Command {
                op: "create",
                name: spec.name.clone(),
                detail: failure_detail(&output),
            })
        }
    }

    fn delete(&self, name: &str) -> Result<DeleteStatus, SchedulerError> {
        let output = self.run(&delete_args(name))?;
        if output.status.success() {
            return Ok(DeleteStatus::Deleted);
        }
        let detail = failure_detail(&output);
        // Localized messages may not match; a task that no longer exists is gone either way.
        if is_not_found(&detail) || !self.query(name)? {
            return Ok(DeleteStatus::NotFound);
        }
        Err(SchedulerError::Command {
            op: "delete",
            name: name.to_string(),
            detail,
        })
    }
}
