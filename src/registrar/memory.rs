// src/registrar/memory.rs
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use super::{DeleteStatus, ScheduledTaskSpec, SchedulerError, TaskScheduler};

/// Scheduler kept in process memory, with per-name failure injection.
/// Mirrors `schtasks` semantics: creating an existing name is an error.
#[derive(Debug, Default)]
pub struct InMemoryScheduler {
    tasks: Mutex<BTreeMap<String, ScheduledTaskSpec>>,
    failing: Mutex<HashSet<String>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on `name` fail from now on.
    pub fn fail_on(&self, name: &str) {
        self.failing
            .lock()
            .expect("scheduler mutex poisoned")
            .insert(name.to_string());
    }

    pub fn get(&self, name: &str) -> Option<ScheduledTaskSpec> {
        self.tasks
            .lock()
            .expect("scheduler mutex poisoned")
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tasks
            .lock()
            .expect("scheduler mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    fn check(&self, op: &'static str, name: &str) -> Result<(), SchedulerError> {
        if self
            .failing
            .lock()
            .expect("scheduler mutex poisoned")
            .contains(name)
        {
            return Err(SchedulerError::Command {
                op,
                name: name.to_string(),
                detail: "Access is denied.".into(),
            });
        }
        Ok(())
    }
}

impl TaskScheduler for InMemoryScheduler {
    fn query(&self, name: &str) -> Result<bool, SchedulerError> {
        self.check("query", name)?;
        Ok(self
            .tasks
            .lock()
            .expect("scheduler mutex poisoned")
            .contains_key(name))
    }

    fn create(&self, spec: &ScheduledTaskSpec) -> Result<(), SchedulerError> {
        self.check("create", &spec.name)?;
        let mut tasks = self.tasks.lock().expect("scheduler mutex poisoned");
        if tasks.contains_key(&spec.name) {
            return Err(SchedulerError::AlreadyExists(spec.name.clone()));
        }
        tasks.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<DeleteStatus, SchedulerError> {
        self.check("delete", name)?;
        let removed = self
            .tasks
            .lock()
            .expect("scheduler mutex poisoned")
            .remove(name);
        Ok(match removed {
            Some(_) => DeleteStatus::Deleted,
            None => DeleteStatus::NotFound,
        })
    }
}
