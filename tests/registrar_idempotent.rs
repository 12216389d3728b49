// tests/registrar_idempotent.rs
use std::sync::Arc;

use chrono::NaiveTime;
use econ_calendar_alerts::registrar::{
    EnsureOutcome, InMemoryScheduler, Privilege, RemoveOutcome, ScheduledTaskSpec, TaskCommand,
    TaskRegistrar, Trigger,
};

fn spec(name: &str, trigger: Trigger) -> ScheduledTaskSpec {
    ScheduledTaskSpec {
        name: name.to_string(),
        trigger,
        command: TaskCommand::background_update(r"C:\cal\CalendarioEconomico.exe"),
        privilege: Privilege::Highest,
    }
}

fn daily() -> Trigger {
    Trigger::DailyAt(NaiveTime::from_hms_opt(8, 30, 0).unwrap())
}

#[test]
fn ensure_twice_creates_once() {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let registrar = TaskRegistrar::new(scheduler.clone());
    let x = spec("X", Trigger::OnLogon);

    assert_eq!(registrar.ensure(&x), EnsureOutcome::Created);
    assert_eq!(registrar.ensure(&x), EnsureOutcome::AlreadyRegistered);
    assert_eq!(scheduler.names(), vec!["X".to_string()]);
}

#[test]
fn existing_task_is_left_untouched() {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let registrar = TaskRegistrar::new(scheduler.clone());

    registrar.ensure(&spec("X", Trigger::OnLogon));
    assert_eq!(
        registrar.ensure(&spec("X", daily())),
        EnsureOutcome::AlreadyRegistered
    );
    assert_eq!(scheduler.get("X").unwrap().trigger, Trigger::OnLogon);
}

#[test]
fn remove_twice_never_errors() {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let registrar = TaskRegistrar::new(scheduler.clone());
    registrar.ensure(&spec("X", Trigger::OnLogon));

    assert_eq!(registrar.remove("X"), RemoveOutcome::Removed);
    assert_eq!(registrar.remove("X"), RemoveOutcome::NotFound);
    assert!(scheduler.names().is_empty());
}

#[test]
fn one_failing_task_does_not_block_the_other() {
    let scheduler = Arc::new(InMemoryScheduler::new());
    scheduler.fail_on("Logon");
    let registrar = TaskRegistrar::new(scheduler.clone());

    let report = registrar.ensure_all(&[spec("Logon", Trigger::OnLogon), spec("Daily", daily())]);
    assert!(!report.all_ok());
    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.failures()[0].0, "Logon");
    assert_eq!(report.outcome("Daily"), Some(&EnsureOutcome::Created));

    let removed = registrar.remove_all(&["Logon", "Daily"]);
    assert!(matches!(removed.outcome("Logon"), Some(RemoveOutcome::Failed(_))));
    assert_eq!(removed.outcome("Daily"), Some(&RemoveOutcome::Removed));
}
