//! Economic calendar alerts: binary entrypoint.
//!
//! ```text
//! econ-calendar-alerts                       refresh, register tasks, alert until Ctrl-C
//! econ-calendar-alerts --background-update   refresh with saved settings and exit
//! econ-calendar-alerts --uninstall           remove tasks and data files
//! econ-calendar-alerts --status              show when the table was last updated
//! econ-calendar-alerts --test-notification   show one sample notice and exit
//! ```

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use econ_calendar_alerts::app::{self, App};
use econ_calendar_alerts::config::AppConfig;
use econ_calendar_alerts::engine::{AlertEngine, EngineConfig};
use econ_calendar_alerts::logging;
use econ_calendar_alerts::notify::{Alert, ChannelSink, LogSink, NotifierMux};
use econ_calendar_alerts::registrar::{self, BACKGROUND_UPDATE_FLAG};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Monitor,
    BackgroundUpdate,
    Uninstall,
    Status,
    TestNotification,
}

impl Mode {
    fn from_args(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut mode = Mode::Monitor;
        for arg in args {
            mode = match arg.as_str() {
                BACKGROUND_UPDATE_FLAG => Mode::BackgroundUpdate,
                "--uninstall" => Mode::Uninstall,
                "--status" => Mode::Status,
                "--test-notification" => Mode::TestNotification,
                other => bail!(
                    "unknown argument {other:?} (expected {BACKGROUND_UPDATE_FLAG}, --uninstall, --status or --test-notification)"
                ),
            };
        }
        Ok(mode)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env when present; CALENDAR_* variables may come from it.
    let _ = dotenvy::dotenv();

    let mode = Mode::from_args(std::env::args().skip(1))?;
    let config = AppConfig::load().context("loading configuration")?;
    config.ensure_dirs()?;
    let _log_guard = logging::init_tracing(Some(&config.log_dir));
    info!(?mode, data_dir = %config.data_dir.display(), "starting");

    let (channel, alerts) = ChannelSink::pair();
    let sink = NotifierMux::new().with(LogSink).with(channel);
    let engine = Arc::new(AlertEngine::new(
        EngineConfig::new(&config.table_path).with_poll_interval(config.poll_interval),
        Arc::new(sink),
        app::clock_for(&config),
    ));
    let refresher = app::refresher_for(&config)?;
    let app = App::new(config, engine, registrar::default_scheduler(), refresher);

    match mode {
        Mode::BackgroundUpdate => {
            let summary = app.background_update().await?;
            info!(records = summary.records, "background update done");
        }
        Mode::Uninstall => {
            let report = app.uninstall().await;
            println!("{}", report.summary());
            if !report.is_clean() {
                bail!("uninstall incomplete");
            }
        }
        Mode::Status => print_status(&app),
        Mode::TestNotification => test_notification(&app, alerts).await?,
        Mode::Monitor => monitor(&app, alerts).await?,
    }

    Ok(())
}

fn print_status(app: &App) {
    match app.last_update() {
        Some(at) => println!("Last update: {}", at.format("%d/%m/%Y %H:%M:%S")),
        None => println!(
            "No calendar table at {}",
            app.config().table_path.display()
        ),
    }
    let settings = app.settings_store().load();
    println!(
        "Importances: {}  window: {}-{}  sound: {}",
        settings.importance_list(),
        settings.start_time.format("%H:%M"),
        settings.end_time.format("%H:%M"),
        settings.selected_sound
    );
}

async fn monitor(app: &App, mut alerts: UnboundedReceiver<Alert>) -> Result<()> {
    let settings = app.settings_store().load();
    let sound = settings.selected_sound.clone();

    let outcome = app.refresh_and_monitor(settings).await?;
    println!("{}", outcome.message);
    if let Some(last) = app.last_update() {
        println!("Last update: {}", last.format("%d/%m/%Y %H:%M:%S"));
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!(error = %e, "could not listen for Ctrl-C");
                }
                break;
            }
            next = alerts.recv() => match next {
                Some(alert) => present(&alert, &sound),
                None => break,
            },
        }
    }

    app.engine().shutdown().await;
    info!("stopped");
    Ok(())
}

async fn test_notification(app: &App, mut alerts: UnboundedReceiver<Alert>) -> Result<()> {
    let sound = app.settings_store().load().selected_sound;
    app.test_notification()?;
    match alerts.recv().await {
        Some(alert) => present(&alert, &sound),
        None => bail!("presentation channel closed"),
    }
    Ok(())
}

fn present(alert: &Alert, sound: &str) {
    println!(
        "{} {} ({}) at {} {}  [{}]",
        alert.importance.stars(),
        alert.name,
        alert.currency,
        alert.date.format("%d/%m/%Y"),
        alert.time.format("%H:%M"),
        sound
    );
}
