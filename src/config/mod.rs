// src/config/mod.rs
//! Process configuration ([`app::AppConfig`]) and the user's refresh
//! preferences ([`settings::Settings`]).

pub mod app;
pub mod settings;

pub use app::AppConfig;
pub use settings::{Settings, SettingsStore};
