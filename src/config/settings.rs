// src/config/settings.rs
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::table::Importance;

fn default_sound() -> String {
    "medium.mp3".to_string()
}
fn default_importances() -> BTreeSet<Importance> {
    Importance::ALL.into_iter().collect()
}
fn default_start() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 45, 0).unwrap_or_default()
}
fn default_end() -> NaiveTime {
    NaiveTime::from_hms_opt(17, 45, 0).unwrap_or_default()
}

/// `HH:MM` on the wire.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(raw.trim(), FORMAT).map_err(serde::de::Error::custom)
    }
}

/// User preferences for the data refresh. The alert engine never reads these;
/// callers pass a copy to the refresh step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_sound")]
    pub selected_sound: String,
    #[serde(default = "default_importances")]
    pub importances: BTreeSet<Importance>,
    #[serde(default = "default_start", with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(default = "default_end", with = "hhmm")]
    pub end_time: NaiveTime,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            selected_sound: default_sound(),
            importances: default_importances(),
            start_time: default_start(),
            end_time: default_end(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.importances.is_empty() {
            return Err(SettingsError::Invalid(
                "select at least one importance level".into(),
            ));
        }
        if self.start_time > self.end_time {
            return Err(SettingsError::Invalid(format!(
                "start time {} is after end time {}",
                self.start_time.format("%H:%M"),
                self.end_time.format("%H:%M")
            )));
        }
        Ok(())
    }

    /// Comma-separated lowercase levels, e.g. `low,high`.
    pub fn importance_list(&self) -> String {
        self.importances
            .iter()
            .map(|i| i.label().to_lowercase())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("settings file {} is not valid: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// JSON file holding [`Settings`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when the file does not exist.
    pub fn try_load(&self) -> Result<Option<Settings>, SettingsError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| SettingsError::Parse {
                path: self.path.clone(),
                source,
            })
    }

    /// Saved settings, or defaults when the file is missing or unreadable.
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(Some(s)) => s,
            Ok(None) => Settings::default(),
            Err(e) => {
                warn!(target: "settings", error = %e, "using default settings");
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let io_err = |source: io::Error| SettingsError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let body = serde_json::to_string_pretty(settings).map_err(|source| {
            SettingsError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&self.path, body).map_err(io_err)?;
        info!(target: "settings", path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Delete the file. `Ok(false)` when it was already absent.
    pub fn remove(&self) -> io::Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
