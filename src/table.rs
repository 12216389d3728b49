// src/table.rs
//! # Event Table
//! Read-only view over the calendar file produced by the acquisition pipeline.
//!
//! The file is CSV (UTF-8, optional BOM) with a header row and the columns
//! `Data, Hora, Evento, Moeda, Importância, Previsão, Anterior, Real` in that
//! order. Rows whose date or time cannot be parsed are excluded and reported in
//! [`EventTable::skipped`]; the rest of the table is still usable.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dedup::AlertIdentity;

pub const DATE_FORMAT: &str = "%d/%m/%Y";
pub const TIME_FORMAT: &str = "%H:%M";

/// Minimum number of columns a row must carry (up to and including importance).
const REQUIRED_COLUMNS: usize = 5;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("event table not found at {}", .0.display())]
    Missing(PathBuf),

    #[error("reading event table {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed event table: {0}")]
    Malformed(String),
}

/// Event importance as published by the calendar source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
}

impl Importance {
    pub const ALL: [Importance; 3] = [Importance::Low, Importance::Medium, Importance::High];

    /// Delivery rank: lower goes first.
    pub const fn rank(self) -> u8 {
        match self {
            Importance::High => 0,
            Importance::Medium => 1,
            Importance::Low => 2,
        }
    }

    /// Parse a table label. Accepts the English and Portuguese spellings, any case.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "high" | "alta" => Some(Importance::High),
            "medium" | "média" | "media" => Some(Importance::Medium),
            "low" | "baixa" => Some(Importance::Low),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Importance::High => "High",
            Importance::Medium => "Medium",
            Importance::Low => "Low",
        }
    }

    pub fn stars(self) -> &'static str {
        match self {
            Importance::High => "★★★",
            Importance::Medium => "★★",
            Importance::Low => "★",
        }
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One calendar row with a valid timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub name: String,
    pub currency: String,
    pub importance: Importance,
    pub forecast: Option<String>,
    pub previous: Option<String>,
    pub actual: Option<String>,
}

impl EventRecord {
    pub fn scheduled_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn identity(&self) -> AlertIdentity {
        AlertIdentity::new(self.date, self.time, &self.name)
    }
}

/// A row that was excluded from the table, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// 1-based line in the file (the header is line 1).
    pub line: u64,
    pub name: String,
    pub reason: String,
}

/// Snapshot of the event file for one poll tick.
#[derive(Debug, Clone, Default)]
pub struct EventTable {
    pub records: Vec<EventRecord>,
    pub skipped: Vec<SkippedRow>,
}

impl EventTable {
    /// Read and parse the table at `path`.
    pub async fn load(path: &Path) -> Result<Self, TableError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TableError::Missing(path.to_path_buf()))
            }
            Err(source) => {
                return Err(TableError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&bytes)
    }

    /// Parse table bytes. Fails only when the file as a whole is unusable.
    pub fn parse(bytes: &[u8]) -> Result<Self, TableError> {
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(body);

        let headers = reader
            .headers()
            .map_err(|e| TableError::Malformed(format!("header: {e}")))?;
        if headers.len() < REQUIRED_COLUMNS {
            return Err(TableError::Malformed(format!(
                "expected at least {REQUIRED_COLUMNS} columns, header has {}",
                headers.len()
            )));
        }

        let mut table = EventTable::default();
        for (idx, row) in reader.records().enumerate() {
            // header is line 1
            let fallback_line = idx as u64 + 2;
            let outcome = match row {
                Ok(rec) => {
                    let line = rec.position().map(|p| p.line()).unwrap_or(fallback_line);
                    parse_row(&rec).map_err(|(name, reason)| SkippedRow { line, name, reason })
                }
                Err(e) => Err(SkippedRow {
                    line: fallback_line,
                    name: String::new(),
                    reason: e.to_string(),
                }),
            };

            match outcome {
                Ok(record) => table.records.push(record),
                Err(skipped) => {
                    warn!(
                        target: "table",
                        line = skipped.line,
                        event = %skipped.name,
                        reason = %skipped.reason,
                        "skipping malformed row"
                    );
                    counter!("calendar_rows_malformed_total").increment(1);
                    table.skipped.push(skipped);
                }
            }
        }

        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn parse_row(rec: &csv::StringRecord) -> Result<EventRecord, (String, String)> {
    let field = |i: usize| rec.get(i).map(str::trim).unwrap_or_default();
    let optional = |i: usize| {
        let v = field(i);
        (!v.is_empty()).then(|| v.to_string())
    };

    let name = field(2).to_string();
    if rec.len() < REQUIRED_COLUMNS {
        return Err((name, format!("row has {} columns", rec.len())));
    }

    let date = NaiveDate::parse_from_str(field(0), DATE_FORMAT)
        .map_err(|e| (name.clone(), format!("invalid date {:?}: {e}", field(0))))?;
    let time = NaiveTime::parse_from_str(field(1), TIME_FORMAT)
        .map_err(|e| (name.clone(), format!("invalid time {:?}: {e}", field(1))))?;

    let importance = Importance::from_label(field(4)).unwrap_or_else(|| {
        debug!(target: "table", event = %name, label = field(4), "unknown importance, using Low");
        Importance::Low
    });

    Ok(EventRecord {
        date,
        time,
        name,
        currency: field(3).to_string(),
        importance,
        forecast: optional(5),
        previous: optional(6),
        actual: optional(7),
    })
}
