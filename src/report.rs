//! Operator-facing progress lines for the CLI.
//!
//! Diagnostics go through `log`; this is what a replay prints per event,
//! either as coloured text or as one JSON object per line.

use chrono::{DateTime, Utc};
use colored::Colorize;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub level: Level,
    /// Event name or command, e.g. "VoteCast", "replay"
    pub tag: String,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Pretty,
    Json,
}

static REPORT_FORMAT: Lazy<Mutex<ReportFormat>> = Lazy::new(|| Mutex::new(ReportFormat::Pretty));
static REPORT_FILE: Lazy<Mutex<Option<PathBuf>>> = Lazy::new(|| Mutex::new(None));

impl Report {
    pub fn new<T: Into<String>, M: Into<String>>(level: Level, tag: T, message: M) -> Self {
        let now: DateTime<Utc> = Utc::now();
        Self {
            level,
            tag: tag.into(),
            message: message.into(),
            timestamp: now.to_rfc3339(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn info<T: Into<String>, M: Into<String>>(tag: T, message: M) -> Self {
        Self::new(Level::Info, tag, message)
    }

    pub fn warn<T: Into<String>, M: Into<String>>(tag: T, message: M) -> Self {
        Self::new(Level::Warn, tag, message)
    }

    pub fn error<T: Into<String>, M: Into<String>>(tag: T, message: M) -> Self {
        Self::new(Level::Error, tag, message)
    }

    /// Writes the report to stdout and, if set, appends it to the report file
    pub fn emit(&self) -> io::Result<()> {
        let format = *REPORT_FORMAT.lock().unwrap_or_else(|e| e.into_inner());
        let report_file = REPORT_FILE.lock().unwrap_or_else(|e| e.into_inner()).clone();

        match format {
            ReportFormat::Pretty => self.emit_pretty(report_file.as_deref()),
            ReportFormat::Json => self.emit_json(report_file.as_deref()),
        }
    }

    fn emit_pretty(&self, report_file: Option<&Path>) -> io::Result<()> {
        let level = match self.level {
            Level::Info => self.level.as_str().green(),
            Level::Warn => self.level.as_str().yellow(),
            Level::Error => self.level.as_str().red(),
        };
        let time = self
            .timestamp
            .split('T')
            .nth(1)
            .unwrap_or(&self.timestamp)
            .split('.')
            .next()
            .unwrap_or("");
        println!("{} [{}] [{}] {}", time, level, self.tag, self.message);

        if let Some(path) = report_file {
            let plain_line = format!(
                "{} [{}] [{}] {}",
                self.timestamp,
                self.level.as_str(),
                self.tag,
                self.message
            );
            append_to_file(path, &plain_line)?;
        }
        Ok(())
    }

    fn emit_json(&self, report_file: Option<&Path>) -> io::Result<()> {
        let json = serde_json::to_string(&self)?;
        println!("{}", json);

        if let Some(path) = report_file {
            append_to_file(path, &json)?;
        }
        Ok(())
    }
}

pub fn set_report_format(format: ReportFormat) {
    *REPORT_FORMAT.lock().unwrap_or_else(|e| e.into_inner()) = format;
}

pub fn report_format() -> ReportFormat {
    *REPORT_FORMAT.lock().unwrap_or_else(|e| e.into_inner())
}

pub fn set_report_file(path: Option<PathBuf>) {
    *REPORT_FILE.lock().unwrap_or_else(|e| e.into_inner()) = path;
}

fn append_to_file(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", content)
}
