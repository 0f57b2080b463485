use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::model::{Severity, Summary};

pub const DEFAULT_LOG_DIR: &str = "/var/log/disk_checks";

const SUMMARY_HEADER: &str = "===== Summary of Recommendations =====";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub timestamp: String,
    pub severity: Severity,
    pub message: String,
}

/// Append-only event log with an all-events channel and an errors-only channel.
///
/// Every record is mirrored to the console through `tracing`. When opened on a
/// directory the two channels are also persisted as timestamped text files.
#[derive(Debug)]
pub struct Journal {
    state: Mutex<JournalState>,
}

#[derive(Debug, Default)]
struct JournalState {
    events: Vec<Event>,
    errors: Vec<Event>,
    summaries_written: usize,
    files: Option<LogFiles>,
}

#[derive(Debug)]
struct LogFiles {
    events_path: PathBuf,
    errors_path: PathBuf,
    events: File,
    errors: File,
}

impl LogFiles {
    fn create(log_dir: &Path) -> Result<Self> {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
        let stamp = log_stamp(Utc::now());
        let events_path = log_dir.join(format!("check-{stamp}.log"));
        let errors_path = log_dir.join(format!("error-{stamp}.log"));
        let events = open_append(&events_path)?;
        let errors = open_append(&errors_path)?;
        Ok(Self {
            events_path,
            errors_path,
            events,
            errors,
        })
    }
}

/// File-name stamp, in UTC like the timestamps on each line.
fn log_stamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d-%H%M%SZ").to_string()
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

fn write_line(file: &mut File, path: &Path, line: &str) {
    if let Err(err) = writeln!(file, "{line}").and_then(|()| file.flush()) {
        warn!(path = %path.display(), error = %err, "failed to write log line");
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Journal {
    /// Journal that keeps events in memory and on the console only.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(JournalState::default()),
        }
    }

    /// Journal persisted to `check-<stamp>.log` and `error-<stamp>.log` under `log_dir`.
    pub fn open(log_dir: impl AsRef<Path>) -> Result<Self> {
        let files = LogFiles::create(log_dir.as_ref())?;
        Ok(Self {
            state: Mutex::new(JournalState {
                files: Some(files),
                ..JournalState::default()
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, JournalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        let event = Event {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            severity,
            message,
        };
        let line = format!(
            "{} - {} - {}",
            event.timestamp,
            severity.label(),
            event.message
        );

        {
            let mut state = self.lock();
            let JournalState {
                events,
                errors,
                files,
                ..
            } = &mut *state;
            if let Some(files) = files.as_mut() {
                write_line(&mut files.events, &files.events_path, &line);
                if severity.is_error() {
                    write_line(&mut files.errors, &files.errors_path, &line);
                }
            }
            if severity.is_error() {
                errors.push(event.clone());
            }
            events.push(event.clone());
        }

        match severity {
            Severity::Info => info!("{}", event.message),
            Severity::Error => error!("{}", event.message),
            Severity::Critical => error!(manual_intervention = true, "{}", event.message),
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(Severity::Info, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(Severity::Error, message);
    }

    pub fn critical(&self, message: impl Into<String>) {
        self.record(Severity::Critical, message);
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn errors(&self) -> Vec<Event> {
        self.lock().errors.clone()
    }

    pub fn error_count(&self) -> usize {
        self.lock().errors.len()
    }

    /// Recommendation derived from the errors-only channel.
    pub fn summarize(&self) -> Summary {
        Summary::from_error_count(self.error_count())
    }

    /// Writes the summary block to the errors-only log and the matching line
    /// to the all-events channel.
    pub fn append_summary(&self) -> Summary {
        let summary = self.summarize();
        {
            let mut state = self.lock();
            state.summaries_written += 1;
            if let Some(files) = state.files.as_mut() {
                let body = match summary {
                    Summary::AllChecksPassed => "All disk checks completed without errors.",
                    Summary::ManualReviewRequired => {
                        "Some disks encountered issues that require manual intervention. \
                         Please review the above errors and take appropriate actions."
                    }
                };
                write_line(
                    &mut files.errors,
                    &files.errors_path,
                    &format!("\n{SUMMARY_HEADER}\n{body}"),
                );
            }
        }

        match summary {
            Summary::AllChecksPassed => {
                self.info("Summary: No errors detected. All disk checks passed successfully.")
            }
            Summary::ManualReviewRequired => self.info(
                "Summary: Some errors were encountered during the disk check. \
                 Manual review required - see the error log for details.",
            ),
        }
        summary
    }

    /// Number of summary blocks written so far.
    pub fn summaries_written(&self) -> usize {
        self.lock().summaries_written
    }

    pub fn log_paths(&self) -> Option<(PathBuf, PathBuf)> {
        self.lock()
            .files
            .as_ref()
            .map(|files| (files.events_path.clone(), files.errors_path.clone()))
    }
}
