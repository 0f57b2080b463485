use std::fmt;

use serde::{Deserialize, Serialize};

pub const REPORT_VERSION: &str = "1.0.0";

/// Opaque name of a physical block device, e.g. `/dev/disk4`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct DiskId(String);

impl DiskId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `partition` is this disk or one of its slices.
    ///
    /// `/dev/disk2` hosts `/dev/disk2s1` but not `/dev/disk21s1`.
    pub fn hosts(&self, partition: &str) -> bool {
        let Some(rest) = partition.strip_prefix(self.as_str()) else {
            return false;
        };
        if rest.is_empty() {
            return true;
        }
        let mut chars = rest.chars();
        chars.next() == Some('s') && chars.next().is_some_and(|c| c.is_ascii_digit())
    }
}

impl fmt::Display for DiskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DiskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Normal,
    DryRun,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Normal => f.write_str("normal"),
            RunMode::DryRun => f.write_str("dry"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Error,
    /// Repair failed; an operator has to look at the disk.
    Critical,
}

impl Severity {
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Error | Severity::Critical)
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// Structured view of `diskutil info` for one disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskDetails {
    pub filesystem: Option<String>,
    pub mounted: bool,
}

/// Per-disk state while the sweep walks it. Discarded at end of run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRecord {
    pub id: DiskId,
    pub filesystem: Option<String>,
    pub mounted: Option<bool>,
}

impl DiskRecord {
    pub fn new(id: DiskId) -> Self {
        Self {
            id,
            filesystem: None,
            mounted: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiskOutcome {
    Verified,
    Repaired,
    ManualIntervention,
    SkippedUnknownFilesystem,
    SkippedUnsupportedFilesystem,
    SkippedUnmountFailed,
    Simulated,
}

impl DiskOutcome {
    pub fn is_skip(self) -> bool {
        matches!(
            self,
            DiskOutcome::SkippedUnknownFilesystem
                | DiskOutcome::SkippedUnsupportedFilesystem
                | DiskOutcome::SkippedUnmountFailed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskReport {
    pub disk: DiskId,
    pub filesystem: Option<String>,
    pub outcome: DiskOutcome,
    #[serde(default)]
    pub remount_failed: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Summary {
    AllChecksPassed,
    ManualReviewRequired,
}

impl Summary {
    pub fn from_error_count(errors: usize) -> Self {
        if errors == 0 {
            Summary::AllChecksPassed
        } else {
            Summary::ManualReviewRequired
        }
    }

    pub fn recommendation(self) -> &'static str {
        match self {
            Summary::AllChecksPassed => "all checks passed",
            Summary::ManualReviewRequired => "manual review required - see error log",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepReport {
    pub report_version: String,
    pub run_id: String,
    pub mode: RunMode,
    pub started_at: String,
    pub finished_at: String,
    pub disks: Vec<DiskReport>,
    pub error_count: usize,
    pub summary: Summary,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub left_unmounted: Vec<DiskId>,
}
