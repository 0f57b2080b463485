use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::classify::{classify, Classification};
use crate::error::{Interrupted, UtilityError};
use crate::inventory::list_external_disks;
use crate::journal::Journal;
use crate::model::{
    DiskId, DiskOutcome, DiskRecord, DiskReport, RunMode, SweepReport, REPORT_VERSION,
};
use crate::recovery::{RunControl, Trigger, UnmountedSet};
use crate::utility::DiskUtility;

const SEPARATOR: &str = "----------------------------------------";

/// Upper bound on a single wait between unmount attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub mode: RunMode,
    /// Extra unmount attempts for a busy disk. Zero means a single attempt.
    pub unmount_retries: u32,
    /// Delay before the first retry; doubled for each later one, up to
    /// [`MAX_RETRY_DELAY`].
    pub retry_delay: Duration,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Normal,
            unmount_retries: 0,
            retry_delay: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStatus {
    Completed,
    Interrupted,
}

/// How a disk reached the verify step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    /// This run unmounted it and owns the remount.
    Unmounted,
    /// It was not mounted to begin with.
    AlreadyUnmounted,
    /// Dry run on a mounted disk.
    WouldUnmount,
    Failed,
}

/// One sweep over the external disks of this host.
///
/// Shared between the sweeping thread and the signal thread, so every field is
/// usable through `&self`.
#[derive(Debug)]
pub struct Session<U: DiskUtility> {
    pub(crate) utility: U,
    pub(crate) journal: Journal,
    pub(crate) unmounted: UnmountedSet,
    pub(crate) control: RunControl,
    options: SweepOptions,
    run_id: String,
    started_at: String,
    reports: Mutex<Vec<DiskReport>>,
}

impl<U: DiskUtility> Session<U> {
    pub fn new(utility: U, journal: Journal, options: SweepOptions) -> Self {
        Self {
            utility,
            journal,
            unmounted: UnmountedSet::default(),
            control: RunControl::default(),
            options,
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            reports: Mutex::new(Vec::new()),
        }
    }

    pub fn utility(&self) -> &U {
        &self.utility
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn mode(&self) -> RunMode {
        self.options.mode
    }

    pub fn unmounted(&self) -> &UnmountedSet {
        &self.unmounted
    }

    /// Checks every external disk in turn, then finalizes the run.
    pub fn run(&self) -> SweepStatus {
        let status = self.sweep_disks();
        let trigger = match status {
            SweepStatus::Completed => Trigger::Completion,
            SweepStatus::Interrupted => {
                self.journal.info("Halting further disk processing after interrupt.");
                Trigger::Signal
            }
        };
        self.finalize(trigger);
        status
    }

    fn sweep_disks(&self) -> SweepStatus {
        self.journal.info(format!(
            "Starting disk checks in '{}' mode.",
            self.options.mode
        ));

        let Ok(disks) = self
            .control
            .step(|| list_external_disks(&self.utility, &self.journal))
        else {
            return SweepStatus::Interrupted;
        };

        if disks.is_empty() {
            self.journal.info("No external disks found to check.");
        }
        for disk in disks {
            self.journal.info(SEPARATOR);
            self.journal.info(format!("Checking {disk}..."));
            match self.check_disk(disk.clone()) {
                Ok(report) => {
                    self.reports
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(report);
                    self.journal.info(format!("Done with {disk}."));
                }
                Err(Interrupted) => return SweepStatus::Interrupted,
            }
        }

        self.journal.info(SEPARATOR);
        self.journal.info("Disk Check Completed.");
        SweepStatus::Completed
    }

    /// Walks one disk through classify, unmount, verify/repair and remount.
    pub fn check_disk(&self, id: DiskId) -> Result<DiskReport, Interrupted> {
        let mut record = DiskRecord::new(id);
        let classification = self
            .control
            .step(|| classify(&self.utility, &mut record, &self.journal))?;

        let filesystem = match classification {
            Classification::Supported(filesystem) => filesystem,
            Classification::Unsupported(filesystem) => {
                self.journal.error(format!(
                    "Unsupported or unknown filesystem type '{filesystem}' for {}. Skipping verification.",
                    record.id
                ));
                return Ok(skipped(record, DiskOutcome::SkippedUnsupportedFilesystem));
            }
            Classification::Unknown(reason) => {
                self.journal.error(format!(
                    "Unable to determine filesystem type for {} ({reason}). Skipping verification.",
                    record.id
                ));
                return Ok(skipped(record, DiskOutcome::SkippedUnknownFilesystem));
            }
        };

        let release = self.release(&mut record)?;
        if release == Release::Failed {
            return Ok(skipped(record, DiskOutcome::SkippedUnmountFailed));
        }

        let outcome = self.verify_and_repair(&record.id, &filesystem)?;
        let remount_failed = self.remount(&record.id, release)?;

        Ok(DiskReport {
            disk: record.id,
            filesystem: Some(filesystem),
            outcome,
            remount_failed,
        })
    }

    fn release(&self, record: &mut DiskRecord) -> Result<Release, Interrupted> {
        let id = record.id.clone();
        let mounted = match self.control.step(|| self.utility.disk_info(&id))? {
            Ok(details) => details.mounted,
            Err(err) => {
                self.journal.error(format!(
                    "Unable to determine mount status of {id}. Skipping verification. Error: {}",
                    err.detail()
                ));
                return Ok(Release::Failed);
            }
        };
        record.mounted = Some(mounted);

        if !mounted {
            self.journal.info(format!("{id} is not mounted. No need to unmount."));
            return Ok(Release::AlreadyUnmounted);
        }
        if self.options.mode == RunMode::DryRun {
            self.journal.info(format!("Dry run: Would attempt to unmount {id}."));
            return Ok(Release::WouldUnmount);
        }

        self.journal.info(format!("{id} is mounted. Attempting to unmount..."));
        match self.unmount_with_retry(&id)? {
            Ok(()) => {
                record.mounted = Some(false);
                self.journal.info(format!("{id} unmounted successfully."));
                Ok(Release::Unmounted)
            }
            Err(err) => {
                self.journal.error(format!(
                    "Unable to unmount {id}. It may be in use. Skipping verification. Error: {}",
                    err.detail()
                ));
                Ok(Release::Failed)
            }
        }
    }

    fn unmount_with_retry(&self, id: &DiskId) -> Result<Result<(), UtilityError>, Interrupted> {
        let mut attempt = 0_u32;
        loop {
            let result = self.control.step(|| {
                let result = self.utility.unmount(id);
                if result.is_ok() {
                    self.unmounted.insert(id.clone());
                }
                result
            })?;

            let Err(err) = result else {
                return Ok(Ok(()));
            };
            if attempt >= self.options.unmount_retries {
                return Ok(Err(err));
            }
            attempt += 1;
            let delay = backoff(self.options.retry_delay, attempt);
            self.journal.info(format!(
                "Unmount of {id} failed ({}). Retrying in {} ms (attempt {attempt} of {}).",
                err.detail(),
                delay.as_millis(),
                self.options.unmount_retries
            ));
            self.control.pause(delay)?;
        }
    }

    fn verify_and_repair(&self, id: &DiskId, filesystem: &str) -> Result<DiskOutcome, Interrupted> {
        if self.options.mode == RunMode::DryRun {
            self.journal.info(format!(
                "Dry run: Would verify {id} with filesystem type {filesystem}."
            ));
            return Ok(DiskOutcome::Simulated);
        }

        self.journal.info(format!(
            "Verifying {id} with filesystem type {filesystem}..."
        ));
        let verify_err = match self.control.step(|| self.utility.verify(id))? {
            Ok(()) => {
                self.journal.info(format!("{id} verification succeeded."));
                return Ok(DiskOutcome::Verified);
            }
            Err(err) => err,
        };

        self.journal.info(format!(
            "{id} verification found issues: {}",
            verify_err.detail()
        ));
        self.journal.info(format!("Attempting to repair {id}..."));
        match self.control.step(|| self.utility.repair(id))? {
            Ok(()) => {
                self.journal.info(format!("{id} repair succeeded."));
                Ok(DiskOutcome::Repaired)
            }
            Err(err) => {
                self.journal.critical(format!(
                    "{id} repair failed. Manual intervention required: {}",
                    err.detail()
                ));
                Ok(DiskOutcome::ManualIntervention)
            }
        }
    }

    /// Returns whether the remount failed.
    fn remount(&self, id: &DiskId, release: Release) -> Result<bool, Interrupted> {
        if release == Release::WouldUnmount {
            self.journal.info(format!("Dry run: Would attempt to remount {id}."));
            return Ok(false);
        }
        if !self.unmounted.contains(id) {
            debug!(disk = %id, "not unmounted by this run; leaving mount state alone");
            return Ok(false);
        }

        let result = self.control.step(|| {
            self.journal.info(format!("Attempting to remount {id}..."));
            let result = self.utility.mount(id);
            if result.is_ok() {
                self.unmounted.remove(id);
            }
            result
        })?;
        match result {
            Ok(()) => {
                self.journal.info(format!("{id} remounted successfully."));
                Ok(false)
            }
            Err(err) => {
                self.journal.error(format!(
                    "Unable to remount {id}. You may need to remount it manually. Error: {}",
                    err.detail()
                ));
                Ok(true)
            }
        }
    }

    pub fn disk_reports(&self) -> Vec<DiskReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn report(&self, status: SweepStatus) -> SweepReport {
        SweepReport {
            report_version: REPORT_VERSION.to_string(),
            run_id: self.run_id.clone(),
            mode: self.options.mode,
            started_at: self.started_at.clone(),
            finished_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            disks: self.disk_reports(),
            error_count: self.journal.error_count(),
            summary: self
                .control
                .summary()
                .unwrap_or_else(|| self.journal.summarize()),
            interrupted: status == SweepStatus::Interrupted || self.is_interrupted(),
            left_unmounted: self.unmounted.snapshot(),
        }
    }
}

/// Wait before retry number `attempt` (1-based): the base delay doubled per
/// earlier retry, capped at [`MAX_RETRY_DELAY`].
fn backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 1_u32 << attempt.saturating_sub(1).min(16);
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

fn skipped(record: DiskRecord, outcome: DiskOutcome) -> DiskReport {
    DiskReport {
        disk: record.id,
        filesystem: record.filesystem,
        outcome,
        remount_failed: false,
    }
}
