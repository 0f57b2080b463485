//! Guaranteed remount of every disk this run unmounted.
//!
//! Three triggers reach [`Session::finalize`]: normal completion, a delivered
//! SIGINT/SIGTERM, and [`FinalizeOnDrop`] for early returns and panics. The
//! first one to arrive does the work; later calls are no-ops.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::Interrupted;
use crate::model::{DiskId, Summary};
use crate::sweep::Session;
use crate::utility::DiskUtility;

/// Disks unmounted by this run and not yet remounted.
///
/// An id is inserted only after the unmount call succeeded and removed only
/// after the mount call succeeded, both while the step gate is held.
#[derive(Debug, Default)]
pub struct UnmountedSet {
    disks: Mutex<BTreeSet<DiskId>>,
}

impl UnmountedSet {
    fn lock(&self) -> MutexGuard<'_, BTreeSet<DiskId>> {
        self.disks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, disk: DiskId) {
        self.lock().insert(disk);
    }

    pub(crate) fn remove(&self, disk: &DiskId) {
        self.lock().remove(disk);
    }

    pub fn contains(&self, disk: &DiskId) -> bool {
        self.lock().contains(disk)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<DiskId> {
        self.lock().iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Completion,
    Signal,
    Exit,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Completion => f.write_str("run completion"),
            Trigger::Signal => f.write_str("interrupt"),
            Trigger::Exit => f.write_str("unexpected exit"),
        }
    }
}

/// Serializes disk steps against the finalizer and carries the one-shot flags.
#[derive(Debug, Default)]
pub(crate) struct RunControl {
    gate: Mutex<()>,
    pause: Mutex<()>,
    resume: Condvar,
    interrupted: AtomicBool,
    finalized: AtomicBool,
    summary: Mutex<Option<Summary>>,
}

impl RunControl {
    /// Runs `f` as one uninterruptible step, unless an interrupt already arrived
    /// or the run was finalized.
    pub(crate) fn step<T>(&self, f: impl FnOnce() -> T) -> Result<T, Interrupted> {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if self.interrupted.load(Ordering::SeqCst) || self.finalized.load(Ordering::SeqCst) {
            return Err(Interrupted);
        }
        Ok(f())
    }

    /// Waits up to `delay` between steps. Returns early with [`Interrupted`]
    /// once the run is interrupted or finalized.
    pub(crate) fn pause(&self, delay: Duration) -> Result<(), Interrupted> {
        let deadline = Instant::now() + delay;
        let mut guard = self.pause.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.is_interrupted() || self.is_finalized() {
                return Err(Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            guard = self
                .resume
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Wakes any [`RunControl::pause`] so it sees the latest flags.
    fn wake(&self) {
        let _pause = self.pause.lock().unwrap_or_else(PoisonError::into_inner);
        self.resume.notify_all();
    }

    pub(crate) fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub(crate) fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    pub(crate) fn summary(&self) -> Option<Summary> {
        *self.summary.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<U: DiskUtility> Session<U> {
    /// Marks the run interrupted, waits for any in-flight step, then finalizes.
    pub fn interrupt(&self) -> Option<Summary> {
        if !self.control.interrupted.swap(true, Ordering::SeqCst) {
            self.journal
                .info("Interrupt received. Waiting for the current step to finish before cleanup.");
        }
        self.control.wake();
        self.finalize(Trigger::Signal)
    }

    pub fn is_interrupted(&self) -> bool {
        self.control.is_interrupted()
    }

    pub fn is_finalized(&self) -> bool {
        self.control.is_finalized()
    }

    /// Remounts every disk still in the unmounted set, then appends the
    /// summary. Returns the summary only for the call that did the work.
    pub fn finalize(&self, trigger: Trigger) -> Option<Summary> {
        let _gate = self
            .control
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.control.finalized.load(Ordering::SeqCst) {
            return None;
        }

        let pending = self.unmounted.snapshot();
        if trigger != Trigger::Completion || !pending.is_empty() {
            self.journal.info(format!("Performing cleanup after {trigger}."));
        }
        for disk in pending {
            self.journal.info(format!("Attempting to remount {disk} during cleanup..."));
            match self.utility.mount(&disk) {
                Ok(()) => {
                    self.unmounted.remove(&disk);
                    self.journal.info(format!("{disk} remounted successfully."));
                }
                Err(err) => self.journal.error(format!(
                    "Unable to remount {disk} during cleanup. Remount it manually. Error: {}",
                    err.detail()
                )),
            }
        }

        let summary = self.journal.append_summary();
        *self
            .control
            .summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(summary);
        self.control.finalized.store(true, Ordering::SeqCst);
        self.control.wake();
        Some(summary)
    }

    /// Guard that finalizes the session when dropped, covering early returns
    /// and unwinding panics.
    pub fn finalize_on_drop(self: &Arc<Self>) -> FinalizeOnDrop<U> {
        FinalizeOnDrop {
            session: Arc::clone(self),
        }
    }
}

pub struct FinalizeOnDrop<U: DiskUtility> {
    session: Arc<Session<U>>,
}

impl<U: DiskUtility> Drop for FinalizeOnDrop<U> {
    fn drop(&mut self) {
        self.session.finalize(Trigger::Exit);
    }
}
