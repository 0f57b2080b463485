#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use disk_sweep_core::{DiskDetails, DiskId, DiskUtility, UtilityError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Info(DiskId),
    Unmount(DiskId),
    Mount(DiskId),
    Verify(DiskId),
    Repair(DiskId),
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Call::Info(_))
    }

    pub fn disk(&self) -> &DiskId {
        match self {
            Call::Info(disk)
            | Call::Unmount(disk)
            | Call::Mount(disk)
            | Call::Verify(disk)
            | Call::Repair(disk) => disk,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeDisk {
    pub filesystem: Option<String>,
    pub mounted: bool,
    pub info_fails: bool,
    pub unmount_failures: u32,
    pub mount_failures: u32,
    pub verify_fails: bool,
    pub repair_fails: bool,
}

impl FakeDisk {
    pub fn mounted(filesystem: &str) -> Self {
        Self {
            filesystem: Some(filesystem.to_string()),
            mounted: true,
            info_fails: false,
            unmount_failures: 0,
            mount_failures: 0,
            verify_fails: false,
            repair_fails: false,
        }
    }

    pub fn unmounted(filesystem: &str) -> Self {
        Self {
            mounted: false,
            ..Self::mounted(filesystem)
        }
    }

    pub fn without_filesystem() -> Self {
        Self {
            filesystem: None,
            ..Self::mounted("apfs")
        }
    }

    pub fn unmount_fails(mut self, times: u32) -> Self {
        self.unmount_failures = times;
        self
    }

    pub fn mount_fails(mut self, times: u32) -> Self {
        self.mount_failures = times;
        self
    }

    pub fn verify_fails(mut self) -> Self {
        self.verify_fails = true;
        self
    }

    pub fn repair_fails(mut self) -> Self {
        self.repair_fails = true;
        self
    }
}

struct VerifyGate {
    disk: DiskId,
    started: Sender<()>,
    release: Receiver<()>,
}

/// Scripted disk utility that records every call.
#[derive(Default)]
pub struct FakeDiskUtility {
    order: Vec<DiskId>,
    disks: Mutex<BTreeMap<DiskId, FakeDisk>>,
    system: Vec<String>,
    listing_fails: bool,
    calls: Mutex<Vec<Call>>,
    verify_gate: Mutex<Option<VerifyGate>>,
}

fn failure(command: &str, disk: &DiskId, message: &str) -> UtilityError {
    UtilityError::CommandFailed {
        command: format!("diskutil {command} {disk}"),
        message: message.to_string(),
    }
}

impl FakeDiskUtility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_disk(mut self, id: &str, disk: FakeDisk) -> Self {
        let id = DiskId::new(id);
        self.order.push(id.clone());
        self.disks
            .get_mut()
            .expect("fake lock")
            .insert(id, disk);
        self
    }

    pub fn with_system_partition(mut self, partition: &str) -> Self {
        self.system.push(partition.to_string());
        self
    }

    pub fn with_failing_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    /// Makes `verify` on `disk` signal `started` and then block until `release` fires.
    pub fn block_verify(&self, disk: &str) -> (Receiver<()>, Sender<()>) {
        let (started_tx, started_rx) = channel();
        let (release_tx, release_rx) = channel();
        *self.verify_gate.lock().expect("fake lock") = Some(VerifyGate {
            disk: DiskId::new(disk),
            started: started_tx,
            release: release_rx,
        });
        (started_rx, release_tx)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("fake lock").clone()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(Call::is_mutating)
            .collect()
    }

    pub fn calls_for(&self, disk: &str) -> Vec<Call> {
        let disk = DiskId::new(disk);
        self.calls()
            .into_iter()
            .filter(|call| call.disk() == &disk)
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|seen| *seen == call).count()
    }

    pub fn is_mounted(&self, disk: &str) -> bool {
        self.disks
            .lock()
            .expect("fake lock")
            .get(&DiskId::new(disk))
            .is_some_and(|disk| disk.mounted)
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("fake lock").push(call);
    }

    fn with_state<T>(&self, disk: &DiskId, f: impl FnOnce(&mut FakeDisk) -> T) -> T {
        let mut disks = self.disks.lock().expect("fake lock");
        let state = disks.get_mut(disk).expect("disk is scripted");
        f(state)
    }
}

impl DiskUtility for FakeDiskUtility {
    fn list_external_disks(&self) -> Result<Vec<DiskId>, UtilityError> {
        if self.listing_fails {
            return Err(UtilityError::CommandFailed {
                command: "diskutil list external physical".to_string(),
                message: "Unable to enumerate disks".to_string(),
            });
        }
        Ok(self.order.clone())
    }

    fn list_system_partitions(&self) -> Result<Vec<String>, UtilityError> {
        if self.system.is_empty() {
            Ok(vec!["/dev/disk0s2".to_string(), "/dev/disk3".to_string()])
        } else {
            Ok(self.system.clone())
        }
    }

    fn disk_info(&self, disk: &DiskId) -> Result<DiskDetails, UtilityError> {
        self.record(Call::Info(disk.clone()));
        self.with_state(disk, |state| {
            if state.info_fails {
                return Err(failure("info", disk, "Could not find disk"));
            }
            Ok(DiskDetails {
                filesystem: state.filesystem.clone(),
                mounted: state.mounted,
            })
        })
    }

    fn unmount(&self, disk: &DiskId) -> Result<(), UtilityError> {
        self.record(Call::Unmount(disk.clone()));
        self.with_state(disk, |state| {
            if state.unmount_failures > 0 {
                state.unmount_failures -= 1;
                return Err(failure("unmountDisk", disk, "Resource busy"));
            }
            state.mounted = false;
            Ok(())
        })
    }

    fn mount(&self, disk: &DiskId) -> Result<(), UtilityError> {
        self.record(Call::Mount(disk.clone()));
        self.with_state(disk, |state| {
            if state.mount_failures > 0 {
                state.mount_failures -= 1;
                return Err(failure("mountDisk", disk, "Volume failed to mount"));
            }
            state.mounted = true;
            Ok(())
        })
    }

    fn verify(&self, disk: &DiskId) -> Result<(), UtilityError> {
        self.record(Call::Verify(disk.clone()));
        let gate = {
            let mut slot = self.verify_gate.lock().expect("fake lock");
            match slot.as_ref() {
                Some(gate) if &gate.disk == disk => slot.take(),
                _ => None,
            }
        };
        if let Some(gate) = gate {
            gate.started.send(()).expect("test listens for verify start");
            gate.release.recv().expect("test releases verify");
        }
        self.with_state(disk, |state| {
            if state.verify_fails {
                Err(failure("verifyVolume", disk, "The volume was found corrupt"))
            } else {
                Ok(())
            }
        })
    }

    fn repair(&self, disk: &DiskId) -> Result<(), UtilityError> {
        self.record(Call::Repair(disk.clone()));
        self.with_state(disk, |state| {
            if state.repair_fails {
                Err(failure("repairVolume", disk, "File system check exit code is 8"))
            } else {
                Ok(())
            }
        })
    }
}
