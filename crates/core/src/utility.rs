use std::process::Command;

use tracing::debug;

use crate::device::{parse_disk_details, parse_disk_list, parse_system_partitions};
use crate::error::UtilityError;
use crate::model::{DiskDetails, DiskId};

/// Fallible structured view over the host's disk utility.
///
/// `unmount`, `mount`, `verify` and `repair` change disk state; the sweep
/// never calls them in dry-run mode.
pub trait DiskUtility: Send + Sync {
    fn list_external_disks(&self) -> Result<Vec<DiskId>, UtilityError>;

    /// Partitions that host the running system's root volume.
    fn list_system_partitions(&self) -> Result<Vec<String>, UtilityError>;

    fn disk_info(&self, disk: &DiskId) -> Result<DiskDetails, UtilityError>;

    fn unmount(&self, disk: &DiskId) -> Result<(), UtilityError>;

    fn mount(&self, disk: &DiskId) -> Result<(), UtilityError>;

    fn verify(&self, disk: &DiskId) -> Result<(), UtilityError>;

    fn repair(&self, disk: &DiskId) -> Result<(), UtilityError>;
}

pub const DISKUTIL: &str = "diskutil";

/// [`DiskUtility`] backed by macOS `diskutil`.
#[derive(Debug, Clone)]
pub struct Diskutil {
    program: String,
}

impl Default for Diskutil {
    fn default() -> Self {
        Self {
            program: DISKUTIL.to_string(),
        }
    }
}

impl Diskutil {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run_capture(&self, args: &[&str]) -> Result<String, UtilityError> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(%command, "running disk utility");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|err| UtilityError::Spawn {
                command: command.clone(),
                message: err.to_string(),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            return Err(UtilityError::CommandFailed { command, message });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl DiskUtility for Diskutil {
    fn list_external_disks(&self) -> Result<Vec<DiskId>, UtilityError> {
        let output = self.run_capture(&["list", "external", "physical"])?;
        Ok(parse_disk_list(&output))
    }

    fn list_system_partitions(&self) -> Result<Vec<String>, UtilityError> {
        let output = self.run_capture(&["info", "/"])?;
        parse_system_partitions(&output)
    }

    fn disk_info(&self, disk: &DiskId) -> Result<DiskDetails, UtilityError> {
        let output = self.run_capture(&["info", disk.as_str()])?;
        Ok(parse_disk_details(&output))
    }

    fn unmount(&self, disk: &DiskId) -> Result<(), UtilityError> {
        self.run_capture(&["unmountDisk", disk.as_str()]).map(drop)
    }

    fn mount(&self, disk: &DiskId) -> Result<(), UtilityError> {
        self.run_capture(&["mountDisk", disk.as_str()]).map(drop)
    }

    fn verify(&self, disk: &DiskId) -> Result<(), UtilityError> {
        self.run_capture(&["verifyVolume", disk.as_str()]).map(drop)
    }

    fn repair(&self, disk: &DiskId) -> Result<(), UtilityError> {
        self.run_capture(&["repairVolume", disk.as_str()]).map(drop)
    }
}
