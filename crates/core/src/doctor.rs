use std::env;

use serde::{Deserialize, Serialize};
use sysinfo::Disks;

use crate::error::PrerequisiteError;
use crate::journal::Journal;
use crate::utility::DISKUTIL;

/// Commands the sweep shells out to.
pub const REQUIRED_COMMANDS: &[&str] = &[DISKUTIL];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorInfo {
    pub os: String,
    pub arch: String,
    pub privileged: bool,
    pub missing_commands: Vec<String>,
    pub volumes: Vec<VolumeInfo>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeInfo {
    pub name: String,
    pub mount_point: String,
    pub file_system: String,
    pub is_removable: bool,
}

pub fn collect_doctor_info() -> DoctorInfo {
    let privileged = is_privileged();
    let missing_commands = missing_commands(REQUIRED_COMMANDS);
    let volumes = enumerate_volumes();

    let mut notes = Vec::new();
    if !privileged {
        notes.push("Not running as root; `check` will refuse to start.".to_string());
    }
    if !missing_commands.is_empty() {
        notes.push(format!(
            "Missing required command(s) on PATH: {}",
            missing_commands.join(", ")
        ));
    }
    if volumes.is_empty() {
        notes.push("No mounted volumes detected by sysinfo.".to_string());
    }

    DoctorInfo {
        os: env::consts::OS.to_string(),
        arch: env::consts::ARCH.to_string(),
        privileged,
        missing_commands,
        volumes,
        notes,
    }
}

/// Gate run before any disk is touched. Every problem is logged; the first
/// one found is returned.
pub fn check_prerequisites(journal: &Journal) -> Result<(), PrerequisiteError> {
    let missing = missing_commands(REQUIRED_COMMANDS);
    if !missing.is_empty() {
        for command in &missing {
            journal.error(format!(
                "Required command '{command}' not found or not executable."
            ));
        }
        journal.error(format!(
            "Current PATH: {}",
            env::var("PATH").unwrap_or_default()
        ));
        journal.error(
            "One or more required commands are missing. Please install them or ensure they are in your PATH.",
        );
        return Err(PrerequisiteError::MissingCommands(missing));
    }

    if !is_privileged() {
        journal.error("This tool must be run as root. Please use sudo.");
        return Err(PrerequisiteError::NotPrivileged);
    }
    Ok(())
}

pub fn missing_commands(commands: &[&str]) -> Vec<String> {
    commands
        .iter()
        .filter(|command| which::which(command).is_err())
        .map(|command| command.to_string())
        .collect()
}

#[cfg(unix)]
pub fn is_privileged() -> bool {
    nix::unistd::Uid::effective().is_root()
}

#[cfg(not(unix))]
pub fn is_privileged() -> bool {
    false
}

fn enumerate_volumes() -> Vec<VolumeInfo> {
    let disks = Disks::new_with_refreshed_list();
    let mut volumes = disks
        .list()
        .iter()
        .map(|disk| VolumeInfo {
            name: disk.name().to_string_lossy().to_string(),
            mount_point: disk.mount_point().to_string_lossy().to_string(),
            file_system: disk.file_system().to_string_lossy().to_string(),
            is_removable: disk.is_removable(),
        })
        .collect::<Vec<_>>();
    volumes.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));
    volumes
}

#[cfg(test)]
mod tests {
    use super::{check_prerequisites, missing_commands};
    use crate::error::PrerequisiteError;
    use crate::journal::Journal;

    #[test]
    fn reports_only_absent_commands() {
        let missing = missing_commands(&["disk-sweep-no-such-tool", "disk-sweep-other-missing"]);
        assert_eq!(
            missing,
            vec![
                "disk-sweep-no-such-tool".to_string(),
                "disk-sweep-other-missing".to_string()
            ]
        );
    }

    #[test]
    fn prerequisite_failure_is_logged() {
        let journal = Journal::in_memory();
        match check_prerequisites(&journal) {
            Ok(()) => assert_eq!(journal.error_count(), 0),
            Err(PrerequisiteError::MissingCommands(missing)) => {
                assert!(!missing.is_empty());
                assert!(journal.error_count() >= missing.len() + 2);
            }
            Err(PrerequisiteError::NotPrivileged) => assert_eq!(journal.error_count(), 1),
        }
    }
}
