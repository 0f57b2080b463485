use crate::journal::Journal;
use crate::model::DiskId;
use crate::utility::DiskUtility;

/// External physical disks that do not host any system partition.
///
/// Enumeration failures are logged and yield an empty list; the sweep then
/// reports that there is nothing to check. If the system signature cannot be
/// read no disk is returned, since boot media could not be ruled out.
pub fn list_external_disks(utility: &dyn DiskUtility, journal: &Journal) -> Vec<DiskId> {
    let candidates = match utility.list_external_disks() {
        Ok(candidates) => candidates,
        Err(err) => {
            journal.error(format!(
                "Failed to list external physical disks. Error: {}",
                err.detail()
            ));
            return Vec::new();
        }
    };
    if candidates.is_empty() {
        journal.info("Found external disks: None");
        return candidates;
    }

    let system_partitions = match utility.list_system_partitions() {
        Ok(partitions) => partitions,
        Err(err) => {
            journal.error(format!(
                "Failed to identify system disks; refusing to touch any disk. Error: {}",
                err.detail()
            ));
            return Vec::new();
        }
    };

    let disks = exclude_system_disks(candidates, &system_partitions, journal);
    journal.info(format!(
        "Found external disks: {}",
        if disks.is_empty() {
            "None".to_string()
        } else {
            disks
                .iter()
                .map(DiskId::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        }
    ));
    disks
}

fn exclude_system_disks(
    candidates: Vec<DiskId>,
    system_partitions: &[String],
    journal: &Journal,
) -> Vec<DiskId> {
    candidates
        .into_iter()
        .filter(|disk| {
            let is_system = system_partitions
                .iter()
                .any(|partition| disk.hosts(partition));
            if is_system {
                journal.info(format!("{disk} is identified as a system disk."));
            }
            !is_system
        })
        .collect()
}
