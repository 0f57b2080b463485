use crate::journal::Journal;
use crate::model::DiskRecord;
use crate::utility::DiskUtility;

/// Filesystem type names the verify/repair pass knows how to handle.
pub const SUPPORTED_FILESYSTEMS: &[&str] = &[
    "apfs", "hfs", "msdos", "exfat", "udf", "ufs", "ntfs", "fat32", "ext4", "btrfs", "xfs",
    "iso9660", "smbfs", "davfs2", "fuseblk", "fuse",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Supported(String),
    Unsupported(String),
    /// The type could not be read; carries the reason.
    Unknown(String),
}

impl Classification {
    pub fn filesystem(&self) -> Option<&str> {
        match self {
            Classification::Supported(fs) | Classification::Unsupported(fs) => Some(fs),
            Classification::Unknown(_) => None,
        }
    }
}

pub fn is_supported(filesystem: &str) -> bool {
    SUPPORTED_FILESYSTEMS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(filesystem))
}

/// Determines the filesystem type of `record`, caching it on the record.
///
/// A disk that was already classified this run is not looked up again.
pub fn classify(
    utility: &dyn DiskUtility,
    record: &mut DiskRecord,
    journal: &Journal,
) -> Classification {
    if record.filesystem.is_none() {
        match utility.disk_info(&record.id) {
            Ok(details) => {
                record.mounted = Some(details.mounted);
                record.filesystem = details.filesystem;
            }
            Err(err) => {
                return Classification::Unknown(format!(
                    "failed to get filesystem info: {}",
                    err.detail()
                ))
            }
        }
    }

    let Some(filesystem) = record.filesystem.clone() else {
        return Classification::Unknown("filesystem type not reported".to_string());
    };
    journal.info(format!(
        "Detected filesystem type for {}: {filesystem}",
        record.id
    ));
    if is_supported(&filesystem) {
        Classification::Supported(filesystem)
    } else {
        Classification::Unsupported(filesystem)
    }
}
