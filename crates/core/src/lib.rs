pub mod classify;
pub mod device;
pub mod doctor;
pub mod error;
pub mod inventory;
pub mod journal;
pub mod markdown;
pub mod model;
pub mod recovery;
pub mod sweep;
pub mod utility;

pub use classify::{classify, is_supported, Classification, SUPPORTED_FILESYSTEMS};
pub use doctor::{check_prerequisites, collect_doctor_info, DoctorInfo, VolumeInfo};
pub use error::{Interrupted, PrerequisiteError, UtilityError};
pub use inventory::list_external_disks;
pub use journal::{Event, Journal, DEFAULT_LOG_DIR};
pub use markdown::render_markdown_summary;
pub use model::{
    DiskDetails, DiskId, DiskOutcome, DiskRecord, DiskReport, RunMode, Severity, Summary,
    SweepReport, REPORT_VERSION,
};
pub use recovery::{FinalizeOnDrop, Trigger, UnmountedSet};
pub use sweep::{Session, SweepOptions, SweepStatus};
pub use utility::{DiskUtility, Diskutil};
