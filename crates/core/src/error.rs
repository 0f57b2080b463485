use thiserror::Error;

/// Failure of one call into the disk utility.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UtilityError {
    #[error("failed to run {command}: {message}")]
    Spawn { command: String, message: String },

    #[error("{command} failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("field '{0}' missing from disk utility output")]
    MissingField(String),
}

impl UtilityError {
    /// Message the way operators read it in the logs: stderr of the failed call.
    pub fn detail(&self) -> &str {
        match self {
            UtilityError::Spawn { message, .. } | UtilityError::CommandFailed { message, .. } => {
                message
            }
            UtilityError::MissingField(field) => field,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrerequisiteError {
    #[error("this tool must be run as root; please use sudo")]
    NotPrivileged,

    #[error("required command(s) not found: {}", .0.join(", "))]
    MissingCommands(Vec<String>),
}

/// An interrupt was delivered; no further disk steps may start.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("sweep interrupted")]
pub struct Interrupted;
