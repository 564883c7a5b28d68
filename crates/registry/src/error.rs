use policy::{Identity, Role};
use storage::CourseId;
use thiserror::Error;

/// Registry errors.
///
/// Every error is returned before any state changes, so a failed call
/// leaves the registry exactly as it was.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller does not hold the role the operation requires.
    #[error("unauthorized account {caller}: only the {required} may perform this action")]
    Unauthorized { caller: Identity, required: Role },

    #[error("course {0} not found")]
    NotFound(CourseId),

    /// Preconditions unmet by the current data, e.g. grading an unenrolled student.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("grade must be between 0 and 100 (got {value})")]
    OutOfRange { value: i64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("registry already initialized")]
    AlreadyInitialized,

    #[error("registry not initialized: journal is empty")]
    NotInitialized,

    #[error("corrupt journal: {0}")]
    CorruptJournal(String),

    #[error("registry lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Policy(policy::Error),
}

impl From<policy::Error> for Error {
    fn from(err: policy::Error) -> Self {
        match err {
            policy::Error::Unauthorized { caller, required } => {
                Error::Unauthorized { caller, required }
            }
            other => Error::Policy(other),
        }
    }
}

/// Coarse classification of [`Error`] for callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    InvalidState,
    OutOfRange,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthorized { .. } => ErrorKind::Unauthorized,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::OutOfRange { .. } => ErrorKind::OutOfRange,
            _ => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
