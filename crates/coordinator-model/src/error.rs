use thiserror::Error;

/// The coarse category of a coordinator failure.
///
/// Every public `Coordinator` operation is total on well-formed input;
/// anything it rejects is reported through one of these kinds rather
/// than a panic or an unchecked exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    DuplicateJob,
    UnknownJob,
    FaultyResult,
    ClientRejected,
    Internal,
}

/// An error raised by a coordinator operation, carrying the offending
/// detail (a key, a field list, or a human-readable note) alongside
/// its [`ErrorKind`].
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("duplicate job: {0}")]
    DuplicateJob(String),

    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("faulty result: {0}")]
    FaultyResult(String),

    #[error("client rejected: {0}")]
    ClientRejected(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::InvalidInput(_) => ErrorKind::InvalidInput,
            CoordinatorError::DuplicateJob(_) => ErrorKind::DuplicateJob,
            CoordinatorError::UnknownJob(_) => ErrorKind::UnknownJob,
            CoordinatorError::FaultyResult(_) => ErrorKind::FaultyResult,
            CoordinatorError::ClientRejected(_) => ErrorKind::ClientRejected,
            CoordinatorError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn invalid_fields(fields: &[&str]) -> Self {
        CoordinatorError::InvalidInput(format!("invalid:{}", fields.join(",")))
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
