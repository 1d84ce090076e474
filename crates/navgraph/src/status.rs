//! Status codes for graph and traversal operations

/// Status enum for graph and traversal operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Operation was successful
    Success,
    /// Operation failed due to an unknown reason
    Failure,
    /// Provided parameter was invalid
    InvalidParam,
    /// Operation ran out of preallocated capacity
    OutOfMemory,
    /// Caller-provided buffer is too small
    BufferTooSmall,
    /// Search is still running
    InProgress,
    /// Value does not exist or is not found
    NotFound,
    /// Reference points into a cell that has been unstitched
    StaleReference,
    /// Value already exists
    AlreadyExists,
    /// Search exhausted the graph without reaching the destination
    Unreachable,
    /// Search gave up after hitting a configured distance or cost ceiling
    BoundExceeded,
    /// Input data is corrupted or invalid
    DataCorrupted,
    /// File has wrong magic number
    WrongMagic,
    /// File has wrong version
    WrongVersion,
}

impl Status {
    /// Checks if the status is a failure
    pub fn is_failure(&self) -> bool {
        !self.is_success() && !self.is_in_progress()
    }

    /// Checks if the status is a success
    pub fn is_success(&self) -> bool {
        *self == Status::Success
    }

    /// Checks if the operation has not finished yet
    pub fn is_in_progress(&self) -> bool {
        *self == Status::InProgress
    }

    /// Converts status to a result
    pub fn to_result<T>(self, value: T) -> std::result::Result<T, Status> {
        if self.is_success() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl std::error::Error for Status {}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Success => write!(f, "Success"),
            Status::Failure => write!(f, "Failure"),
            Status::InvalidParam => write!(f, "Invalid parameter"),
            Status::OutOfMemory => write!(f, "Out of memory"),
            Status::BufferTooSmall => write!(f, "Buffer too small"),
            Status::InProgress => write!(f, "Operation in progress"),
            Status::NotFound => write!(f, "Value not found"),
            Status::StaleReference => write!(f, "Stale reference"),
            Status::AlreadyExists => write!(f, "Value already exists"),
            Status::Unreachable => write!(f, "Destination unreachable"),
            Status::BoundExceeded => write!(f, "Search bound exceeded"),
            Status::DataCorrupted => write!(f, "Data corrupted"),
            Status::WrongMagic => write!(f, "Wrong magic number"),
            Status::WrongVersion => write!(f, "Wrong version"),
        }
    }
}

impl From<Status> for navgraph_common::Error {
    fn from(status: Status) -> Self {
        navgraph_common::Error::Graph(status.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(Status::Success.is_success());
        assert!(!Status::Success.is_failure());
        assert!(Status::InProgress.is_in_progress());
        assert!(!Status::InProgress.is_failure());
        assert!(Status::Unreachable.is_failure());
        assert!(Status::BoundExceeded.is_failure());
    }

    #[test]
    fn test_to_result() {
        assert_eq!(Status::Success.to_result(5), Ok(5));
        assert_eq!(Status::NotFound.to_result(5), Err(Status::NotFound));
    }

    #[test]
    fn test_into_error() {
        let err: navgraph_common::Error = Status::StaleReference.into();
        assert_eq!(err.to_string(), "graph error: Stale reference");
    }
}
