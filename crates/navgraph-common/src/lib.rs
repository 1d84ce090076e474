//! Common types, errors and geometry helpers shared by the navgraph crates

mod geometry;
mod vector;

pub use geometry::*;
pub use vector::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid graph data: {0}")]
    InvalidGraph(String),

    #[error("graph error: {0}")]
    Graph(String),

    #[error("traversal error: {0}")]
    Traversal(String),

    #[error("pathfinding failed: {0}")]
    Pathfinding(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[cfg(feature = "std")]
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for navgraph operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("max_cost must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "invalid configuration: max_cost must be positive"
        );

        let err = Error::Pathfinding("no path".to_string());
        assert_eq!(err.to_string(), "pathfinding failed: no path");
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_io_error_conversion() {
        fn read() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"))?;
            Ok(())
        }
        assert!(matches!(read(), Err(Error::Io(_))));
    }
}
