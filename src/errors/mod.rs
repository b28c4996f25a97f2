//! # Error Handling
//!
//! Error types for the routeplane control plane, built on `thiserror`.
//!
//! Most failures inside a rebuild never surface here: malformed objects and
//! unparseable policy values degrade to safe defaults. This type covers the
//! failures that do stop something, such as bad process configuration, an
//! unreadable manifest or a broken ordering guarantee.

use tonic::Status;

/// Custom result type for routeplane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the routeplane control plane
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network transport errors (gRPC)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest or payload decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A versioning or snapshot guarantee was broken
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a new invariant violation
    pub fn invariant<S: Into<String>>(message: S) -> Self {
        Self::Invariant(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(error: tonic::transport::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        // Display walks nested structs, field_errors() would not.
        Self::Config(format!("Validation failed: {}", errors))
    }
}

impl From<Error> for Status {
    fn from(error: Error) -> Self {
        match error {
            Error::Config(msg) => Status::invalid_argument(msg),
            Error::Serialization(msg) => Status::invalid_argument(msg),
            Error::Transport(msg) => Status::unavailable(msg),
            Error::Io(err) => Status::internal(err.to_string()),
            Error::Invariant(msg) => Status::internal(format!("invariant violated: {}", msg)),
            Error::Internal(msg) => Status::internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = Error::config("missing port");
        assert!(matches!(error, Error::Config(_)));
        assert_eq!(error.to_string(), "Configuration error: missing port");
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Io(_)));

        let yaml_error = serde_yaml::from_str::<Vec<u32>>("{not: a list}").unwrap_err();
        let error: Error = yaml_error.into();
        assert!(matches!(error, Error::Serialization(_)));
    }

    #[test]
    fn test_status_mapping() {
        let status: Status = Error::invariant("version 3 after 4").into();
        assert_eq!(status.code(), tonic::Code::Internal);
        assert!(status.message().contains("version 3 after 4"));

        let status: Status = Error::config("bad").into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }
}
