//! # Error Types
//!
//! Two layers of errors flow through the workspace:
//!
//! - `StoreError` is produced by store implementations (the in-memory engine
//!   and the RESP client) and only describes transport or server failures.
//! - `MapperError` is produced by the mapping layer. It wraps `StoreError`
//!   for single operations and adds the construction, decode, and batch
//!   failures of the mapper itself.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Result alias for store implementations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result alias for the mapping layer.
pub type MapperResult<T> = Result<T, MapperError>;

/// Transport or server failure reported by a store.
///
/// The type is `Clone` so a single connection failure can be fanned out to
/// every request still waiting on that connection.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(Arc<io::Error>),
    /// RESP2 framing or parse error.
    #[error("protocol error")]
    Protocol,
    /// Server returned an error reply.
    #[error("server error: {message}")]
    Server { message: String },
    /// Reply type did not match the command that was sent.
    #[error("unexpected response to {command}")]
    UnexpectedResponse { command: &'static str },
    /// The connection was closed before a reply arrived.
    #[error("connection closed")]
    Closed,
    /// No reply arrived within the configured response timeout.
    #[error("timed out waiting for response")]
    Timeout,
    /// Address could not be parsed into a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(Arc::new(err))
    }
}

/// Errors surfaced by the mapping layer.
#[derive(Debug, Error)]
pub enum MapperError {
    /// A required input (key, field name, field list) was empty.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A requested field does not exist on the target type, or the type's
    /// field table is inconsistent.
    #[error("invalid mapping: {0}")]
    InvalidMapping(String),
    /// A structured write produced no encodable fields.
    #[error("no encodable fields to write for key '{key}'")]
    EmptyMapping { key: String },
    /// A stored scalar could not be coerced to the requested type.
    #[error("cannot decode {found} as {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    /// The result was requested before the owning action completed.
    #[error("operation result is not ready")]
    NotReady,
    /// One or more operations of a batch failed; no partial results exist.
    #[error("batch failed: {failed} of {total} operations failed")]
    BatchFailure {
        failed: usize,
        total: usize,
        #[source]
        source: Box<MapperError>,
    },
    /// Transport failure of a single operation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Structured-text serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MapperError {
    /// Shorthand for `InvalidArgument`.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        MapperError::InvalidArgument(message.into())
    }

    /// Shorthand for `InvalidMapping`.
    pub fn invalid_mapping(message: impl Into<String>) -> Self {
        MapperError::InvalidMapping(message.into())
    }

    /// Builds a `TypeMismatch` from the offending value's display form.
    pub fn type_mismatch(expected: &'static str, found: impl ToString) -> Self {
        MapperError::TypeMismatch {
            expected,
            found: found.to_string(),
        }
    }

    /// Returns true for errors detected before any network call.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            MapperError::InvalidArgument(_)
                | MapperError::InvalidMapping(_)
                | MapperError::EmptyMapping { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts_and_clones() {
        let err: StoreError = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        let copy = err.clone();
        assert!(matches!(copy, StoreError::Io(_)));
        assert!(copy.to_string().contains("reset"));
    }

    #[test]
    fn store_error_is_transparent_in_mapper_error() {
        let err = MapperError::from(StoreError::Closed);
        assert_eq!(err.to_string(), "connection closed");
        assert!(!err.is_construction_error());
    }

    #[test]
    fn batch_failure_keeps_first_cause() {
        let err = MapperError::BatchFailure {
            failed: 2,
            total: 5,
            source: Box::new(MapperError::Store(StoreError::Timeout)),
        };
        assert_eq!(err.to_string(), "batch failed: 2 of 5 operations failed");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("timed out waiting for response"));
    }

    #[test]
    fn construction_errors_are_classified() {
        assert!(MapperError::invalid_argument("key").is_construction_error());
        assert!(MapperError::invalid_mapping("nope").is_construction_error());
        assert!(MapperError::EmptyMapping { key: "k".into() }.is_construction_error());
        assert!(!MapperError::NotReady.is_construction_error());
    }
}
