//! Error types and result types for document store operations.
//!
//! Every failure surfaced by the store carries an [`ErrorKind`] discriminant so callers
//! branch on an explicit value instead of matching on message text. Use
//! [`DocumentStoreResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde::Serialize;
use serde_json::Error as SerdeJsonError;
use std::{convert::Infallible, time::Duration};
use thiserror::Error;

/// Coarse classification of a [`DocumentStoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A create collided with an existing (id, partition key).
    Conflict,
    /// The target of an update was absent.
    NotFound,
    /// A backend fault expected to clear up on its own.
    Transient,
    /// The backend is throttling the caller.
    RateLimited,
    /// The operation deadline elapsed.
    Timeout,
    /// The query text could not be parsed.
    QuerySyntax,
    /// Anything else; never retried.
    Permanent,
}

impl ErrorKind {
    /// Stable snake-case code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transient => "transient",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::QuerySyntax => "query_syntax",
            ErrorKind::Permanent => "permanent",
        }
    }
}

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given id already exists in the partition.
    #[error("Document {id} already exists in partition {partition_key} of collection {collection}")]
    Conflict {
        id: String,
        partition_key: String,
        collection: String,
    },
    /// The requested document was not found in the partition.
    #[error("Document {id} not found in partition {partition_key} of collection {collection}")]
    NotFound {
        id: String,
        partition_key: String,
        collection: String,
    },
    /// The document violates structural constraints.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The query text uses a construct the store does not understand.
    #[error("Query syntax error: {0}")]
    QuerySyntax(String),
    /// A backend fault eligible for a bounded retry.
    #[error("Transient backend error: {0}")]
    Transient(String),
    /// The backend signalled overload, optionally suggesting how long to wait.
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    /// The overall deadline elapsed before the operation completed.
    #[error("Operation {operation} timed out after {attempts} attempt(s)")]
    Timeout { operation: String, attempts: u32 },
    /// A retryable failure kept recurring until the retry budget ran out.
    #[error("Operation {operation} gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: Box<DocumentStoreError>,
    },
    /// Any other error reported by the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Returns the classification of this error.
    ///
    /// An exhausted retry budget reports the kind of the last failure it absorbed;
    /// use [`DocumentStoreError::retries_exhausted`] to tell it apart from a first-attempt failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocumentStoreError::Conflict { .. } => ErrorKind::Conflict,
            DocumentStoreError::NotFound { .. } => ErrorKind::NotFound,
            DocumentStoreError::Transient(_) => ErrorKind::Transient,
            DocumentStoreError::RateLimited { .. } => ErrorKind::RateLimited,
            DocumentStoreError::Timeout { .. } => ErrorKind::Timeout,
            DocumentStoreError::QuerySyntax(_) => ErrorKind::QuerySyntax,
            DocumentStoreError::RetriesExhausted { last, .. } => last.kind(),
            DocumentStoreError::Serialization(_)
            | DocumentStoreError::Initialization(_)
            | DocumentStoreError::InvalidDocument(_)
            | DocumentStoreError::Backend(_) => ErrorKind::Permanent,
        }
    }

    /// Stable code for the boundary layer.
    pub fn code(&self) -> &'static str {
        match self {
            DocumentStoreError::RetriesExhausted { .. } => "retries_exhausted",
            other => other.kind().code(),
        }
    }

    /// True when the error is the terminal result of an exhausted retry budget.
    pub fn retries_exhausted(&self) -> bool {
        matches!(self, DocumentStoreError::RetriesExhausted { .. })
    }

    /// True when a caller could reasonably try the same operation again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transient | ErrorKind::RateLimited | ErrorKind::Timeout
        )
    }

    pub fn not_found(id: &str, partition_key: &str, collection: &str) -> Self {
        DocumentStoreError::NotFound {
            id: id.to_string(),
            partition_key: partition_key.to_string(),
            collection: collection.to_string(),
        }
    }

    pub fn conflict(id: &str, partition_key: &str, collection: &str) -> Self {
        DocumentStoreError::Conflict {
            id: id.to_string(),
            partition_key: partition_key.to_string(),
            collection: collection.to_string(),
        }
    }

    /// Structured summary suitable for rendering an error response.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            kind: self.kind(),
            message: self.to_string(),
            retryable: self.is_retryable(),
            retries_exhausted: self.retries_exhausted(),
        }
    }
}

/// Serializable view of an error for the layer that turns it into a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub retries_exhausted: bool,
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<Infallible> for DocumentStoreError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_budget_keeps_underlying_kind() {
        let err = DocumentStoreError::RetriesExhausted {
            operation: "create".into(),
            attempts: 3,
            last: Box::new(DocumentStoreError::Transient("service unavailable".into())),
        };

        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(err.code(), "retries_exhausted");
        assert!(err.retries_exhausted());
        assert!(err.is_retryable());
    }

    #[test]
    fn permanent_failures_are_not_retryable() {
        let err = DocumentStoreError::Backend("permission denied".into());

        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(!err.is_retryable());
        assert!(!err.retries_exhausted());
    }

    #[test]
    fn report_serializes_kind_and_code() {
        let report = DocumentStoreError::not_found("r1", "recipe", "recipes").report();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["code"], "not_found");
        assert_eq!(json["kind"], "not_found");
        assert_eq!(json["retryable"], false);
        assert!(json["message"].as_str().unwrap().contains("r1"));
    }
}
