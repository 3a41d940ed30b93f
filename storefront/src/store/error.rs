//! Document store error types
//!
//! Store errors carry the operation that failed and a coarse category so the
//! HTTP layer can pick a status code without inspecting driver internals.
//!
//! # Example
//!
//! ```rust
//! use storefront::store::{StoreError, StoreErrorKind, StoreOperation};
//!
//! let error = StoreError::invalid_query(StoreOperation::Find, "unknown operator: $where");
//! assert!(matches!(error.kind, StoreErrorKind::InvalidQuery));
//! assert!(!error.is_retriable());
//! ```

use std::fmt;

/// Operation being performed when the store error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// Establishing the connection
    Connect,
    /// Counting documents matching a filter
    Count,
    /// Fetching documents matching a filter
    Find,
    /// Fetching a single document
    FindOne,
    /// Inserting a document
    Insert,
    /// Updating a document
    Update,
    /// Deleting a document
    Delete,
    /// Creating an index
    CreateIndex,
    /// Liveness round-trip
    Ping,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Count => write!(f, "count"),
            Self::Find => write!(f, "find"),
            Self::FindOne => write!(f, "find_one"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::CreateIndex => write!(f, "create_index"),
            Self::Ping => write!(f, "ping"),
        }
    }
}

/// Category of store error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// The store could not be reached
    ConnectionFailed,
    /// The filter, sort or projection document was rejected
    InvalidQuery,
    /// A write collided with a unique index
    DuplicateKey,
    /// Any other failure reported by the store
    DatabaseError,
    /// A document could not be encoded or decoded
    Serialization,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::InvalidQuery => write!(f, "invalid_query"),
            Self::DuplicateKey => write!(f, "duplicate_key"),
            Self::DatabaseError => write!(f, "database_error"),
            Self::Serialization => write!(f, "serialization"),
        }
    }
}

/// Structured store error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    /// The operation being performed when the error occurred
    pub operation: StoreOperation,
    /// The category of error
    pub kind: StoreErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Collection the operation targeted, if any
    pub collection: Option<String>,
}

impl StoreError {
    /// Create a new store error
    pub fn new(operation: StoreOperation, kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            collection: None,
        }
    }

    /// Create a connection failure
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            StoreOperation::Connect,
            StoreErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create an invalid query error
    pub fn invalid_query(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::InvalidQuery, message)
    }

    /// Create a unique-index violation
    pub fn duplicate_key(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::DuplicateKey, message)
    }

    /// Create a generic database error
    pub fn database_error(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::DatabaseError, message)
    }

    /// Create a serialization error
    pub fn serialization(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::Serialization, message)
    }

    /// Attach the target collection
    #[must_use]
    pub fn in_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Transient failures that may succeed on retry
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind, StoreErrorKind::ConnectionFailed)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Store {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let Some(ref collection) = self.collection {
            write!(f, " [{}]", collection)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_operation_display() {
        assert_eq!(format!("{}", StoreOperation::Count), "count");
        assert_eq!(format!("{}", StoreOperation::FindOne), "find_one");
        assert_eq!(format!("{}", StoreOperation::Ping), "ping");
    }

    #[test]
    fn test_error_display_with_collection() {
        let error = StoreError::invalid_query(StoreOperation::Find, "unknown operator: $where")
            .in_collection("products");
        assert_eq!(
            error.to_string(),
            "Store invalid_query error during find: unknown operator: $where [products]"
        );
    }

    #[test]
    fn test_only_connection_failures_are_retriable() {
        assert!(StoreError::connection_failed("refused").is_retriable());
        assert!(!StoreError::database_error(StoreOperation::Insert, "duplicate key").is_retriable());
        assert!(!StoreError::serialization(StoreOperation::Find, "bad utf8").is_retriable());
    }
}
