//! Error types and result types for document store operations.
//!
//! This module provides the error taxonomy shared by every layer of the store.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.
//!
//! Note that "nothing matched" is never an error: lookups return `Option` and
//! bulk operations return an empty `Vec`.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A uniqueness rule was violated.
    ///
    /// Raised by `create` (the whole batch is rejected) and by updates that would
    /// make a unique field collide with another document.
    #[error("Duplicate value {value} for unique field '{field}' in collection {collection}")]
    DuplicateKey {
        /// The collection holding the uniqueness rule.
        collection: String,
        /// The field the rule is declared on.
        field: String,
        /// Display form of the colliding value.
        value: String,
    },
    /// A pre-save hook refused the candidate document.
    #[error("Document rejected: {0}")]
    Rejected(String),
    /// A query or update specification used an operator the engine does not implement.
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    /// A query specification is structurally invalid (e.g. `$in` without an array).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// An update specification is structurally invalid.
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
    /// An update tried to change a field that may not change after creation.
    #[error("Field '{0}' is immutable")]
    ImmutableField(String),
    /// The document has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Returns `true` if this error reports a uniqueness conflict.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, DocumentStoreError::DuplicateKey { .. })
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
