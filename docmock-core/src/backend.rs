//! Storage backend abstraction for the document store.
//!
//! The [`StoreBackend`] trait is the seam between the collection API, which owns
//! identity assignment and pre-save hooks, and the engine that stores documents,
//! evaluates queries, applies updates and enforces uniqueness rules.
//!
//! # Examples
//!
//! ```ignore
//! use docmock::backend::StoreBackend;
//! use docmock::query::Query;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! backend.insert_documents(vec![doc! { "_id": id, "name": "one" }], "simple").await?;
//! let found = backend.query_documents(Query::from_document(&doc! { "name": "one" })?, "simple").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document as BsonDocument;
use std::fmt::Debug;

use crate::{error::DocumentStoreResult, query::Query, update::Update};

/// Abstract interface for document storage backends.
///
/// # Ordering
///
/// Collections are ordered sequences. Unless a query carries a sort, every method
/// returning documents returns them in insertion order.
///
/// # Atomicity
///
/// Each method is atomic with respect to the other methods on the same backend:
/// the read-then-write steps inside one call (match-then-update, check-then-append)
/// are never interleaved with another call.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Appends documents to a collection, creating the collection if needed.
    ///
    /// Documents must already carry their identity. Every document is checked against
    /// the collection's uniqueness rules, including the documents earlier in the same
    /// batch. The batch is all-or-nothing: on the first violation nothing is appended.
    ///
    /// # Returns
    ///
    /// The stored documents, in input order.
    ///
    /// # Errors
    ///
    /// - [`DuplicateKey`](crate::error::DocumentStoreError::DuplicateKey) on a uniqueness violation
    /// - [`DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists) on an identity collision
    /// - [`InvalidDocument`](crate::error::DocumentStoreError::InvalidDocument) when a document has no identity
    async fn insert_documents(
        &self,
        documents: Vec<BsonDocument>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<BsonDocument>>;

    /// Checks one candidate against the collection's uniqueness rules without storing it.
    ///
    /// `siblings` are the candidates accepted earlier in the same batch; they count as
    /// if already stored. Collections check each candidate right after its pre-save
    /// hook, so a batch fails on its first rejected document.
    /// [`insert_documents`](StoreBackend::insert_documents) repeats the check
    /// atomically.
    ///
    /// # Errors
    ///
    /// [`DuplicateKey`](crate::error::DocumentStoreError::DuplicateKey) on a uniqueness violation.
    async fn check_unique(
        &self,
        candidate: &BsonDocument,
        siblings: &[BsonDocument],
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Returns every document matching the query, honouring its sort, offset and limit.
    ///
    /// A missing collection yields an empty result.
    async fn query_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<BsonDocument>>;

    /// Counts the documents matching the query's filter. Offset and limit apply.
    async fn count_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<usize>;

    /// Applies an update to the matching documents and returns their new state.
    ///
    /// With `multi == false` only the first match (in query order) is updated. Updated
    /// documents keep their identity and their position in the collection. Uniqueness
    /// rules are re-checked against every other document; on a violation nothing is
    /// persisted.
    async fn update_documents(
        &self,
        query: Query,
        update: Update,
        multi: bool,
        collection: &str,
    ) -> DocumentStoreResult<Vec<BsonDocument>>;

    /// Removes every matching document and returns the removed documents.
    async fn delete_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<BsonDocument>>;

    /// Creates an empty collection. Creating an existing collection is a no-op.
    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Drops a collection together with its uniqueness rules.
    ///
    /// # Errors
    ///
    /// [`CollectionNotFound`](crate::error::DocumentStoreError::CollectionNotFound) when no
    /// such collection exists.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Lists the names of all existing collections.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Declares an index on a field. Only `unique` indexes have an observable effect:
    /// they become uniqueness rules for subsequent writes.
    ///
    /// # Errors
    ///
    /// [`DuplicateKey`](crate::error::DocumentStoreError::DuplicateKey) if the stored
    /// documents already violate the new rule.
    async fn add_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> DocumentStoreResult<()>;

    /// Removes an index (and its uniqueness rule, if any) from a field.
    async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()>;

    /// Discards every document of every collection.
    ///
    /// Calling it repeatedly is equivalent to calling it once.
    async fn reset(&self) -> DocumentStoreResult<()>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
