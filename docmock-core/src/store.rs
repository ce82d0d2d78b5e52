//! Main document store interface.
//!
//! [`DocumentStore`] is the explicit registry of collections a test suite works
//! against. It is an ordinary value: construct one per suite (or per test), hand out
//! collection handles from it, and call [`DocumentStore::reset`] between test cases.
//!
//! # Example
//!
//! ```ignore
//! use docmock::{store::DocumentStore, memory::InMemoryStore};
//!
//! let store = DocumentStore::new(InMemoryStore::builder().unique("accounts", "email").build().await?);
//! let accounts = store.collection("accounts");
//!
//! // ... exercise the code under test ...
//!
//! store.reset().await?;
//! ```

use tracing::debug;

use crate::{
    backend::StoreBackend,
    collection::{Collection, TypedCollection},
    document::Document,
    error::DocumentStoreResult,
};

/// A document store bound to a specific backend implementation.
#[derive(Debug, Clone)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gets a typed collection for the specified model type.
    ///
    /// The collection name is determined by the model's `collection_name()`.
    pub fn typed_collection<'a, D: Document>(&'a self) -> TypedCollection<'a, B, D> {
        TypedCollection::new(D::collection_name().to_string(), &self.backend)
    }

    /// Gets a handle on the named collection.
    ///
    /// This never fails: collections come into existence on first write, and reads
    /// from a collection that does not exist yet see an empty collection.
    pub fn collection<'a>(&'a self, name: &str) -> Collection<'a, B> {
        Collection::new(name.to_string(), &self.backend)
    }

    /// Discards every document of every collection.
    ///
    /// Identities created before the reset are never observable after it. Callers must
    /// await their in-flight operations before resetting.
    pub async fn reset(&self) -> DocumentStoreResult<()> {
        debug!("resetting document store");

        self.backend.reset().await
    }

    /// Creates an empty collection. Creating an existing collection is a no-op.
    pub async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend
            .create_collection(name)
            .await
    }

    /// Drops a collection, its documents and its uniqueness rules.
    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.drop_collection(name).await
    }

    /// Lists all collection names.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Declares an index on a field. Unique indexes become uniqueness rules.
    pub async fn add_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> DocumentStoreResult<()> {
        self.backend
            .add_index(collection, field, unique)
            .await
    }

    /// Declares that `field` must be unique across the collection.
    pub async fn unique(&self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        self.add_index(collection, field, true).await
    }

    /// Removes an index from a field.
    pub async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        self.backend
            .drop_index(collection, field)
            .await
    }

    /// Shuts down the store, consuming it.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await?;

        Ok(())
    }
}
