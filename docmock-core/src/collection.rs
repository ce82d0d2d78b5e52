//! Collection handles for document store operations.
//!
//! A collection handle is a cheap, borrowed view of one named collection in a store.
//! It owns the client-side half of every write: it assigns identities and runs the
//! attached [`PreSaveHook`](crate::hook::PreSaveHook) before handing documents to the
//! backend, which enforces uniqueness and persists them.
//!
//! - [`Collection`] - untyped handle working with raw BSON documents
//! - [`TypedCollection`] - handle for a specific [`Document`] model type
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//!
//! let simple = store.collection("simple");
//! simple.create(vec![doc! { "name": "one", "value": "two" }]).await?;
//!
//! let found = simple.find(doc! { "name": "one" }).await?;
//! let removed = simple.remove(doc! { "name": "one" }).await?;
//! ```

use bson::{Document as BsonDocument, Uuid};
use std::marker::PhantomData;
use tracing::warn;

use crate::{
    backend::StoreBackend,
    document::{Document, DocumentExt, ID_FIELD, document_id, id_to_bson, new_id},
    error::{DocumentStoreError, DocumentStoreResult},
    hook::{HookRef, PreSaveHook},
    query::{IntoQuery, Query},
    update::IntoUpdate,
};

/// Untyped handle on one collection of a store.
#[derive(Debug, Clone)]
pub struct Collection<'a, B: StoreBackend> {
    name: String,
    backend: &'a B,
    hook: Option<HookRef>,
}

impl<'a, B: StoreBackend> Collection<'a, B> {
    pub(crate) fn new(name: String, backend: &'a B) -> Self {
        Self { name, backend, hook: None }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attaches a pre-save hook to this handle, replacing any previous one.
    pub fn with_hook(self, hook: impl PreSaveHook + 'static) -> Self {
        self.with_hook_ref(HookRef::new(hook))
    }

    /// Attaches an already shared pre-save hook to this handle.
    pub fn with_hook_ref(mut self, hook: HookRef) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Assigns an identity to each candidate, runs the pre-save hook on it and checks
    /// the hooked result against the uniqueness rules, one candidate at a time.
    ///
    /// The first failure aborts: later candidates never reach the hook.
    async fn prepare(&self, documents: Vec<BsonDocument>) -> DocumentStoreResult<Vec<BsonDocument>> {
        let mut prepared = Vec::with_capacity(documents.len());

        for candidate in documents {
            let id = new_id();

            // identity goes first, as the real server lays documents out
            let mut document = BsonDocument::new();
            document.insert(ID_FIELD, id_to_bson(id));
            for (key, value) in candidate {
                if key != ID_FIELD {
                    document.insert(key, value);
                }
            }

            if let Some(hook) = &self.hook {
                if let Err(err) = hook.run(&self.name, &mut document).await {
                    warn!(collection = %self.name, error = %err, "pre-save hook rejected document");
                    return Err(err);
                }

                if document_id(&document) != Some(id) {
                    return Err(DocumentStoreError::ImmutableField(ID_FIELD.to_string()));
                }
            }

            self.backend
                .check_unique(&document, &prepared, self.name())
                .await?;

            prepared.push(document);
        }

        Ok(prepared)
    }

    /// Creates documents, in order.
    ///
    /// Each document receives a fresh identity (any `_id` supplied by the caller is
    /// replaced), then passes through the pre-save hook and the collection's
    /// uniqueness rules. The call is all-or-nothing: if any document is rejected,
    /// none is persisted.
    ///
    /// # Returns
    ///
    /// The created documents, in input order.
    pub async fn create(&self, documents: Vec<BsonDocument>) -> DocumentStoreResult<Vec<BsonDocument>> {
        let prepared = self.prepare(documents).await?;

        self.backend
            .insert_documents(prepared, self.name())
            .await
    }

    /// Creates a single document.
    pub async fn create_one(&self, document: BsonDocument) -> DocumentStoreResult<BsonDocument> {
        self.create(vec![document])
            .await?
            .pop()
            .ok_or_else(|| DocumentStoreError::Backend("backend stored no document".to_string()))
    }

    /// Returns every matching document, in insertion order.
    pub async fn find(&self, query: impl IntoQuery) -> DocumentStoreResult<Vec<BsonDocument>> {
        self.backend
            .query_documents(query.into_query()?, self.name())
            .await
    }

    /// Returns the first matching document, if any.
    pub async fn find_one(&self, query: impl IntoQuery) -> DocumentStoreResult<Option<BsonDocument>> {
        let mut query = query.into_query()?;
        query.limit = Some(1);

        Ok(self
            .backend
            .query_documents(query, self.name())
            .await?
            .pop())
    }

    /// Returns the document with the given identity, if any.
    pub async fn find_by_id(&self, id: Uuid) -> DocumentStoreResult<Option<BsonDocument>> {
        self.find_one(Query::by_id(id)).await
    }

    /// Returns every document of the collection, in insertion order.
    pub async fn find_all(&self) -> DocumentStoreResult<Vec<BsonDocument>> {
        self.find(Query::new()).await
    }

    /// Counts the matching documents.
    pub async fn count(&self, query: impl IntoQuery) -> DocumentStoreResult<usize> {
        self.backend
            .count_documents(query.into_query()?, self.name())
            .await
    }

    /// Updates the first matching document and returns its new state.
    ///
    /// Returns `None` when nothing matches.
    pub async fn find_one_and_update(
        &self,
        query: impl IntoQuery,
        update: impl IntoUpdate,
    ) -> DocumentStoreResult<Option<BsonDocument>> {
        Ok(self
            .backend
            .update_documents(query.into_query()?, update.into_update()?, false, self.name())
            .await?
            .pop())
    }

    /// Updates every matching document and returns their new state.
    pub async fn update_many(
        &self,
        query: impl IntoQuery,
        update: impl IntoUpdate,
    ) -> DocumentStoreResult<Vec<BsonDocument>> {
        self.backend
            .update_documents(query.into_query()?, update.into_update()?, true, self.name())
            .await
    }

    /// Removes every matching document and returns the removed documents.
    pub async fn remove(&self, query: impl IntoQuery) -> DocumentStoreResult<Vec<BsonDocument>> {
        self.backend
            .delete_documents(query.into_query()?, self.name())
            .await
    }

    /// Removes a previously loaded document from the collection.
    ///
    /// Returns the removed document, or `None` if it was already gone.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidDocument`] when the document carries no identity.
    pub async fn remove_document(&self, document: &BsonDocument) -> DocumentStoreResult<Option<BsonDocument>> {
        let id = document_id(document)
            .ok_or_else(|| DocumentStoreError::InvalidDocument("document has no identity".to_string()))?;

        Ok(self.remove(Query::by_id(id)).await?.pop())
    }
}

/// Handle on one collection for a specific model type.
///
/// Every method mirrors [`Collection`], converting documents to and from `D`.
#[derive(Debug, Clone)]
pub struct TypedCollection<'a, B: StoreBackend, D: Document> {
    inner: Collection<'a, B>,
    _marker: PhantomData<D>,
}

impl<'a, B: StoreBackend, D: Document> TypedCollection<'a, B, D> {
    pub(crate) fn new(name: String, backend: &'a B) -> Self {
        Self { inner: Collection::new(name, backend), _marker: PhantomData }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Attaches a pre-save hook to this handle. The hook sees the serialized model.
    pub fn with_hook(self, hook: impl PreSaveHook + 'static) -> Self {
        Self { inner: self.inner.with_hook(hook), _marker: PhantomData }
    }

    /// Attaches an already shared pre-save hook to this handle.
    pub fn with_hook_ref(self, hook: HookRef) -> Self {
        Self { inner: self.inner.with_hook_ref(hook), _marker: PhantomData }
    }

    /// Returns the untyped view of this collection, keeping the attached hook.
    pub fn untyped(&self) -> &Collection<'a, B> {
        &self.inner
    }

    /// Creates models, all-or-nothing, and returns them with their assigned identities.
    pub async fn create(&self, documents: Vec<D>) -> DocumentStoreResult<Vec<D>> {
        let documents = documents
            .iter()
            .map(DocumentExt::to_bson_document)
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        from_documents(self.inner.create(documents).await?)
    }

    /// Creates a single model.
    pub async fn create_one(&self, document: D) -> DocumentStoreResult<D> {
        D::from_bson_document(self.inner.create_one(document.to_bson_document()?).await?)
    }

    /// Returns every matching model, in insertion order.
    pub async fn find(&self, query: impl IntoQuery) -> DocumentStoreResult<Vec<D>> {
        from_documents(self.inner.find(query).await?)
    }

    /// Returns the first matching model, if any.
    pub async fn find_one(&self, query: impl IntoQuery) -> DocumentStoreResult<Option<D>> {
        self.inner
            .find_one(query)
            .await?
            .map(D::from_bson_document)
            .transpose()
    }

    /// Returns the model with the given identity, if any.
    pub async fn find_by_id(&self, id: Uuid) -> DocumentStoreResult<Option<D>> {
        self.inner
            .find_by_id(id)
            .await?
            .map(D::from_bson_document)
            .transpose()
    }

    /// Returns every model of the collection, in insertion order.
    pub async fn find_all(&self) -> DocumentStoreResult<Vec<D>> {
        from_documents(self.inner.find_all().await?)
    }

    /// Counts the matching models.
    pub async fn count(&self, query: impl IntoQuery) -> DocumentStoreResult<usize> {
        self.inner.count(query).await
    }

    /// Updates the first matching model and returns its new state.
    pub async fn find_one_and_update(
        &self,
        query: impl IntoQuery,
        update: impl IntoUpdate,
    ) -> DocumentStoreResult<Option<D>> {
        self.inner
            .find_one_and_update(query, update)
            .await?
            .map(D::from_bson_document)
            .transpose()
    }

    /// Updates every matching model and returns their new state.
    pub async fn update_many(&self, query: impl IntoQuery, update: impl IntoUpdate) -> DocumentStoreResult<Vec<D>> {
        from_documents(self.inner.update_many(query, update).await?)
    }

    /// Removes every matching model and returns the removed models.
    pub async fn remove(&self, query: impl IntoQuery) -> DocumentStoreResult<Vec<D>> {
        from_documents(self.inner.remove(query).await?)
    }

    /// Removes a previously created model.
    ///
    /// Returns `None` when the model has no identity or is already gone.
    pub async fn remove_document(&self, document: &D) -> DocumentStoreResult<Option<D>> {
        let Some(id) = document.id() else {
            return Ok(None);
        };

        self.inner
            .remove(Query::by_id(*id))
            .await?
            .pop()
            .map(D::from_bson_document)
            .transpose()
    }
}

fn from_documents<D: Document>(documents: Vec<BsonDocument>) -> DocumentStoreResult<Vec<D>> {
    documents
        .into_iter()
        .map(D::from_bson_document)
        .collect()
}
