//! In-memory storage implementation for the document store.
//!
//! All state lives behind a single async-aware read-write lock, so every backend
//! operation observes and produces a consistent snapshot: a create batch, an update
//! or a removal is applied completely or not at all.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Document as BsonDocument, Uuid};
use tracing::{debug, instrument, warn};

use docmock_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::{ID_FIELD, document_id},
    error::{DocumentStoreError, DocumentStoreResult},
    query::Query,
    update::Update,
};

use crate::{
    collection::{MemoryCollection, StoredDocument},
    unique::UniqueRules,
    updater::apply_update,
};


#[derive(Debug)]
struct StoreState {
    /// collection name -> documents in insertion order
    collections: HashMap<String, MemoryCollection>,
    /// collection name -> unique fields; kept apart from the data it constrains
    rules: HashMap<String, UniqueRules>,
    rules_survive_reset: bool,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            collections: HashMap::new(),
            rules: HashMap::new(),
            rules_survive_reset: true,
        }
    }
}

impl StoreState {
    fn rules(&self, collection: &str) -> UniqueRules {
        self.rules.get(collection).cloned().unwrap_or_default()
    }
}

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so it can be
/// shared across async tasks. Clones of the same instance share the same data.
///
/// Queries scan every document of a collection; there are no indexes beyond the
/// uniqueness rules.
///
/// # Example
///
/// ```ignore
/// use docmock_memory::InMemoryStore;
/// use docmock::backend::StoreBackend;
/// use bson::{doc, Uuid};
///
/// let store = InMemoryStore::new();
///
/// store.insert_documents(vec![doc! { "_id": Uuid::new(), "name": "one" }], "simple").await?;
/// assert_eq!(store.list_collections().await?, vec!["simple".to_string()]);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store without uniqueness rules.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore` with uniqueness rules and
    /// reset behaviour configured up front.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use docmock_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder()
    ///     .unique("accounts", "email")
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

fn stored_document(document: BsonDocument) -> DocumentStoreResult<StoredDocument> {
    let id = document_id(&document).ok_or_else(|| {
        DocumentStoreError::InvalidDocument("document has no identity".to_string())
    })?;

    Ok(StoredDocument { id, document })
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    #[instrument(level = "debug", skip(self, documents), fields(count = documents.len()))]
    async fn insert_documents(
        &self,
        documents: Vec<BsonDocument>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<BsonDocument>> {
        let mut state = self.state.write().await;
        let rules = state.rules(collection);
        let existing: &[StoredDocument] = state
            .collections
            .get(collection)
            .map(MemoryCollection::documents)
            .unwrap_or(&[]);

        let mut accepted: Vec<StoredDocument> = Vec::with_capacity(documents.len());

        for document in documents {
            let candidate = stored_document(document)?;

            if existing.iter().chain(accepted.iter()).any(|stored| stored.id == candidate.id) {
                warn!(collection, id = %candidate.id, "identity already taken");

                return Err(DocumentStoreError::DocumentAlreadyExists(
                    candidate.id.to_string(),
                    collection.to_string(),
                ));
            }

            rules.check(
                collection,
                existing.iter().chain(accepted.iter()),
                &candidate.document,
                None,
            )?;

            accepted.push(candidate);
        }

        let created = accepted
            .iter()
            .map(|stored| stored.document.clone())
            .collect::<Vec<_>>();

        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .append(accepted);

        debug!(collection, created = created.len(), "documents created");

        Ok(created)
    }

    async fn check_unique(
        &self,
        candidate: &BsonDocument,
        siblings: &[BsonDocument],
        collection: &str,
    ) -> DocumentStoreResult<()> {
        let state = self.state.read().await;
        let rules = state.rules(collection);

        if rules.is_empty() {
            return Ok(());
        }

        let existing: &[StoredDocument] = state
            .collections
            .get(collection)
            .map(MemoryCollection::documents)
            .unwrap_or(&[]);
        let siblings = siblings
            .iter()
            .cloned()
            .map(stored_document)
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        rules.check(collection, existing.iter().chain(siblings.iter()), candidate, None)
    }

    async fn query_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<BsonDocument>> {
        let state = self.state.read().await;
        let Some(col) = state.collections.get(collection) else {
            return Ok(vec![]);
        };

        Ok(
            col.select(&query)?
                .into_iter()
                .map(|position| col.documents()[position].document.clone())
                .collect()
        )
    }

    async fn count_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<usize> {
        let state = self.state.read().await;

        match state.collections.get(collection) {
            Some(col) => Ok(col.select(&query)?.len()),
            None => Ok(0),
        }
    }

    async fn update_documents(
        &self,
        query: Query,
        update: Update,
        multi: bool,
        collection: &str,
    ) -> DocumentStoreResult<Vec<BsonDocument>> {
        let mut state = self.state.write().await;
        let rules = state.rules(collection);
        let Some(col) = state.collections.get_mut(collection) else {
            return Ok(vec![]);
        };

        let mut positions = col.select(&query)?;
        if !multi {
            positions.truncate(1);
        }

        // Compute every new version first, then check them against the collection as it
        // would look afterwards. Nothing is written until all checks pass.
        let mut after = col.documents().to_vec();

        for position in &positions {
            let stored = &after[*position];
            let updated = apply_update(&stored.document, &update)?;

            if document_id(&updated) != Some(stored.id) {
                return Err(DocumentStoreError::ImmutableField(ID_FIELD.to_string()));
            }

            after[*position].document = updated;
        }

        if !rules.is_empty() {
            for position in &positions {
                let stored = &after[*position];
                rules.check(collection, &after, &stored.document, Some(stored.id))?;
            }
        }

        let mut updated = Vec::with_capacity(positions.len());

        for position in positions {
            let document = after[position].document.clone();
            col.replace(position, document.clone());
            updated.push(document);
        }

        debug!(collection, updated = updated.len(), "documents updated");

        Ok(updated)
    }

    async fn delete_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<BsonDocument>> {
        let mut state = self.state.write().await;
        let Some(col) = state.collections.get_mut(collection) else {
            return Ok(vec![]);
        };

        let positions = col.select(&query)?;
        let removed = col.remove_positions(&positions);

        debug!(collection, removed = removed.len(), "documents removed");

        Ok(removed)
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.state
            .write()
            .await
            .collections
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        let mut state = self.state.write().await;

        let had_documents = state.collections.remove(name).is_some();
        let had_rules = state.rules.remove(name).is_some();

        if !had_documents && !had_rules {
            return Err(DocumentStoreError::CollectionNotFound(name.to_string()));
        }

        debug!(collection = name, "collection dropped");

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self
            .state
            .read()
            .await
            .collections
            .keys()
            .cloned()
            .collect::<Vec<_>>();

        names.sort();

        Ok(names)
    }

    async fn add_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()> {
        if !unique {
            // plain indexes have no observable effect on an in-memory scan
            return Ok(());
        }

        let mut state = self.state.write().await;

        let mut rules = UniqueRules::default();
        rules.add(field);

        if let Some(col) = state.collections.get(collection) {
            for stored in col.documents() {
                rules.check(collection, col.documents(), &stored.document, Some(stored.id))?;
            }
        }

        state
            .rules
            .entry(collection.to_string())
            .or_default()
            .add(field);

        debug!(collection, field, "uniqueness rule declared");

        Ok(())
    }

    async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        let mut state = self.state.write().await;

        if let Some(rules) = state.rules.get_mut(collection) {
            rules.remove(field);

            if rules.is_empty() {
                state.rules.remove(collection);
            }
        }

        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn reset(&self) -> DocumentStoreResult<()> {
        let mut state = self.state.write().await;

        let discarded = state
            .collections
            .values()
            .map(MemoryCollection::len)
            .sum::<usize>();

        state.collections.clear();

        if !state.rules_survive_reset {
            state.rules.clear();
        }

        debug!(discarded, "store reset");

        Ok(())
    }
}


/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docmock_memory::InMemoryStore;
/// use docmock::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder()
///     .unique("accounts", "email")
///     .unique_rules_survive_reset(false)
///     .build()
///     .await?;
/// ```
#[derive(Debug)]
pub struct InMemoryStoreBuilder {
    unique: Vec<(String, String)>,
    rules_survive_reset: bool,
}

impl Default for InMemoryStoreBuilder {
    fn default() -> Self {
        Self {
            unique: Vec::new(),
            rules_survive_reset: true,
        }
    }
}

impl InMemoryStoreBuilder {
    /// Declares that `field` must be unique across `collection`.
    pub fn unique(mut self, collection: impl Into<String>, field: impl Into<String>) -> Self {
        self.unique.push((collection.into(), field.into()));
        self
    }

    /// Whether uniqueness rules are kept when the store is reset. Defaults to `true`.
    pub fn unique_rules_survive_reset(mut self, survive: bool) -> Self {
        self.rules_survive_reset = survive;
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds a fresh, empty [`InMemoryStore`] carrying the declared rules.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let mut state = StoreState {
            rules_survive_reset: self.rules_survive_reset,
            ..StoreState::default()
        };

        for (collection, field) in &self.unique {
            state
                .rules
                .entry(collection.clone())
                .or_default()
                .add(field);
        }

        Ok(InMemoryStore {
            state: Arc::new(RwLock::new(state)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmock_core::query::Filter;

    fn with_id(document: BsonDocument) -> BsonDocument {
        let mut stored = doc! { "_id": Uuid::new() };
        for (key, value) in document {
            stored.insert(key, value);
        }
        stored
    }

    fn filter(spec: BsonDocument) -> Query {
        Query::from_document(&spec).unwrap()
    }

    async fn accounts_store() -> InMemoryStore {
        InMemoryStore::builder()
            .unique("accounts", "email")
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_and_query_in_insertion_order() {
        let store = InMemoryStore::new();

        store
            .insert_documents(
                vec![
                    with_id(doc! { "name": "one" }),
                    with_id(doc! { "name": "two" }),
                    with_id(doc! { "name": "three" }),
                ],
                "simple",
            )
            .await
            .unwrap();

        let names = store
            .query_documents(Query::new(), "simple")
            .await
            .unwrap()
            .into_iter()
            .map(|document| document.get_str("name").unwrap().to_string())
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn reading_an_unknown_collection_is_empty() {
        let store = InMemoryStore::new();

        assert!(store.query_documents(Query::new(), "nothing").await.unwrap().is_empty());
        assert_eq!(store.count_documents(Query::new(), "nothing").await.unwrap(), 0);
        assert!(store.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn documents_without_identity_are_rejected() {
        let store = InMemoryStore::new();

        let result = store.insert_documents(vec![doc! { "name": "one" }], "simple").await;

        assert!(matches!(result, Err(DocumentStoreError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn identity_collisions_are_rejected() {
        let store = InMemoryStore::new();
        let document = with_id(doc! { "name": "one" });

        store.insert_documents(vec![document.clone()], "simple").await.unwrap();
        let result = store.insert_documents(vec![document], "simple").await;

        assert!(matches!(result, Err(DocumentStoreError::DocumentAlreadyExists(..))));
    }

    #[tokio::test]
    async fn conflicting_batch_is_not_persisted() {
        let store = accounts_store().await;

        let result = store
            .insert_documents(
                vec![
                    with_id(doc! { "email": "valid@valid.com" }),
                    with_id(doc! { "email": "valid@valid.com" }),
                ],
                "accounts",
            )
            .await;

        assert!(result.unwrap_err().is_duplicate_key());
        assert_eq!(store.count_documents(Query::new(), "accounts").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn check_unique_sees_stored_documents_and_siblings() {
        let store = accounts_store().await;

        store
            .insert_documents(vec![with_id(doc! { "email": "stored@valid.com" })], "accounts")
            .await
            .unwrap();

        let sibling = with_id(doc! { "email": "sibling@valid.com" });

        let stored_conflict = store
            .check_unique(&doc! { "email": "stored@valid.com" }, &[], "accounts")
            .await;
        let sibling_conflict = store
            .check_unique(&doc! { "email": "sibling@valid.com" }, &[sibling.clone()], "accounts")
            .await;

        assert!(stored_conflict.unwrap_err().is_duplicate_key());
        assert!(sibling_conflict.unwrap_err().is_duplicate_key());
        assert!(
            store
                .check_unique(&doc! { "email": "fresh@valid.com" }, &[sibling], "accounts")
                .await
                .is_ok()
        );
        assert_eq!(store.count_documents(Query::new(), "accounts").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_conflict_leaves_documents_untouched() {
        let store = accounts_store().await;

        store
            .insert_documents(
                vec![
                    with_id(doc! { "email": "one@valid.com" }),
                    with_id(doc! { "email": "two@valid.com" }),
                ],
                "accounts",
            )
            .await
            .unwrap();

        let result = store
            .update_documents(
                filter(doc! { "email": "two@valid.com" }),
                Update::from_document(&doc! { "email": "one@valid.com" }).unwrap(),
                false,
                "accounts",
            )
            .await;

        assert!(result.unwrap_err().is_duplicate_key());
        assert_eq!(
            store
                .count_documents(filter(doc! { "email": "two@valid.com" }), "accounts")
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn updating_a_document_to_its_own_value_is_allowed() {
        let store = accounts_store().await;

        store
            .insert_documents(vec![with_id(doc! { "email": "one@valid.com", "age": 1 })], "accounts")
            .await
            .unwrap();

        let updated = store
            .update_documents(
                filter(doc! { "email": "one@valid.com" }),
                Update::from_document(&doc! { "email": "one@valid.com", "age": 2 }).unwrap(),
                false,
                "accounts",
            )
            .await
            .unwrap();

        assert_eq!(updated[0].get_i32("age").unwrap(), 2);
    }

    #[tokio::test]
    async fn single_update_touches_the_first_match_only() {
        let store = InMemoryStore::new();

        store
            .insert_documents(
                vec![with_id(doc! { "value": 1 }), with_id(doc! { "value": 1 })],
                "simple",
            )
            .await
            .unwrap();

        let update = Update::from_document(&doc! { "$inc": { "value": 1 } }).unwrap();

        store
            .update_documents(Query::new(), update.clone(), false, "simple")
            .await
            .unwrap();
        assert_eq!(store.count_documents(filter(doc! { "value": 2 }), "simple").await.unwrap(), 1);

        store.update_documents(Query::new(), update, true, "simple").await.unwrap();
        assert_eq!(store.count_documents(filter(doc! { "value": 2 }), "simple").await.unwrap(), 1);
        assert_eq!(store.count_documents(filter(doc! { "value": 3 }), "simple").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_returns_removed_documents() {
        let store = InMemoryStore::new();

        store
            .insert_documents(
                vec![
                    with_id(doc! { "name": "one" }),
                    with_id(doc! { "name": "two" }),
                    with_id(doc! { "name": "one" }),
                ],
                "simple",
            )
            .await
            .unwrap();

        let removed = store
            .delete_documents(Query::builder().filter(Filter::eq("name", "one")).build(), "simple")
            .await
            .unwrap();

        assert_eq!(removed.len(), 2);
        assert_eq!(store.count_documents(Query::new(), "simple").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reset_keeps_rules_by_default() {
        let store = accounts_store().await;

        store
            .insert_documents(vec![with_id(doc! { "email": "valid@valid.com" })], "accounts")
            .await
            .unwrap();
        store.reset().await.unwrap();

        assert_eq!(store.count_documents(Query::new(), "accounts").await.unwrap(), 0);

        store
            .insert_documents(vec![with_id(doc! { "email": "valid@valid.com" })], "accounts")
            .await
            .unwrap();
        let result = store
            .insert_documents(vec![with_id(doc! { "email": "valid@valid.com" })], "accounts")
            .await;

        assert!(result.unwrap_err().is_duplicate_key());
    }

    #[tokio::test]
    async fn reset_can_discard_rules() {
        let store = InMemoryStore::builder()
            .unique("accounts", "email")
            .unique_rules_survive_reset(false)
            .build()
            .await
            .unwrap();

        store.reset().await.unwrap();

        let result = store
            .insert_documents(
                vec![
                    with_id(doc! { "email": "valid@valid.com" }),
                    with_id(doc! { "email": "valid@valid.com" }),
                ],
                "accounts",
            )
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn unique_index_on_violating_data_fails() {
        let store = InMemoryStore::new();

        store
            .insert_documents(
                vec![with_id(doc! { "email": "a@a.com" }), with_id(doc! { "email": "a@a.com" })],
                "accounts",
            )
            .await
            .unwrap();

        let result = store.add_index("accounts", "email", true).await;

        assert!(result.unwrap_err().is_duplicate_key());

        store.drop_index("accounts", "email").await.unwrap();
        store.add_index("accounts", "name", false).await.unwrap();
    }

    #[tokio::test]
    async fn collections_can_be_created_listed_and_dropped() {
        let store = InMemoryStore::new();

        store.create_collection("b").await.unwrap();
        store.create_collection("a").await.unwrap();
        store.create_collection("a").await.unwrap();

        assert_eq!(store.list_collections().await.unwrap(), vec!["a", "b"]);

        store.drop_collection("a").await.unwrap();

        assert!(matches!(
            store.drop_collection("a").await,
            Err(DocumentStoreError::CollectionNotFound(_))
        ));
        assert_eq!(store.list_collections().await.unwrap(), vec!["b"]);
    }
}
