//! An in-process document store that behaves like a MongoDB server for tests.
//!
//! This crate is the entry point for test suites. It re-exports the core types and
//! the in-memory engine so that code written against collection handles can run
//! without a database server: documents are created, found, updated and removed with
//! MongoDB query and update semantics, uniqueness rules are enforced, pre-save hooks
//! run on creation, and the whole store can be reset between test cases.
//!
//! # Features
//!
//! - **Untyped and typed collections** - Work with raw BSON documents or serde models
//! - **MongoDB-style queries** - Equality, `$in`, comparisons, `$exists`, `$and`/`$or`/`$nor`
//! - **MongoDB-style updates** - Plain merges, `$set`, `$unset`, `$inc`, `$push`, `$addToSet`, `$pull`
//! - **Uniqueness rules** - Violations fail with a duplicate-key error and persist nothing
//! - **Reset** - Discard all data between test cases
//!
//! # Quick Start
//!
//! ```ignore
//! use docmock::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::new(
//!         InMemoryStore::builder()
//!             .unique("accounts", "email")
//!             .build()
//!             .await?,
//!     );
//!
//!     let simple = store.collection("simple");
//!
//!     simple
//!         .create(vec![
//!             doc! { "name": "one", "value": "one" },
//!             doc! { "name": "one", "value": "two" },
//!             doc! { "name": "two", "value": "one" },
//!         ])
//!         .await?;
//!
//!     assert_eq!(simple.find(doc! { "name": "one" }).await?.len(), 2);
//!     assert_eq!(simple.find(doc! { "name": { "$in": ["one", "two"] } }).await?.len(), 3);
//!
//!     simple
//!         .find_one_and_update(doc! { "value": "two" }, doc! { "$set": { "value": "three" } })
//!         .await?;
//!
//!     store.reset().await?;
//!     assert!(simple.find_all().await?.is_empty());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Typed models
//!
//! ```ignore
//! use docmock::{prelude::*, memory::InMemoryStore};
//! use bson::{doc, Uuid};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Account {
//!     #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
//!     pub id: Option<Uuid>,
//!     pub email: String,
//! }
//!
//! impl Document for Account {
//!     fn id(&self) -> Option<&Uuid> { self.id.as_ref() }
//!     fn collection_name() -> &'static str { "accounts" }
//! }
//!
//! let store = DocumentStore::new(InMemoryStore::new());
//! let accounts = store.typed_collection::<Account>();
//!
//! let created = accounts.create_one(Account { id: None, email: "valid@valid.com".into() }).await?;
//! assert!(accounts.find_by_id(created.id.unwrap()).await?.is_some());
//! ```

pub mod prelude;

pub use docmock_core::{backend, collection, document, error, hook, query, store, update};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend.
pub mod memory {
    pub use docmock_memory::{InMemoryStore, InMemoryStoreBuilder};
}
