//! In-memory storage engine for docmock.
//!
//! This crate provides the [`StoreBackend`](docmock_core::backend::StoreBackend)
//! implementation that test suites run against. It keeps every collection in memory,
//! evaluates MongoDB-style queries and update operators, and enforces the uniqueness
//! rules declared on a collection.
//!
//! # Features
//!
//! - **Thread-safe access** - One async-aware RwLock guards the whole store
//! - **Insertion order** - Reads return documents in the order they were created
//! - **Atomic writes** - A batch, update or removal is applied in full or not at all
//! - **Uniqueness rules** - Declared up front on the builder or later as unique indexes
//!
//! # Quick Start
//!
//! ```ignore
//! use docmock::{store::DocumentStore, memory::InMemoryStore, backend::StoreBackendBuilder};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().unique("accounts", "email").build().await?;
//!     let store = DocumentStore::new(backend);
//!     let accounts = store.collection("accounts");
//!
//!     accounts.create_one(doc! { "email": "valid@valid.com" }).await?;
//!     assert!(accounts.create_one(doc! { "email": "valid@valid.com" }).await.is_err());
//!
//!     store.reset().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmock_memory;

mod collection;
mod evaluator;
mod unique;
mod updater;

pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
