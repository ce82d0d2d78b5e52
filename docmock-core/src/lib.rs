//! Core types of docmock, an in-process document store that behaves like a MongoDB
//! server for the purposes of a test suite.
//!
//! This crate provides:
//!
//! - **Documents** ([`document`]) - Identity helpers and the trait for typed models
//! - **Queries** ([`query`]) - Query expressions, parsing of mapping-shaped queries
//! - **Updates** ([`update`]) - Update operations, parsing of mapping-shaped updates
//! - **Pre-save hooks** ([`hook`]) - The seam through which a modeling layer validates or transforms documents
//! - **Store backend abstraction** ([`backend`]) - The trait an engine implements
//! - **Collections** ([`collection`]) - CRUD handles on one collection
//! - **Document store** ([`store`]) - The registry of collections, with reset
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docmock::prelude::*;
//! use docmock::memory::InMemoryStore;
//! use bson::doc;
//!
//! let store = DocumentStore::new(InMemoryStore::new());
//! let simple = store.collection("simple");
//!
//! simple.create(vec![doc! { "name": "one" }, doc! { "name": "two" }]).await?;
//! assert_eq!(simple.find(doc! { "name": "one" }).await?.len(), 1);
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmock_core;

pub mod backend;
pub mod collection;
pub mod document;
pub mod error;
pub mod hook;
pub mod query;
pub mod store;
pub mod update;
