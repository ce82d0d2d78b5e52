//! Convenient re-exports of commonly used types from docmock.
//!
//! ```ignore
//! use docmock::prelude::*;
//! ```
//!
//! This provides access to:
//! - The document store and collection handles
//! - Document traits for typed models
//! - Query and update construction
//! - Pre-save hooks
//! - Error types

pub use docmock_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    collection::{Collection, TypedCollection},
    document::{Document, DocumentExt, ID_FIELD, document_id, document_to_json},
    error::{DocumentStoreError, DocumentStoreResult},
    hook::{HookRef, PreSaveHook},
    query::{Expr, FieldOp, Filter, IntoQuery, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    store::DocumentStore,
    update::{IntoUpdate, PullPredicate, Update, UpdateBuilder, UpdateOp},
};
