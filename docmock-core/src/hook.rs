//! Pre-save hooks.
//!
//! A modeling layer attaches a [`PreSaveHook`] to a collection handle to validate or
//! transform candidate documents before they are persisted, for example to hash a
//! plaintext password. The hook runs after the store has assigned the document's
//! identity and before uniqueness rules are checked, so the checked values are the
//! transformed ones. Any error returned by the hook aborts the whole `create` call
//! and reaches the caller unchanged.
//!
//! Plain closures are hooks:
//!
//! ```ignore
//! use docmock::{error::DocumentStoreError, bson::Document};
//!
//! let lowercase_email = |_collection: &str, doc: &mut Document| {
//!     let email = doc.get_str("email").map_err(|_| DocumentStoreError::Rejected("email is required".into()))?;
//!     doc.insert("email", email.to_lowercase());
//!     Ok(())
//! };
//! ```

use async_trait::async_trait;
use bson::Document as BsonDocument;
use std::{fmt, sync::Arc};

use crate::error::DocumentStoreResult;

/// Callback invoked with each candidate document before it is persisted.
#[async_trait]
pub trait PreSaveHook: Send + Sync {
    /// Inspects and optionally mutates `document`, or rejects it by returning an error.
    ///
    /// The identity field is already populated; changing it is not supported.
    async fn pre_save(&self, collection: &str, document: &mut BsonDocument) -> DocumentStoreResult<()>;
}

#[async_trait]
impl<F> PreSaveHook for F
where
    F: Fn(&str, &mut BsonDocument) -> DocumentStoreResult<()> + Send + Sync,
{
    async fn pre_save(&self, collection: &str, document: &mut BsonDocument) -> DocumentStoreResult<()> {
        self(collection, document)
    }
}

/// A shareable, type-erased pre-save hook.
#[derive(Clone)]
pub struct HookRef(Arc<dyn PreSaveHook>);

impl HookRef {
    /// Wraps a hook for attachment to collection handles.
    pub fn new(hook: impl PreSaveHook + 'static) -> Self {
        HookRef(Arc::new(hook))
    }

    /// Runs the wrapped hook.
    pub async fn run(&self, collection: &str, document: &mut BsonDocument) -> DocumentStoreResult<()> {
        self.0.pre_save(collection, document).await
    }
}

impl fmt::Debug for HookRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HookRef(..)")
    }
}

impl<H: PreSaveHook + 'static> From<Arc<H>> for HookRef {
    fn from(hook: Arc<H>) -> Self {
        HookRef(hook)
    }
}
