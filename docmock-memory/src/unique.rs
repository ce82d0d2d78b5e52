//! Uniqueness rule enforcement.
//!
//! A collection may declare any number of unique fields. A candidate document
//! violates a rule when another document of the collection holds an equal value at
//! the rule's field path. Candidates without a value at the path are not checked
//! (sparse semantics).

use bson::{Document as BsonDocument, Uuid};
use tracing::warn;

use docmock_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::Filter,
};

use crate::{
    collection::StoredDocument,
    evaluator::{DocumentEvaluator, resolve_path},
};

/// The unique fields declared on one collection.
#[derive(Debug, Default, Clone)]
pub(crate) struct UniqueRules {
    fields: Vec<String>,
}

impl UniqueRules {
    /// Declares a unique field. Declaring the same field twice is a no-op.
    pub fn add(&mut self, field: &str) {
        if !self.fields.iter().any(|existing| existing == field) {
            self.fields.push(field.to_string());
        }
    }

    /// Forgets a unique field.
    pub fn remove(&mut self, field: &str) {
        self.fields.retain(|existing| existing != field);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks `candidate` against the documents of a collection.
    ///
    /// `exclude` names the identity whose stored version is ignored; updates pass the
    /// identity of the document being replaced.
    pub fn check<'a>(
        &self,
        collection: &str,
        existing: impl IntoIterator<Item = &'a StoredDocument> + Clone,
        candidate: &BsonDocument,
        exclude: Option<Uuid>,
    ) -> DocumentStoreResult<()> {
        for field in &self.fields {
            let Some(value) = resolve_path(candidate, field) else {
                continue;
            };

            let probe = Filter::eq(field.as_str(), value.clone());

            for stored in existing.clone() {
                if Some(stored.id) == exclude {
                    continue;
                }

                if DocumentEvaluator::matches(&stored.document, &probe)? {
                    warn!(collection, field = %field, value = %value, "uniqueness rule violated");

                    return Err(DocumentStoreError::DuplicateKey {
                        collection: collection.to_string(),
                        field: field.clone(),
                        value: value.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}
