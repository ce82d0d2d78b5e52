//! Core traits and helpers for document representation and identity.
//!
//! Stored documents are plain [`bson::Document`] values: an insertion-ordered map of
//! field names to the closed [`Bson`] variant type. Every stored document carries its
//! identity in the [`ID_FIELD`] field as a [`Uuid`].
//!
//! Applications that prefer typed models implement the [`Document`] trait and use the
//! typed collection API; conversion goes through serde via [`DocumentExt`].

use bson::{Bson, Document as BsonDocument, Uuid, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};
use serde_json::{Value, from_value, to_value};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Name of the identity field present on every stored document.
pub const ID_FIELD: &str = "_id";

/// Generates a fresh document identity.
pub fn new_id() -> Uuid {
    Uuid::new()
}

/// Converts an identity into the BSON value stored under [`ID_FIELD`].
pub fn id_to_bson(id: Uuid) -> Bson {
    Bson::from(id)
}

/// Reads the identity of a stored document.
///
/// Returns `None` when the field is missing or does not hold a UUID.
pub fn document_id(document: &BsonDocument) -> Option<Uuid> {
    document
        .get(ID_FIELD)
        .and_then(|value| deserialize_from_bson::<Uuid>(value.clone()).ok())
}

/// Renders a stored document as JSON, preserving field order.
pub fn document_to_json(document: &BsonDocument) -> DocumentStoreResult<Value> {
    Ok(to_value(document)?)
}

/// Core trait for typed models stored through a typed collection.
///
/// The store assigns identities itself, so a model exposes its identity as an
/// `Option`: `None` before the model has been created, `Some` afterwards. Models that
/// want to read back their identity declare a field renamed to `_id`.
///
/// # Example
///
/// ```ignore
/// use docmock::document::Document;
/// use bson::Uuid;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Account {
///     #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
///     pub id: Option<Uuid>,
///     pub email: String,
///     pub password: String,
/// }
///
/// impl Document for Account {
///     fn id(&self) -> Option<&Uuid> {
///         self.id.as_ref()
///     }
///
///     fn collection_name() -> &'static str {
///         "accounts"
///     }
/// }
/// ```
pub trait Document: Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static {
    /// Returns this document's identity, if it has been assigned one.
    fn id(&self) -> Option<&Uuid>;

    /// Returns the name of the collection this document belongs to.
    fn collection_name() -> &'static str;
}

/// Extension trait providing serialization utilities for typed documents.
///
/// This trait is automatically implemented for all types that implement [`Document`].
pub trait DocumentExt: Document {
    /// Converts this document into a BSON document for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the model does not serialize to a map.
    fn to_bson_document(&self) -> DocumentStoreResult<BsonDocument>;

    /// Creates a typed document from a stored BSON document.
    fn from_bson_document(document: BsonDocument) -> DocumentStoreResult<Self>;

    /// Converts this document to a JSON value.
    fn to_json(&self) -> DocumentStoreResult<Value>;

    /// Creates a document from a JSON value.
    fn from_json(value: Value) -> DocumentStoreResult<Self>;
}

impl<D: Document> DocumentExt for D {
    fn to_bson_document(&self) -> DocumentStoreResult<BsonDocument> {
        match serialize_to_bson(self)? {
            Bson::Document(document) => Ok(document),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "{} model serialized to {:?} instead of a document",
                D::collection_name(),
                other.element_type(),
            ))),
        }
    }

    fn from_bson_document(document: BsonDocument) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DocumentStoreResult<Self> {
        Ok(from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn document_id_round_trips_through_bson() {
        let id = new_id();
        let document = doc! { ID_FIELD: id_to_bson(id), "name": "one" };

        assert_eq!(document_id(&document), Some(id));
    }

    #[test]
    fn document_id_is_none_for_foreign_identity_types() {
        assert_eq!(document_id(&doc! { "_id": "not-a-uuid" }), None);
        assert_eq!(document_id(&doc! { "name": "one" }), None);
    }
}
