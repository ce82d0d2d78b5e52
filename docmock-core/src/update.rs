//! Update specifications.
//!
//! An [`Update`] is an ordered list of [`UpdateOp`]s applied to one matched document.
//! Like queries, updates are accepted either in the mapping form used by modeling
//! layers or built directly:
//!
//! ```ignore
//! use bson::doc;
//! use docmock::update::Update;
//!
//! // Plain mappings merge into the document (equivalent to `$set`).
//! let rename = Update::from_document(&doc! { "email": "updated@valid.com" })?;
//!
//! // `$pull` removes array elements equal to a literal...
//! let pull = Update::from_document(&doc! { "$pull": { "values": "one" } })?;
//!
//! // ...or embedded documents whose sub-fields match a predicate.
//! let pull_nested = Update::builder()
//!     .pull_where("values", doc! { "name": { "$in": ["one", "two"] } })?
//!     .build();
//! ```

use bson::{Bson, Document as BsonDocument};

use crate::{
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, is_operator_mapping, parse_operators},
};

/// Predicate deciding which array elements a `$pull` removes.
#[derive(Debug, Clone, PartialEq)]
pub enum PullPredicate {
    /// Remove elements deep-equal to the value.
    Equals(Bson),
    /// Remove embedded-document elements matching the expression. Field paths in the
    /// expression are relative to the element; non-document elements are kept.
    Matches(Expr),
    /// Remove elements satisfying an operator mapping applied to the element itself,
    /// e.g. `{ "$in": ["one", "two"] }` or `{ "$gte": 5 }`. Field paths in the
    /// expression are empty.
    Satisfies(Expr),
}

impl PullPredicate {
    /// Parses the right-hand side of a `$pull` entry.
    pub fn from_bson(value: &Bson) -> DocumentStoreResult<Self> {
        match value {
            Bson::Document(spec) if is_operator_mapping(spec)? => {
                Ok(PullPredicate::Satisfies(parse_operators("", spec)?))
            }
            Bson::Document(spec) => Ok(PullPredicate::Matches(Expr::from_document(spec)?)),
            literal => Ok(PullPredicate::Equals(literal.clone())),
        }
    }
}

/// A single field mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Replace (or add) the field with the value.
    Set(String, Bson),
    /// Remove the field.
    Unset(String),
    /// Add a numeric amount to the field, treating a missing field as zero.
    Inc(String, Bson),
    /// Append the value to an array field, creating the array if missing.
    Push(String, Bson),
    /// Append the value to an array field unless an equal element is already present.
    AddToSet(String, Bson),
    /// Remove every element of an array field that satisfies the predicate.
    Pull(String, PullPredicate),
}

impl UpdateOp {
    /// Returns the field path this operation touches.
    pub fn field(&self) -> &str {
        match self {
            UpdateOp::Set(field, _)
            | UpdateOp::Unset(field)
            | UpdateOp::Inc(field, _)
            | UpdateOp::Push(field, _)
            | UpdateOp::AddToSet(field, _)
            | UpdateOp::Pull(field, _) => field,
        }
    }
}

/// An ordered set of field mutations applied to one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    /// Creates an empty update.
    pub fn new() -> Self {
        Update::default()
    }

    /// Creates a new update builder.
    pub fn builder() -> UpdateBuilder {
        UpdateBuilder::default()
    }

    /// The operations of this update, in application order.
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// Returns `true` if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Parses a mapping-shaped update specification.
    ///
    /// A mapping without operators is a partial update: each entry replaces the
    /// named field and unmentioned fields are left untouched. Otherwise every
    /// top-level key must be one of `$set`, `$unset`, `$inc`, `$push`, `$addToSet`
    /// or `$pull`.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::UnsupportedOperator`] for unknown operators
    /// - [`DocumentStoreError::InvalidUpdate`] when operators and plain fields are mixed
    ///   or an operator's argument is not a mapping
    /// - [`DocumentStoreError::ImmutableField`] when the identity field is targeted
    pub fn from_document(spec: &BsonDocument) -> DocumentStoreResult<Self> {
        let operators = spec.keys().filter(|key| key.starts_with('$')).count();

        if operators == 0 {
            return spec
                .iter()
                .try_fold(Update::builder(), |builder, (field, value)| builder.set(field.as_str(), value.clone()))
                .map(UpdateBuilder::build);
        }

        if operators != spec.len() {
            return Err(DocumentStoreError::InvalidUpdate(
                "cannot mix update operators and plain fields".to_string(),
            ));
        }

        let mut builder = Update::builder();

        for (op, argument) in spec {
            let fields = argument
                .as_document()
                .ok_or_else(|| DocumentStoreError::InvalidUpdate(format!("{op} expects a mapping of fields")))?;

            for (field, value) in fields {
                let field = field.as_str();

                builder = match op.as_str() {
                    "$set" => builder.set(field, value.clone())?,
                    "$unset" => builder.unset(field)?,
                    "$inc" => builder.inc(field, value.clone())?,
                    "$push" => builder.push(field, value.clone())?,
                    "$addToSet" => builder.add_to_set(field, value.clone())?,
                    "$pull" => builder.with_op(UpdateOp::Pull(field.to_string(), PullPredicate::from_bson(value)?))?,
                    other => return Err(DocumentStoreError::UnsupportedOperator(other.to_string())),
                };
            }
        }

        Ok(builder.build())
    }
}

/// Conversion into an [`Update`] for every shape the collection API accepts.
pub trait IntoUpdate {
    /// Converts `self` into an update, validating mapping-shaped specifications.
    fn into_update(self) -> DocumentStoreResult<Update>;
}

impl IntoUpdate for Update {
    fn into_update(self) -> DocumentStoreResult<Update> {
        Ok(self)
    }
}

impl IntoUpdate for BsonDocument {
    fn into_update(self) -> DocumentStoreResult<Update> {
        Update::from_document(&self)
    }
}

impl IntoUpdate for &BsonDocument {
    fn into_update(self) -> DocumentStoreResult<Update> {
        Update::from_document(self)
    }
}

/// Fluent builder for [`Update`].
///
/// Every method rejects operations on the identity field.
#[derive(Debug, Clone, Default)]
pub struct UpdateBuilder {
    update: Update,
}

impl UpdateBuilder {
    fn with_op(mut self, op: UpdateOp) -> DocumentStoreResult<Self> {
        if op.field() == ID_FIELD {
            return Err(DocumentStoreError::ImmutableField(ID_FIELD.to_string()));
        }

        if op.field().is_empty() {
            return Err(DocumentStoreError::InvalidUpdate("field path must not be empty".to_string()));
        }

        self.update.ops.push(op);
        Ok(self)
    }

    /// Sets a field to a value.
    pub fn set(self, field: impl Into<String>, value: impl Into<Bson>) -> DocumentStoreResult<Self> {
        self.with_op(UpdateOp::Set(field.into(), value.into()))
    }

    /// Removes a field.
    pub fn unset(self, field: impl Into<String>) -> DocumentStoreResult<Self> {
        self.with_op(UpdateOp::Unset(field.into()))
    }

    /// Increments a numeric field.
    pub fn inc(self, field: impl Into<String>, amount: impl Into<Bson>) -> DocumentStoreResult<Self> {
        self.with_op(UpdateOp::Inc(field.into(), amount.into()))
    }

    /// Appends a value to an array field.
    pub fn push(self, field: impl Into<String>, value: impl Into<Bson>) -> DocumentStoreResult<Self> {
        self.with_op(UpdateOp::Push(field.into(), value.into()))
    }

    /// Appends a value to an array field if it is not already present.
    pub fn add_to_set(self, field: impl Into<String>, value: impl Into<Bson>) -> DocumentStoreResult<Self> {
        self.with_op(UpdateOp::AddToSet(field.into(), value.into()))
    }

    /// Removes array elements equal to `value`.
    pub fn pull(self, field: impl Into<String>, value: impl Into<Bson>) -> DocumentStoreResult<Self> {
        self.with_op(UpdateOp::Pull(field.into(), PullPredicate::Equals(value.into())))
    }

    /// Removes embedded-document elements whose sub-fields match `predicate`,
    /// e.g. `doc! { "name": { "$in": ["one"] } }`.
    pub fn pull_where(self, field: impl Into<String>, predicate: BsonDocument) -> DocumentStoreResult<Self> {
        let predicate = PullPredicate::from_bson(&Bson::Document(predicate))?;

        self.with_op(UpdateOp::Pull(field.into(), predicate))
    }

    /// Builds and returns the final update.
    pub fn build(self) -> Update {
        self.update
    }
}
