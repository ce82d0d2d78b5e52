//! Query expression evaluation for in-memory document filtering.
//!
//! This module is the predicate matcher of the engine: it decides whether a stored
//! document (or, for `$pull`, an array element) satisfies an [`Expr`]. Evaluation is
//! pure and deterministic.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Binary, Bson, Document as BsonDocument, datetime::DateTime, oid::ObjectId};

use docmock_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor},
    update::PullPredicate,
};


/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so that `1_i32` equals `1.0_f64`. Embedded
/// documents compare without regard to key order; arrays compare element-wise.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// DateTime value
    DateTime(DateTime),
    /// String value
    String(&'a str),
    /// Binary value, including UUID identities
    Binary(&'a Binary),
    /// ObjectId value
    ObjectId(ObjectId),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Any other BSON type; never equal to anything
    Opaque,
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Binary(value) => Comparable::Binary(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::from(doc),
            _ => Comparable::Opaque,
        }
    }
}

impl<'a> From<&'a BsonDocument> for Comparable<'a> {
    fn from(doc: &'a BsonDocument) -> Self {
        Comparable::Map(
            doc
                .iter()
                .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                .collect::<HashMap<_, _>>()
        )
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Binary(a), Comparable::Binary(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Deep equality between two BSON values, with the engine's comparison rules.
pub(crate) fn values_equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Resolves a dotted field path inside a document.
///
/// Each segment descends into an embedded document; a numeric segment may also index
/// into an array. Returns `None` when any segment is missing.
pub(crate) fn resolve_path<'a>(document: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(doc) => doc.get(segment)?,
            Bson::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// What an evaluator is matching against.
#[derive(Clone, Copy)]
enum Target<'a> {
    /// A document; field paths resolve inside it.
    Document(&'a BsonDocument),
    /// A bare value; the empty path resolves to the value itself.
    Value(&'a Bson),
}

pub(crate) struct DocumentEvaluator<'a> {
    target: Target<'a>,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a BsonDocument) -> Self {
        Self { target: Target::Document(document) }
    }

    fn for_value(value: &'a Bson) -> Self {
        Self { target: Target::Value(value) }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Returns `true` if `document` satisfies `expr`.
    pub fn matches(document: &'a BsonDocument, expr: &Expr) -> DocumentStoreResult<bool> {
        DocumentEvaluator::new(document).evaluate(expr)
    }

    /// Returns `true` if an array element satisfies a `$pull` predicate.
    pub fn pull_matches(element: &'a Bson, predicate: &PullPredicate) -> DocumentStoreResult<bool> {
        match predicate {
            PullPredicate::Equals(value) => Ok(values_equal(element, value)),
            PullPredicate::Matches(expr) => match element {
                Bson::Document(doc) => DocumentEvaluator::matches(doc, expr),
                _ => Ok(false),
            },
            PullPredicate::Satisfies(expr) => DocumentEvaluator::for_value(element).evaluate(expr),
        }
    }

    fn resolve(&self, field: &str) -> Option<&'a Bson> {
        match (self.target, field) {
            (Target::Value(value), "") => Some(value),
            (Target::Value(Bson::Document(doc)), path) => resolve_path(doc, path),
            (Target::Value(_), _) => None,
            (Target::Document(_), "") => None,
            (Target::Document(doc), path) => resolve_path(doc, path),
        }
    }
}

/// `$in` membership: the value equals a candidate, or, when the value is an array,
/// any of its elements does.
fn is_member(field_value: &Bson, candidates: &Bson) -> DocumentStoreResult<bool> {
    let candidates = candidates
        .as_array()
        .ok_or_else(|| DocumentStoreError::InvalidQuery("$in/$nin expects an array".to_string()))?;
    let field_value = Comparable::from(field_value);

    let hit = candidates
        .iter()
        .map(Comparable::from)
        .any(|candidate| {
            candidate == field_value
                || matches!(&field_value, Comparable::Array(items) if items.iter().any(|item| item == &candidate))
        });

    Ok(hit)
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(self.resolve(field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        match self.resolve(field) {
            Some(field_value) => match op {
                FieldOp::Eq => Ok(values_equal(field_value, value)),
                FieldOp::Ne => Ok(!values_equal(field_value, value)),
                FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                    match Comparable::from(field_value).partial_cmp(&Comparable::from(value)) {
                        Some(ordering) => Ok(match op {
                            FieldOp::Gt => ordering == Ordering::Greater,
                            FieldOp::Gte => ordering != Ordering::Less,
                            FieldOp::Lt => ordering == Ordering::Less,
                            _ => ordering != Ordering::Greater,
                        }),
                        None => Ok(false),
                    }
                },
                FieldOp::In => is_member(field_value, value),
                FieldOp::Nin => Ok(!is_member(field_value, value)?),
            },
            // a missing field is distinct from null: only negative operators match it
            None => Ok(matches!(op, FieldOp::Ne | FieldOp::Nin)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{Uuid, doc};
    use docmock_core::query::Filter;

    fn matches(document: &BsonDocument, expr: Expr) -> bool {
        DocumentEvaluator::matches(document, &expr).unwrap()
    }

    #[test]
    fn equality_requires_every_field() {
        let document = doc! { "name": "one", "value": "two" };

        assert!(matches(&document, Filter::and([Filter::eq("name", "one"), Filter::eq("value", "two")])));
        assert!(!matches(&document, Filter::and([Filter::eq("name", "one"), Filter::eq("value", "one")])));
    }

    #[test]
    fn numbers_compare_across_representations() {
        let document = doc! { "count": 3_i64 };

        assert!(matches(&document, Filter::eq("count", 3_i32)));
        assert!(matches(&document, Filter::eq("count", 3.0)));
        assert!(matches(&document, Filter::gt("count", 2)));
    }

    #[test]
    fn arrays_are_order_sensitive_and_documents_are_not() {
        let document = doc! { "values": ["one", "two"], "profile": { "a": 1, "b": 2 } };

        assert!(matches(&document, Filter::eq("values", vec!["one", "two"])));
        assert!(!matches(&document, Filter::eq("values", vec!["two", "one"])));
        assert!(matches(&document, Filter::eq("profile", doc! { "b": 2, "a": 1 })));
    }

    #[test]
    fn missing_is_not_null() {
        let document = doc! { "name": "one", "nothing": null };

        assert!(matches(&document, Filter::eq("nothing", Bson::Null)));
        assert!(!matches(&document, Filter::eq("absent", Bson::Null)));
        assert!(matches(&document, Filter::ne("absent", "one")));
        assert!(matches(&document, Filter::exists("nothing")));
        assert!(matches(&document, Filter::not_exists("absent")));
    }

    #[test]
    fn in_matches_scalars_and_array_elements() {
        let scalar = doc! { "name": "two" };
        let array = doc! { "values": ["two", "three"] };

        assert!(matches(&scalar, Filter::in_list("name", ["one", "two"])));
        assert!(matches(&array, Filter::in_list("values", ["three"])));
        assert!(matches(&array, Filter::in_list("values", ["four", "two"])));
        assert!(!matches(&array, Filter::in_list("values", ["one"])));
        assert!(matches(&array, Filter::not_in_list("values", ["one"])));
    }

    #[test]
    fn dotted_paths_descend_into_documents_and_arrays() {
        let document = doc! { "profile": { "city": "Oslo" }, "values": ["one", "two"] };

        assert!(matches(&document, Filter::eq("profile.city", "Oslo")));
        assert!(matches(&document, Filter::eq("values.1", "two")));
        assert!(!matches(&document, Filter::exists("profile.city.name")));
    }

    #[test]
    fn identities_compare_by_value() {
        let id = Uuid::new();
        let document = doc! { "_id": id };

        assert!(matches(&document, Filter::id(id)));
        assert!(!matches(&document, Filter::id(Uuid::new())));
    }

    #[test]
    fn pull_predicates() {
        let nested = Bson::Document(doc! { "name": "one" });
        let scalar = Bson::from("one");

        assert!(DocumentEvaluator::pull_matches(&scalar, &PullPredicate::Equals(Bson::from("one"))).unwrap());
        assert!(DocumentEvaluator::pull_matches(&nested, &PullPredicate::Matches(Filter::in_list("name", ["one"]))).unwrap());
        assert!(!DocumentEvaluator::pull_matches(&scalar, &PullPredicate::Matches(Filter::in_list("name", ["one"]))).unwrap());
        assert!(DocumentEvaluator::pull_matches(&Bson::Int32(7), &PullPredicate::Satisfies(Filter::gte("", 5))).unwrap());
    }
}
