//! Update application for in-memory documents.
//!
//! Updates are applied copy-then-replace: [`apply_update`] returns the new state of
//! the document and leaves the stored one untouched, so a failing operation (or a
//! uniqueness conflict detected afterwards) never leaves a half-updated document
//! behind.

use bson::{Bson, Document as BsonDocument};

use docmock_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    update::{PullPredicate, Update, UpdateOp},
};

use crate::evaluator::{DocumentEvaluator, values_equal};

/// Applies every operation of `update` to a copy of `document`, in order.
pub(crate) fn apply_update(document: &BsonDocument, update: &Update) -> DocumentStoreResult<BsonDocument> {
    let mut updated = document.clone();

    for op in update.ops() {
        apply_op(&mut updated, op)?;
    }

    Ok(updated)
}

fn apply_op(document: &mut BsonDocument, op: &UpdateOp) -> DocumentStoreResult<()> {
    match op {
        UpdateOp::Set(field, value) => {
            if let Some((mut parent, leaf)) = parent_mut(document, field, true)? {
                parent.insert(leaf, value.clone(), field)?;
            }
        }
        UpdateOp::Unset(field) => {
            if let Some((mut parent, leaf)) = parent_mut(document, field, false)? {
                parent.remove(leaf);
            }
        }
        UpdateOp::Inc(field, amount) => {
            if let Some((mut parent, leaf)) = parent_mut(document, field, true)? {
                let sum = increment(parent.get(leaf), amount, field)?;
                parent.insert(leaf, sum, field)?;
            }
        }
        UpdateOp::Push(field, value) => {
            if let Some((mut parent, leaf)) = parent_mut(document, field, true)? {
                array_mut(&mut parent, leaf, field, "$push")?.push(value.clone());
            }
        }
        UpdateOp::AddToSet(field, value) => {
            if let Some((mut parent, leaf)) = parent_mut(document, field, true)? {
                let array = array_mut(&mut parent, leaf, field, "$addToSet")?;

                if !array.iter().any(|item| values_equal(item, value)) {
                    array.push(value.clone());
                }
            }
        }
        UpdateOp::Pull(field, predicate) => {
            if let Some((mut parent, leaf)) = parent_mut(document, field, false)? {
                // absent or non-array fields have nothing to pull
                if let Some(Bson::Array(items)) = parent.get_mut(leaf) {
                    *items = pull(std::mem::take(items), predicate)?;
                }
            }
        }
    }

    Ok(())
}

/// Keeps the elements that do not satisfy the predicate, preserving their order.
fn pull(items: Vec<Bson>, predicate: &PullPredicate) -> DocumentStoreResult<Vec<Bson>> {
    let mut kept = Vec::with_capacity(items.len());

    for item in items {
        if !DocumentEvaluator::pull_matches(&item, predicate)? {
            kept.push(item);
        }
    }

    Ok(kept)
}

/// The container holding the last segment of a dotted path.
///
/// Inside an array, a segment is an element index (`values.1`).
enum Parent<'d> {
    Document(&'d mut BsonDocument),
    Array(&'d mut Vec<Bson>),
}

impl<'d> Parent<'d> {
    fn get(&self, key: &str) -> Option<&Bson> {
        match self {
            Parent::Document(doc) => doc.get(key),
            Parent::Array(items) => items.get(key.parse::<usize>().ok()?),
        }
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut Bson> {
        match self {
            Parent::Document(doc) => doc.get_mut(key),
            Parent::Array(items) => items.get_mut(key.parse::<usize>().ok()?),
        }
    }

    fn into_child(self, key: &str) -> Option<&'d mut Bson> {
        match self {
            Parent::Document(doc) => doc.get_mut(key),
            Parent::Array(items) => items.get_mut(key.parse::<usize>().ok()?),
        }
    }

    /// Writes `value` under `key`. Writing past the end of an array pads it with nulls.
    fn insert(&mut self, key: &str, value: Bson, path: &str) -> DocumentStoreResult<()> {
        match self {
            Parent::Document(doc) => {
                doc.insert(key, value);
            }
            Parent::Array(items) => {
                let index = key.parse::<usize>().map_err(|_| {
                    DocumentStoreError::InvalidUpdate(format!(
                        "cannot create field '{key}' inside an array in path '{path}'"
                    ))
                })?;

                if index >= items.len() {
                    items.resize(index + 1, Bson::Null);
                }
                items[index] = value;
            }
        }

        Ok(())
    }

    /// Removes `key`. Array elements are nulled rather than removed, so the positions
    /// of their siblings do not shift.
    fn remove(&mut self, key: &str) {
        match self {
            Parent::Document(doc) => {
                doc.remove(key);
            }
            Parent::Array(items) => {
                if let Some(item) = key.parse::<usize>().ok().and_then(|index| items.get_mut(index)) {
                    *item = Bson::Null;
                }
            }
        }
    }
}

/// Walks to the container holding the last segment of a dotted path.
///
/// With `create`, missing intermediate documents are created. Returns `None` when an
/// intermediate value is missing and `create` is off.
fn parent_mut<'d, 'p>(
    document: &'d mut BsonDocument,
    path: &'p str,
    create: bool,
) -> DocumentStoreResult<Option<(Parent<'d>, &'p str)>> {
    let Some((parents, leaf)) = path.rsplit_once('.') else {
        return Ok(Some((Parent::Document(document), path)));
    };

    let mut current = Parent::Document(document);

    for segment in parents.split('.') {
        if create && current.get(segment).is_none() {
            current.insert(segment, Bson::Document(BsonDocument::new()), path)?;
        }

        current = match current.into_child(segment) {
            Some(Bson::Document(child)) => Parent::Document(child),
            Some(Bson::Array(items)) => Parent::Array(items),
            Some(_) => {
                return Err(DocumentStoreError::InvalidUpdate(format!(
                    "cannot traverse scalar field '{segment}' in path '{path}'"
                )));
            }
            None => return Ok(None),
        };
    }

    Ok(Some((current, leaf)))
}

fn array_mut<'a>(
    parent: &'a mut Parent<'_>,
    leaf: &str,
    path: &str,
    op: &str,
) -> DocumentStoreResult<&'a mut Vec<Bson>> {
    if parent.get(leaf).is_none() {
        parent.insert(leaf, Bson::Array(Vec::new()), path)?;
    }

    match parent.get_mut(leaf) {
        Some(Bson::Array(items)) => Ok(items),
        _ => Err(DocumentStoreError::InvalidUpdate(format!("{op} target '{path}' is not an array"))),
    }
}

fn increment(current: Option<&Bson>, amount: &Bson, path: &str) -> DocumentStoreResult<Bson> {
    let current = current.unwrap_or(&Bson::Int32(0));
    let overflow = || DocumentStoreError::InvalidUpdate(format!("$inc overflows the integer at '{path}'"));

    let sum = match (current, amount) {
        // int32 sums that overflow are widened; the widened sum always fits in an i64
        (Bson::Int32(a), Bson::Int32(b)) => a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(*a as i64 + *b as i64)),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64((*a as i64).checked_add(*b).ok_or_else(overflow)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(*b as i64).ok_or_else(overflow)?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b).ok_or_else(overflow)?),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + *b as f64),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        _ => {
            return Err(DocumentStoreError::InvalidUpdate(format!(
                "$inc requires numeric values at '{path}'"
            )));
        }
    };

    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn update(spec: BsonDocument) -> Update {
        Update::from_document(&spec).unwrap()
    }

    #[test]
    fn plain_update_merges_fields() {
        let document = doc! { "_id": 1, "email": "a@a.com", "password": "secret" };

        let updated = apply_update(&document, &update(doc! { "email": "updatedemail" })).unwrap();

        assert_eq!(updated, doc! { "_id": 1, "email": "updatedemail", "password": "secret" });
    }

    #[test]
    fn pull_literal_removes_every_equal_element() {
        let document = doc! { "values": ["one", "two", "one"] };

        let updated = apply_update(&document, &update(doc! { "$pull": { "values": "one" } })).unwrap();

        assert_eq!(updated, doc! { "values": ["two"] });
    }

    #[test]
    fn pull_nested_predicate_keeps_order_of_survivors() {
        let document = doc! {
            "values": [{ "name": "one" }, { "name": "two" }, "loose", { "name": "three" }],
        };

        let updated = apply_update(
            &document,
            &update(doc! { "$pull": { "values": { "name": { "$in": ["one", "two"] } } } }),
        )
        .unwrap();

        assert_eq!(updated, doc! { "values": ["loose", { "name": "three" }] });
    }

    #[test]
    fn pull_on_missing_or_scalar_field_is_a_no_op() {
        let document = doc! { "name": "one" };

        let updated = apply_update(
            &document,
            &update(doc! { "$pull": { "values": "one", "name": "one" } }),
        )
        .unwrap();

        assert_eq!(updated, document);
    }

    #[test]
    fn pull_with_operator_on_elements() {
        let document = doc! { "scores": [1, 7, 3, 9] };

        let updated = apply_update(&document, &update(doc! { "$pull": { "scores": { "$gte": 5 } } })).unwrap();

        assert_eq!(updated, doc! { "scores": [1, 3] });
    }

    #[test]
    fn set_and_unset_follow_dotted_paths() {
        let document = doc! { "profile": { "city": "Oslo", "zip": "0150" } };

        let updated = apply_update(
            &document,
            &update(doc! { "$set": { "profile.city": "Bergen", "meta.visits": 1 }, "$unset": { "profile.zip": "" } }),
        )
        .unwrap();

        assert_eq!(updated, doc! { "profile": { "city": "Bergen" }, "meta": { "visits": 1 } });
    }

    #[test]
    fn inc_push_and_add_to_set() {
        let document = doc! { "count": 1, "tags": ["a"] };

        let updated = apply_update(
            &document,
            &update(doc! {
                "$inc": { "count": 2, "fresh": 1.5 },
                "$push": { "tags": "a" },
                "$addToSet": { "labels": "x" },
            }),
        )
        .unwrap();

        assert_eq!(
            updated,
            doc! { "count": 3, "tags": ["a", "a"], "fresh": 1.5, "labels": ["x"] }
        );
    }

    #[test]
    fn add_to_set_skips_existing_values() {
        let document = doc! { "tags": ["a", "b"] };

        let updated = apply_update(&document, &update(doc! { "$addToSet": { "tags": "b" } })).unwrap();

        assert_eq!(updated, document);
    }

    #[test]
    fn push_onto_scalar_fails() {
        let document = doc! { "tags": "a" };

        let result = apply_update(&document, &update(doc! { "$push": { "tags": "b" } }));

        assert!(matches!(result, Err(DocumentStoreError::InvalidUpdate(_))));
    }

    #[test]
    fn inc_on_string_fails() {
        let document = doc! { "count": "one" };

        let result = apply_update(&document, &update(doc! { "$inc": { "count": 1 } }));

        assert!(matches!(result, Err(DocumentStoreError::InvalidUpdate(_))));
    }

    #[test]
    fn inc_past_the_int64_range_fails() {
        let document = doc! { "count": i64::MAX, "small": i64::MIN };

        for spec in [
            doc! { "$inc": { "count": 1_i64 } },
            doc! { "$inc": { "count": 1 } },
            doc! { "$inc": { "small": -1 } },
        ] {
            let result = apply_update(&document, &update(spec));

            assert!(matches!(result, Err(DocumentStoreError::InvalidUpdate(_))));
        }
    }

    #[test]
    fn inc_widens_int32_overflow() {
        let document = doc! { "count": i32::MAX };

        let updated = apply_update(&document, &update(doc! { "$inc": { "count": 1 } })).unwrap();

        let widened = i32::MAX as i64 + 1;
        assert_eq!(updated, doc! { "count": widened });
    }

    #[test]
    fn set_and_unset_address_array_elements_by_index() {
        let document = doc! { "values": ["one", "two"], "nested": [{ "name": "one" }] };

        let updated = apply_update(
            &document,
            &update(doc! {
                "$set": { "values.1": "x", "values.3": "y", "nested.0.name": "z" },
                "$unset": { "values.0": "" },
            }),
        )
        .unwrap();

        assert_eq!(
            updated,
            doc! { "values": [Bson::Null, "x", Bson::Null, "y"], "nested": [{ "name": "z" }] }
        );
    }

    #[test]
    fn inc_and_push_reach_into_array_elements() {
        let document = doc! { "scores": [{ "hits": 1, "tags": [] }] };

        let updated = apply_update(
            &document,
            &update(doc! { "$inc": { "scores.0.hits": 2 }, "$push": { "scores.0.tags": "a" } }),
        )
        .unwrap();

        assert_eq!(updated, doc! { "scores": [{ "hits": 3, "tags": ["a"] }] });
    }

    #[test]
    fn named_field_inside_an_array_fails() {
        let document = doc! { "values": ["one"] };

        let result = apply_update(&document, &update(doc! { "$set": { "values.name": "x" } }));

        assert!(matches!(result, Err(DocumentStoreError::InvalidUpdate(_))));
    }
}
