//! Storage for a single in-memory collection.
//!
//! Documents are kept in a `Vec` in insertion order, which is the order every read
//! returns them in unless the query asks for a sort. Updates replace a document in
//! place, so its position never changes.

use std::cmp::Ordering;
use bson::{Document as BsonDocument, Uuid};

use docmock_core::{
    error::DocumentStoreResult,
    query::{Query, SortDirection},
};

use crate::evaluator::{Comparable, DocumentEvaluator, resolve_path};


/// A stored document together with its identity.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredDocument {
    pub id: Uuid,
    pub document: BsonDocument,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct MemoryCollection {
    documents: Vec<StoredDocument>,
}

impl MemoryCollection {
    pub fn documents(&self) -> &[StoredDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn contains_id(&self, id: Uuid) -> bool {
        self.documents.iter().any(|stored| stored.id == id)
    }

    /// Appends documents that have already passed every check.
    pub fn append(&mut self, documents: impl IntoIterator<Item = StoredDocument>) {
        self.documents.extend(documents);
    }

    /// Replaces the document at `position`.
    pub fn replace(&mut self, position: usize, document: BsonDocument) {
        self.documents[position].document = document;
    }

    /// Removes the documents at the given positions, returning them in the order the
    /// positions were given.
    pub fn remove_positions(&mut self, positions: &[usize]) -> Vec<BsonDocument> {
        let removed = positions
            .iter()
            .map(|position| self.documents[*position].document.clone())
            .collect();

        let mut position = 0;
        self.documents.retain(|_| {
            let keep = !positions.contains(&position);
            position += 1;
            keep
        });

        removed
    }

    /// Resolves a query to document positions.
    ///
    /// The filter is applied first, then the (stable) sort, then offset and limit.
    pub fn select(&self, query: &Query) -> DocumentStoreResult<Vec<usize>> {
        let mut positions = Vec::new();

        for (position, stored) in self.documents.iter().enumerate() {
            let matched = match &query.filter {
                Some(filter) => DocumentEvaluator::matches(&stored.document, filter)?,
                None => true,
            };

            if matched {
                positions.push(position);
            }
        }

        if let Some(sort) = &query.sort {
            positions.sort_by(|a, b| {
                let left = self.sort_key(*a, &sort.field);
                let right = self.sort_key(*b, &sort.field);

                match sort.direction {
                    SortDirection::Asc => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
                    SortDirection::Desc => right.partial_cmp(&left).unwrap_or(Ordering::Equal),
                }
            });
        }

        Ok(
            positions
                .into_iter()
                .skip(query.offset.unwrap_or(0))
                .take(query.limit.unwrap_or(usize::MAX))
                .collect()
        )
    }

    fn sort_key(&self, position: usize, field: &str) -> Comparable<'_> {
        resolve_path(&self.documents[position].document, field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmock_core::query::Filter;

    fn collection(documents: Vec<BsonDocument>) -> MemoryCollection {
        let mut collection = MemoryCollection::default();
        collection.append(documents.into_iter().map(|document| StoredDocument { id: Uuid::new(), document }));
        collection
    }

    #[test]
    fn select_keeps_insertion_order() {
        let collection = collection(vec![
            doc! { "name": "one", "value": 3 },
            doc! { "name": "two", "value": 1 },
            doc! { "name": "three", "value": 2 },
        ]);

        let positions = collection
            .select(&Query::builder().filter(Filter::gte("value", 2)).build())
            .unwrap();

        assert_eq!(positions, vec![0, 2]);
    }

    #[test]
    fn select_sorts_then_pages() {
        let collection = collection(vec![
            doc! { "value": 3 },
            doc! { "value": 1 },
            doc! { "value": 2 },
        ]);

        let query = Query::builder()
            .sort("value", SortDirection::Desc)
            .offset(1)
            .limit(1)
            .build();

        assert_eq!(collection.select(&query).unwrap(), vec![2]);
    }

    #[test]
    fn remove_positions_returns_removed_documents() {
        let mut collection = collection(vec![
            doc! { "name": "one" },
            doc! { "name": "two" },
            doc! { "name": "three" },
        ]);

        let removed = collection.remove_positions(&[2, 0]);

        assert_eq!(removed, vec![doc! { "name": "three" }, doc! { "name": "one" }]);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.documents()[0].document, doc! { "name": "two" });
    }
}
