//! In-process document store

use std::collections::HashMap;

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use tokio::sync::RwLock;

use super::error::{StoreError, StoreOperation};
use super::matcher;
use super::{DocumentStore, FindOptions, StoreResult};

/// Document store held entirely in memory
///
/// Collections are created on first insert. Queries are evaluated by a
/// linear scan, which is fine for tests and small demo catalogs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    unique_indexes: RwLock<HashMap<String, Vec<Vec<String>>>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    async fn indexes_for(&self, collection: &str) -> Vec<Vec<String>> {
        self.unique_indexes
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

/// First unique index that `candidate` would collide on
///
/// A document missing any indexed field is not constrained by that index.
/// `own` is the position of the document being replaced, if any.
fn unique_violation<'a>(
    docs: &[Document],
    candidate: &Document,
    own: Option<usize>,
    indexes: &'a [Vec<String>],
) -> Option<&'a [String]> {
    indexes.iter().map(Vec::as_slice).find(|fields| {
        let Some(key) = fields
            .iter()
            .map(|field| matcher::lookup(candidate, field))
            .collect::<Option<Vec<_>>>()
        else {
            return false;
        };
        docs.iter().enumerate().any(|(index, doc)| {
            Some(index) != own
                && fields
                    .iter()
                    .zip(&key)
                    .all(|(field, value)| matcher::lookup(doc, field) == Some(*value))
        })
    })
}

fn duplicate_key(operation: StoreOperation, collection: &str, fields: &[String]) -> StoreError {
    StoreError::duplicate_key(
        operation,
        format!("duplicate key on unique index ({})", fields.join(", ")),
    )
    .in_collection(collection)
}

/// Index of the first document matching `filter`
fn first_match(
    docs: &[Document],
    filter: &Document,
    operation: StoreOperation,
    collection: &str,
) -> StoreResult<Option<usize>> {
    for (index, doc) in docs.iter().enumerate() {
        if matcher::matches(doc, filter).map_err(|e| e.into_store_error(operation, collection))? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn count(&self, collection: &str, filter: Document) -> StoreResult<u64> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(0);
        };

        let mut total = 0;
        for doc in docs {
            if matcher::matches(doc, &filter)
                .map_err(|e| e.into_store_error(StoreOperation::Count, collection))?
            {
                total += 1;
            }
        }
        Ok(total)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let invalid = |e: matcher::MatchError| e.into_store_error(StoreOperation::Find, collection);

        let mut matched = {
            let collections = self.collections.read().await;
            let mut matched = Vec::new();
            if let Some(docs) = collections.get(collection) {
                for doc in docs {
                    if matcher::matches(doc, &filter).map_err(invalid)? {
                        matched.push(doc.clone());
                    }
                }
            }
            matched
        };

        if let Some(sort) = &options.sort {
            matcher::sort_documents(&mut matched, sort).map_err(invalid)?;
        }

        let skip = usize::try_from(options.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = match options.limit {
            Some(0) | None => usize::MAX,
            Some(n) => usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX),
        };

        matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| match &options.projection {
                Some(projection) => matcher::project(doc, projection).map_err(invalid),
                None => Ok(doc),
            })
            .collect()
    }

    async fn find_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(None);
        };

        let index = first_match(docs, &filter, StoreOperation::FindOne, collection)?;
        Ok(index.map(|index| docs[index].clone()))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Bson> {
        let mut stored = Document::new();
        let id = match document.get("_id") {
            Some(id) => id.clone(),
            None => Bson::ObjectId(ObjectId::new()),
        };
        stored.insert("_id", id.clone());
        for (key, value) in document {
            if key != "_id" {
                stored.insert(key, value);
            }
        }

        let indexes = self.indexes_for(collection).await;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|doc| doc.get("_id") == Some(&id)) {
            return Err(StoreError::duplicate_key(
                StoreOperation::Insert,
                format!("duplicate key: _id {id}"),
            )
            .in_collection(collection));
        }
        if let Some(fields) = unique_violation(docs, &stored, None, &indexes) {
            return Err(duplicate_key(StoreOperation::Insert, collection, fields));
        }
        docs.push(stored);

        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        changes: Document,
    ) -> StoreResult<Option<Document>> {
        if changes.contains_key("_id") {
            return Err(StoreError::invalid_query(
                StoreOperation::Update,
                "the immutable field '_id' cannot be modified",
            )
            .in_collection(collection));
        }

        let indexes = self.indexes_for(collection).await;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(index) = first_match(docs, &filter, StoreOperation::Update, collection)? else {
            return Ok(None);
        };

        let mut updated = docs[index].clone();
        for (path, value) in changes {
            matcher::set_path(&mut updated, &path, value);
        }
        if let Some(fields) = unique_violation(docs, &updated, Some(index), &indexes) {
            return Err(duplicate_key(StoreOperation::Update, collection, fields));
        }
        docs[index] = updated.clone();
        Ok(Some(updated))
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };

        let found = first_match(docs, &filter, StoreOperation::Delete, collection)?;
        Ok(found.map(|index| docs.remove(index)))
    }

    async fn create_unique_index(&self, collection: &str, fields: &[&str]) -> StoreResult<()> {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let mut indexes = self.unique_indexes.write().await;
        let existing = indexes.entry(collection.to_string()).or_default();
        if !existing.contains(&fields) {
            existing.push(fields);
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
