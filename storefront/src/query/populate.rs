//! Related-entity expansion
//!
//! Replaces an ObjectId reference stored in a field with the referenced
//! document, fetched with one `$in` query per result set.

use std::collections::HashMap;

use bson::{doc, oid::ObjectId, Bson, Document};

use crate::store::{DocumentStore, FindOptions, StoreResult};

/// Expand the reference stored at `path` with documents from `from`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Populate {
    /// Field holding the ObjectId reference
    pub path: &'static str,
    /// Collection the reference points into
    pub from: &'static str,
    /// Fields kept on the expanded document (`_id` is always kept)
    pub select: &'static [&'static str],
}

impl Populate {
    /// Create an expansion
    pub const fn new(
        path: &'static str,
        from: &'static str,
        select: &'static [&'static str],
    ) -> Self {
        Self { path, from, select }
    }

    fn projection(&self) -> Option<Document> {
        if self.select.is_empty() {
            return None;
        }
        let mut projection = Document::new();
        for field in self.select {
            projection.insert(*field, 1);
        }
        Some(projection)
    }

    /// Expand references in place
    ///
    /// References that resolve to nothing become `null`; records without an
    /// ObjectId at `path` are left untouched.
    pub async fn apply(&self, store: &dyn DocumentStore, records: &mut [Document]) -> StoreResult<()> {
        let mut ids: Vec<ObjectId> = Vec::new();
        for record in records.iter() {
            if let Some(Bson::ObjectId(id)) = record.get(self.path) {
                if !ids.contains(id) {
                    ids.push(*id);
                }
            }
        }
        if ids.is_empty() {
            return Ok(());
        }

        let options = FindOptions {
            projection: self.projection(),
            ..FindOptions::default()
        };
        let related = store
            .find(self.from, doc! { "_id": { "$in": ids } }, options)
            .await?;

        let by_id: HashMap<ObjectId, Document> = related
            .into_iter()
            .filter_map(|d| d.get_object_id("_id").ok().map(|id| (id, d)))
            .collect();

        for record in records.iter_mut() {
            let id = match record.get(self.path) {
                Some(Bson::ObjectId(id)) => *id,
                _ => continue,
            };
            let expanded = by_id
                .get(&id)
                .cloned()
                .map_or(Bson::Null, Bson::Document);
            record.insert(self.path, expanded);
        }

        tracing::trace!(
            path = self.path,
            from = self.from,
            resolved = by_id.len(),
            "Populated references"
        );
        Ok(())
    }
}
