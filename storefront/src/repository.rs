//! Generic repository over a resource descriptor
//!
//! Lists run through [`QueryFeatures`]; writes validate JSON bodies against
//! the resource schema before they reach the store.

use std::sync::Arc;

use bson::{doc, oid::ObjectId, Bson, Document};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::query::{
    cast_json, cast_str, FieldDef, FieldKind, ListPage, QueryFeatures, QueryParams, CREATED_AT,
    UPDATED_AT, VERSION_KEY,
};
use crate::ratings;
use crate::resources::ResourceSpec;
use crate::store::{DocumentStore, FindOptions, StoreError, StoreErrorKind};

/// Repository for one resource
#[derive(Clone)]
pub struct ResourceRepository {
    store: Arc<dyn DocumentStore>,
    spec: &'static ResourceSpec,
}

impl std::fmt::Debug for ResourceRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRepository")
            .field("resource", &self.spec.plural)
            .finish_non_exhaustive()
    }
}

/// Parse a path identifier
pub fn parse_id(id: &str) -> Result<ObjectId> {
    match cast_str(FieldKind::ObjectId, "_id", id)? {
        Bson::ObjectId(oid) => Ok(oid),
        other => Err(Error::Internal(format!("ObjectId cast produced {other}"))),
    }
}

impl ResourceRepository {
    /// Create a repository for `spec`
    pub fn new(store: Arc<dyn DocumentStore>, spec: &'static ResourceSpec) -> Self {
        Self { store, spec }
    }

    /// The resource this repository manages
    pub fn spec(&self) -> &'static ResourceSpec {
        self.spec
    }

    /// List documents matching the query parameters within `initial_filter`
    pub async fn list(
        &self,
        params: QueryParams,
        initial_filter: Document,
    ) -> Result<ListPage<Document>> {
        QueryFeatures::new(
            self.store.clone(),
            self.spec.collection,
            self.spec.schema,
            params,
        )
        .with_initial_filter(initial_filter)
        .with_populate(self.spec.populate)
        .all_features()
        .execute()
        .await
    }

    /// Fetch one document by id, shaped like a list record
    pub async fn get(&self, id: &str) -> Result<Document> {
        let id = parse_id(id)?;
        self.fetch(id)
            .await?
            .ok_or_else(|| Error::NotFound(self.spec.not_found_message()))
    }

    async fn fetch(&self, id: ObjectId) -> Result<Option<Document>> {
        let options = FindOptions::default()
            .with_projection(self.spec.schema.default_projection())
            .with_window(0, 1);
        let mut found = self
            .store
            .find(self.spec.collection, doc! { "_id": id }, options)
            .await?;

        if let Some(populate) = &self.spec.populate {
            populate.apply(self.store.as_ref(), &mut found).await?;
        }
        Ok(found.into_iter().next())
    }

    /// Create a document from a JSON object body
    ///
    /// Unknown fields are dropped, declared fields cast, defaults applied and
    /// required fields enforced.
    pub async fn create(&self, body: Value) -> Result<Document> {
        if !self.spec.creatable {
            return Err(Error::BadRequest(format!(
                "{} cannot be created through this endpoint",
                self.spec.plural
            )));
        }

        let object = as_object(&body)?;
        let mut document = Document::new();
        let mut missing = Vec::new();

        for field in self.spec.schema.fields {
            let value = match object.get(field.path) {
                Some(raw) => cast_json(field.kind, field.path, raw)?,
                None => Bson::Null,
            };
            let value = match (value, field.default) {
                (Bson::Null, Some(default)) => default.to_bson(),
                (Bson::Null, None) => {
                    if field.required {
                        missing.push(field.path);
                    }
                    continue;
                }
                (value, _) => value,
            };
            check_constraints(field, &value)?;
            document.insert(field.path, value);
        }

        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        self.log_dropped_fields(object);

        self.ensure_unique(&document, None).await?;

        let now = Bson::DateTime(bson::DateTime::now());
        document.insert(CREATED_AT, now.clone());
        document.insert(UPDATED_AT, now);
        document.insert(VERSION_KEY, 0_i32);

        let id = self
            .store
            .insert_one(self.spec.collection, document.clone())
            .await
            .map_err(|e| self.write_error(e))?;
        tracing::info!(resource = self.spec.name, id = %id, "Created document");

        if self.spec.aggregates_ratings {
            if let Some(product) = reference(&document, "product") {
                ratings::recompute(self.store.as_ref(), product).await?;
            }
        }

        let id = id
            .as_object_id()
            .ok_or_else(|| Error::Internal(format!("store assigned non-ObjectId id {id}")))?;
        self.fetch(id)
            .await?
            .ok_or_else(|| Error::NotFound(self.spec.not_found_message()))
    }

    /// Apply the fields present in a JSON object body
    pub async fn update(&self, id: &str, body: Value) -> Result<Document> {
        let id = parse_id(id)?;
        let object = as_object(&body)?;

        let existing = self
            .store
            .find_one(self.spec.collection, doc! { "_id": id })
            .await?
            .ok_or_else(|| Error::NotFound(self.spec.not_found_message()))?;

        let mut changes = Document::new();
        for field in self.spec.schema.fields {
            let Some(raw) = object.get(field.path) else {
                continue;
            };
            let value = cast_json(field.kind, field.path, raw)?;
            if matches!(value, Bson::Null) && field.required {
                return Err(Error::Validation(format!("{} is required", field.path)));
            }
            check_constraints(field, &value)?;
            changes.insert(field.path, value);
        }
        self.log_dropped_fields(object);

        if !self.spec.unique_together.is_empty()
            && self
                .spec
                .unique_together
                .iter()
                .any(|path| changes.contains_key(*path))
        {
            let mut merged = existing.clone();
            merged.extend(changes.clone());
            self.ensure_unique(&merged, Some(id)).await?;
        }

        changes.insert(UPDATED_AT, Bson::DateTime(bson::DateTime::now()));
        let updated = self
            .store
            .update_one(self.spec.collection, doc! { "_id": id }, changes)
            .await
            .map_err(|e| self.write_error(e))?
            .ok_or_else(|| Error::NotFound(self.spec.not_found_message()))?;
        tracing::info!(resource = self.spec.name, id = %id, "Updated document");

        if self.spec.aggregates_ratings {
            let before = reference(&existing, "product");
            let after = reference(&updated, "product");
            if let Some(product) = after {
                ratings::recompute(self.store.as_ref(), product).await?;
            }
            if let Some(product) = before.filter(|p| Some(*p) != after) {
                ratings::recompute(self.store.as_ref(), product).await?;
            }
        }

        self.fetch(id)
            .await?
            .ok_or_else(|| Error::NotFound(self.spec.not_found_message()))
    }

    /// Remove a document, returning it as stored
    pub async fn delete(&self, id: &str) -> Result<Document> {
        let id = parse_id(id)?;
        let removed = self
            .store
            .delete_one(self.spec.collection, doc! { "_id": id })
            .await?
            .ok_or_else(|| Error::NotFound(self.spec.not_found_message()))?;
        tracing::info!(resource = self.spec.name, id = %id, "Deleted document");

        if self.spec.aggregates_ratings {
            if let Some(product) = reference(&removed, "product") {
                ratings::recompute(self.store.as_ref(), product).await?;
            }
        }
        Ok(removed)
    }

    async fn ensure_unique(&self, document: &Document, exclude: Option<ObjectId>) -> Result<()> {
        if self.spec.unique_together.is_empty() {
            return Ok(());
        }

        let mut filter = Document::new();
        for path in self.spec.unique_together {
            match document.get(*path) {
                Some(value) => {
                    filter.insert(*path, value.clone());
                }
                None => return Ok(()),
            }
        }
        if let Some(id) = exclude {
            filter.insert("_id", doc! { "$ne": id });
        }

        if self
            .store
            .find_one(self.spec.collection, filter)
            .await?
            .is_some()
        {
            return Err(self.conflict());
        }
        Ok(())
    }

    fn conflict(&self) -> Error {
        Error::Conflict(format!(
            "A {} with the same {} already exists",
            self.spec.name,
            self.spec.unique_together.join(" and ")
        ))
    }

    /// A unique-index rejection from the store is the same conflict the
    /// pre-write check reports; it fires when two writes race past that check.
    fn write_error(&self, err: StoreError) -> Error {
        if err.kind == StoreErrorKind::DuplicateKey && !self.spec.unique_together.is_empty() {
            tracing::debug!(resource = self.spec.name, "Unique index rejected write: {}", err);
            self.conflict()
        } else {
            err.into()
        }
    }

    fn log_dropped_fields(&self, object: &Map<String, Value>) {
        let dropped: Vec<&str> = object
            .keys()
            .map(String::as_str)
            .filter(|key| self.spec.schema.field(key).is_none())
            .collect();
        if !dropped.is_empty() {
            tracing::debug!(resource = self.spec.name, ?dropped, "Ignoring undeclared fields");
        }
    }
}

fn as_object(body: &Value) -> Result<&Map<String, Value>> {
    body.as_object()
        .ok_or_else(|| Error::BadRequest("Request body must be a JSON object".to_string()))
}

fn reference(document: &Document, path: &str) -> Option<ObjectId> {
    match document.get(path) {
        Some(Bson::ObjectId(id)) => Some(*id),
        _ => None,
    }
}

fn check_constraints(field: &FieldDef, value: &Bson) -> Result<()> {
    if !field.allowed.is_empty() {
        if let Bson::String(text) = value {
            if !field.allowed.contains(&text.as_str()) {
                return Err(Error::Validation(format!(
                    "{} must be one of: {}",
                    field.path,
                    field.allowed.join(", ")
                )));
            }
        }
    }

    if let Some((min, max)) = field.range {
        let number = match value {
            Bson::Int32(n) => Some(f64::from(*n)),
            Bson::Int64(n) => Some(*n as f64),
            Bson::Double(n) => Some(*n),
            _ => None,
        };
        if let Some(n) = number {
            if n < min || n > max {
                let message = if max == f64::MAX {
                    format!("{} must be at least {}", field.path, min)
                } else {
                    format!("{} must be between {} and {}", field.path, min, max)
                };
                return Err(Error::Validation(message));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{NOTIFICATIONS, ORDERS, PRODUCTS, REVIEWS, USERS};
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn store() -> Arc<dyn DocumentStore> {
        Arc::new(InMemoryStore::new())
    }

    #[tokio::test]
    async fn test_create_applies_defaults_and_timestamps() {
        let repo = ResourceRepository::new(store(), &PRODUCTS);
        let product = repo
            .create(json!({ "name": "Kettle", "price": "40", "color": "red" }))
            .await
            .unwrap();

        assert_eq!(product.get_str("name").unwrap(), "Kettle");
        assert_eq!(product.get_i64("price").unwrap(), 40);
        assert_eq!(product.get_i64("stock").unwrap(), 0);
        assert!(product.get_datetime(CREATED_AT).is_ok());
        assert!(!product.contains_key("color"));
        assert!(!product.contains_key(VERSION_KEY));
    }

    #[tokio::test]
    async fn test_create_reports_missing_fields() {
        let repo = ResourceRepository::new(store(), &PRODUCTS);
        let err = repo.create(json!({ "description": "x" })).await.unwrap_err();
        match err {
            Error::Validation(msg) => assert_eq!(msg, "Missing required fields: name, price"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_bad_values() {
        let repo = ResourceRepository::new(store(), &ORDERS);
        let user = ObjectId::new().to_hex();
        let product = ObjectId::new().to_hex();

        let err = repo
            .create(json!({ "user": "nope", "product": product, "quantity": 1 }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cast(_)));

        let err = repo
            .create(json!({ "user": user, "product": product, "quantity": 1, "status": "lost" }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = repo
            .create(json!({ "user": user, "product": product, "quantity": 0 }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = repo.create(json!(["not", "an", "object"])).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_users_cannot_be_created() {
        let repo = ResourceRepository::new(store(), &USERS);
        let err = repo
            .create(json!({ "name": "Ada", "email": "ada@example.com" }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_get_update_delete_round() {
        let repo = ResourceRepository::new(store(), &NOTIFICATIONS);
        let user = ObjectId::new().to_hex();
        let created = repo
            .create(json!({ "user": user, "message": "Your order shipped" }))
            .await
            .unwrap();
        assert!(!created.get_bool("read").unwrap());
        let id = created.get_object_id("_id").unwrap().to_hex();

        let updated = repo.update(&id, json!({ "read": true })).await.unwrap();
        assert!(updated.get_bool("read").unwrap());
        assert_eq!(updated.get_str("message").unwrap(), "Your order shipped");

        let fetched = repo.get(&id).await.unwrap();
        assert_eq!(fetched, updated);

        repo.delete(&id).await.unwrap();
        assert!(matches!(repo.get(&id).await, Err(Error::NotFound(_))));
        assert!(matches!(repo.delete(&id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_and_unknown_ids() {
        let repo = ResourceRepository::new(store(), &PRODUCTS);
        assert!(matches!(repo.get("123").await, Err(Error::Cast(_))));

        let err = repo.get(&ObjectId::new().to_hex()).await.unwrap_err();
        match err {
            Error::NotFound(msg) => assert_eq!(msg, "No product found with that ID"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_rejects_clearing_required_field() {
        let repo = ResourceRepository::new(store(), &PRODUCTS);
        let created = repo
            .create(json!({ "name": "Kettle", "price": 40 }))
            .await
            .unwrap();
        let id = created.get_object_id("_id").unwrap().to_hex();

        let err = repo.update(&id, json!({ "name": null })).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_duplicate_review_conflicts() {
        let store = store();
        let products = ResourceRepository::new(store.clone(), &PRODUCTS);
        let reviews = ResourceRepository::new(store.clone(), &REVIEWS);

        let product = products
            .create(json!({ "name": "Kettle", "price": 40 }))
            .await
            .unwrap();
        let product = product.get_object_id("_id").unwrap().to_hex();
        let user = ObjectId::new().to_hex();

        reviews
            .create(json!({ "user": user, "product": product, "rating": 4 }))
            .await
            .unwrap();
        let err = reviews
            .create(json!({ "user": user, "product": product, "rating": 5 }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_reviews_yield_one_conflict() {
        let store = store();
        crate::resources::ensure_indexes(store.as_ref()).await.unwrap();
        let products = ResourceRepository::new(store.clone(), &PRODUCTS);
        let reviews = ResourceRepository::new(store.clone(), &REVIEWS);

        let product = products
            .create(json!({ "name": "Kettle", "price": 40 }))
            .await
            .unwrap();
        let product = product.get_object_id("_id").unwrap().to_hex();
        let user = ObjectId::new().to_hex();

        let first = tokio::spawn({
            let reviews = reviews.clone();
            let body = json!({ "user": user, "product": product, "rating": 4 });
            async move { reviews.create(body).await }
        });
        let second = tokio::spawn({
            let reviews = reviews.clone();
            let body = json!({ "user": user, "product": product, "rating": 2 });
            async move { reviews.create(body).await }
        });
        let outcomes = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(Error::Conflict(_)))));
        assert_eq!(store.count("reviews", doc! {}).await.unwrap(), 1);
    }

    #[test]
    fn test_unique_index_rejection_is_a_conflict() {
        let reviews = ResourceRepository::new(store(), &REVIEWS);
        let err = reviews.write_error(StoreError::duplicate_key(
            crate::store::StoreOperation::Insert,
            "E11000 duplicate key error",
        ));
        assert!(matches!(err, Error::Conflict(_)));

        let products = ResourceRepository::new(store(), &PRODUCTS);
        let err = products.write_error(StoreError::duplicate_key(
            crate::store::StoreOperation::Insert,
            "E11000 duplicate key error",
        ));
        assert_eq!(err.status_code(), http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_list_populates_references() {
        let store = store();
        let products = ResourceRepository::new(store.clone(), &PRODUCTS);
        let orders = ResourceRepository::new(store.clone(), &ORDERS);

        let product = products
            .create(json!({ "name": "Kettle", "price": 40, "stock": 3 }))
            .await
            .unwrap();
        let product_id = product.get_object_id("_id").unwrap();
        let user = ObjectId::new();

        orders
            .create(json!({ "user": user.to_hex(), "product": product_id.to_hex(), "quantity": 2 }))
            .await
            .unwrap();

        let page = orders
            .list(QueryParams::default(), doc! { "user": user })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        let expanded = page.records()[0].get_document("product").unwrap();
        assert_eq!(
            expanded,
            &doc! { "_id": product_id, "name": "Kettle", "price": 40_i64 }
        );
        assert_eq!(page.records()[0].get_str("status").unwrap(), "pending");
    }
}
