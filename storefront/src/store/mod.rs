//! Document storage abstraction
//!
//! Every resource lives in a named collection of BSON documents. Filters, sort
//! keys and projections are expressed in MongoDB query syntax so the same
//! compiled query runs unchanged against either backend:
//!
//! - [`InMemoryStore`]: evaluates the query subset the service uses; backs the
//!   test suite and `memory://` deployments
//! - `MongoStore` (feature `mongodb`): the official driver
//!
//! # Example
//!
//! ```rust,ignore
//! use bson::doc;
//! use storefront::store::{DocumentStore, FindOptions, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.insert_one("products", doc! { "name": "Kettle", "price": 40 }).await?;
//!
//! let found = store
//!     .find("products", doc! { "price": { "$gte": 30 } }, FindOptions::default())
//!     .await?;
//! assert_eq!(found.len(), 1);
//! ```

mod error;
mod matcher;
mod memory;

#[cfg(feature = "mongodb")]
mod mongo;

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};

pub use error::{StoreError, StoreErrorKind, StoreOperation};
pub use memory::InMemoryStore;

#[cfg(feature = "mongodb")]
pub use mongo::MongoStore;

use crate::config::DatabaseConfig;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Shaping options for [`DocumentStore::find`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Sort specification (`{ field: 1 | -1 }`)
    pub sort: Option<Document>,
    /// Projection specification (`{ field: 1 }` or `{ field: 0 }`)
    pub projection: Option<Document>,
    /// Number of matching documents to skip
    pub skip: Option<u64>,
    /// Maximum number of documents to return
    pub limit: Option<i64>,
}

impl FindOptions {
    /// Set the sort specification
    #[must_use]
    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the projection specification
    #[must_use]
    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Set skip and limit
    #[must_use]
    pub fn with_window(mut self, skip: u64, limit: i64) -> Self {
        self.skip = Some(skip);
        self.limit = Some(limit);
        self
    }
}

/// Collection-oriented document storage
///
/// Implementations must be safe to share between request handlers; the
/// service holds one instance behind an `Arc<dyn DocumentStore>`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Count documents matching `filter`
    async fn count(&self, collection: &str, filter: Document) -> StoreResult<u64>;

    /// Fetch documents matching `filter`, shaped by `options`
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Fetch the first document matching `filter`
    async fn find_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>>;

    /// Insert a document, returning its `_id`
    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Bson>;

    /// Apply `$set` with `changes` to the first match, returning the updated document
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        changes: Document,
    ) -> StoreResult<Option<Document>>;

    /// Remove the first match, returning the removed document
    async fn delete_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>>;

    /// Reject writes that would give two documents the same values for `fields`
    ///
    /// Creating an index that already exists is a no-op.
    async fn create_unique_index(&self, collection: &str, fields: &[&str]) -> StoreResult<()>;

    /// Round-trip to the backend
    async fn ping(&self) -> StoreResult<()>;
}

/// Open the store named by the database configuration
///
/// `memory://` selects the in-memory backend; any other URL goes to MongoDB.
/// Unique indexes declared by the resources are created before the store is
/// returned.
pub async fn connect(config: &DatabaseConfig) -> StoreResult<Arc<dyn DocumentStore>> {
    if config.url.starts_with("memory://") {
        tracing::warn!("Using in-memory document store; data is lost on shutdown");
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        crate::resources::ensure_indexes(store.as_ref()).await?;
        return Ok(store);
    }

    #[cfg(feature = "mongodb")]
    {
        let store: Arc<dyn DocumentStore> = Arc::new(MongoStore::connect(config).await?);
        crate::resources::ensure_indexes(store.as_ref()).await?;
        Ok(store)
    }

    #[cfg(not(feature = "mongodb"))]
    {
        Err(StoreError::connection_failed(format!(
            "database url '{}' requires the `mongodb` feature",
            config.url
        )))
    }
}
