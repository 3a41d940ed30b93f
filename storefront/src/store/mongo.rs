//! MongoDB backend
//!
//! Uses the official driver. The connection is verified with a `ping`
//! command at startup and retried with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, IndexOptions, ReturnDocument},
    Client, Collection, Database, IndexModel,
};

use super::error::{StoreError, StoreErrorKind, StoreOperation};
use super::{DocumentStore, FindOptions, StoreResult};
use crate::config::DatabaseConfig;

/// MongoDB error codes that mean the request itself was malformed
const BAD_VALUE: i32 = 2;
const FAILED_TO_PARSE: i32 = 9;

/// Write rejected by a unique index
const DUPLICATE_KEY: i32 = 11000;

/// Upper bound on the wait between connection attempts
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Document store backed by a MongoDB database
#[derive(Debug, Clone)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    /// Connect to the configured database, retrying on failure
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let mut attempt = 0;
        let base_delay = Duration::from_secs(config.retry_delay_secs);

        loop {
            match Self::try_connect(config).await {
                Ok(store) => {
                    if attempt > 0 {
                        tracing::info!(
                            "MongoDB connection established after {} attempt(s)",
                            attempt + 1
                        );
                    } else {
                        tracing::info!(
                            "MongoDB connected: url={}, database={}",
                            sanitize_connection_url(&config.url),
                            config.name
                        );
                    }
                    return Ok(store);
                }
                Err(e) => {
                    attempt += 1;

                    if attempt > config.max_retries {
                        tracing::error!(
                            "Failed to connect to MongoDB after {} attempts: {}",
                            config.max_retries + 1,
                            e
                        );
                        return Err(e);
                    }

                    let delay = retry_delay(base_delay, attempt);
                    tracing::warn!(
                        "MongoDB connection attempt {} failed: {}. Retrying in {:?}...",
                        attempt,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn try_connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let url_safe = sanitize_connection_url(&config.url);
        tracing::debug!("Connecting to MongoDB: {}", url_safe);

        let mut options = ClientOptions::parse(&config.url).await.map_err(|e| {
            StoreError::connection_failed(format!("invalid MongoDB url '{}': {}", url_safe, e))
        })?;
        let timeout = Duration::from_secs(config.connect_timeout_secs);
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());

        let client = Client::with_options(options).map_err(|e| {
            StoreError::connection_failed(format!("failed to create MongoDB client: {}", e))
        })?;
        let database = client.database(&config.name);

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| map_error(StoreOperation::Connect, e))?;

        Ok(Self { database })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }
}

/// Exponential backoff for the given 1-based attempt, capped at [`MAX_RETRY_DELAY`]
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    2_u32
        .checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}

fn map_error(operation: StoreOperation, err: mongodb::error::Error) -> StoreError {
    let kind = match err.kind.as_ref() {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => StoreErrorKind::ConnectionFailed,
        ErrorKind::BsonSerialization(_) | ErrorKind::BsonDeserialization(_) => {
            StoreErrorKind::Serialization
        }
        ErrorKind::Command(command) if matches!(command.code, BAD_VALUE | FAILED_TO_PARSE) => {
            StoreErrorKind::InvalidQuery
        }
        ErrorKind::Command(command) if command.code == DUPLICATE_KEY => StoreErrorKind::DuplicateKey,
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY => {
            StoreErrorKind::DuplicateKey
        }
        _ => StoreErrorKind::DatabaseError,
    };
    StoreError::new(operation, kind, err.to_string())
}

/// Strip credentials from a connection URL before logging it
pub(crate) fn sanitize_connection_url(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(scheme_end) = url.find("://") {
            let scheme = &url[..scheme_end + 3];
            let after_at = &url[at_pos..];
            return format!("{}***{}", scheme, after_at);
        }
    }
    url.to_string()
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn count(&self, collection: &str, filter: Document) -> StoreResult<u64> {
        self.collection(collection)
            .count_documents(filter)
            .await
            .map_err(|e| map_error(StoreOperation::Count, e).in_collection(collection))
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let coll = self.collection(collection);
        let mut action = coll.find(filter);
        if let Some(sort) = options.sort {
            action = action.sort(sort);
        }
        if let Some(projection) = options.projection {
            action = action.projection(projection);
        }
        if let Some(skip) = options.skip {
            action = action.skip(skip);
        }
        if let Some(limit) = options.limit {
            action = action.limit(limit);
        }

        let cursor = action
            .await
            .map_err(|e| map_error(StoreOperation::Find, e).in_collection(collection))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| map_error(StoreOperation::Find, e).in_collection(collection))
    }

    async fn find_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>> {
        self.collection(collection)
            .find_one(filter)
            .await
            .map_err(|e| map_error(StoreOperation::FindOne, e).in_collection(collection))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Bson> {
        let result = self
            .collection(collection)
            .insert_one(document)
            .await
            .map_err(|e| map_error(StoreOperation::Insert, e).in_collection(collection))?;
        Ok(result.inserted_id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        changes: Document,
    ) -> StoreResult<Option<Document>> {
        self.collection(collection)
            .find_one_and_update(filter, doc! { "$set": changes })
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| map_error(StoreOperation::Update, e).in_collection(collection))
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>> {
        self.collection(collection)
            .find_one_and_delete(filter)
            .await
            .map_err(|e| map_error(StoreOperation::Delete, e).in_collection(collection))
    }

    async fn create_unique_index(&self, collection: &str, fields: &[&str]) -> StoreResult<()> {
        let mut keys = Document::new();
        for field in fields {
            keys.insert(*field, 1);
        }
        let index = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build();

        let created = self
            .collection(collection)
            .create_index(index)
            .await
            .map_err(|e| map_error(StoreOperation::CreateIndex, e).in_collection(collection))?;
        tracing::debug!(collection, index = %created.index_name, "Unique index ready");
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| map_error(StoreOperation::Ping, e))
    }
}
