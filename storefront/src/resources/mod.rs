//! Resource descriptors
//!
//! Each resource is described once, statically: the collection it lives in,
//! the keys its JSON responses use, its field schema and the reference it
//! expands on reads. Repositories and routes are generic over these
//! descriptors.

mod notification;
mod order;
mod product;
mod review;
mod user;

use crate::query::{Populate, Schema};
use crate::store::{DocumentStore, StoreResult};

pub use notification::NOTIFICATIONS;
pub use order::{ORDERS, ORDER_STATUSES};
pub use product::PRODUCTS;
pub use review::REVIEWS;
pub use user::{ROLES, USERS};

/// Static description of one resource
#[derive(Debug, PartialEq)]
pub struct ResourceSpec {
    /// Singular name, used as the item response key
    pub name: &'static str,
    /// Plural name, used as the list response key and URL segment
    pub plural: &'static str,
    /// Backing collection
    pub collection: &'static str,
    /// Field declarations
    pub schema: &'static Schema,
    /// Reference expanded on list and item reads
    pub populate: Option<Populate>,
    /// Whether clients may create documents through the API
    pub creatable: bool,
    /// Fields that together must be unique across the collection
    pub unique_together: &'static [&'static str],
    /// Whether writes refresh the reviewed product's rating summary
    pub aggregates_ratings: bool,
}

impl ResourceSpec {
    /// Message for a missing document
    pub fn not_found_message(&self) -> String {
        format!("No {} found with that ID", self.name)
    }
}

/// Every resource, in routing order
pub fn all() -> [&'static ResourceSpec; 5] {
    [&PRODUCTS, &ORDERS, &REVIEWS, &USERS, &NOTIFICATIONS]
}

/// Create the unique indexes the resources declare
pub async fn ensure_indexes(store: &dyn DocumentStore) -> StoreResult<()> {
    for spec in all() {
        if spec.unique_together.is_empty() {
            continue;
        }
        store
            .create_unique_index(spec.collection, spec.unique_together)
            .await?;
        tracing::debug!(collection = spec.collection, fields = ?spec.unique_together, "Ensured unique index");
    }
    Ok(())
}
