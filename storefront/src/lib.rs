//! # storefront
//!
//! E-commerce backend: a product catalog, orders, reviews, users and
//! notifications served as JSON over HTTP from a document store.
//!
//! ## Features
//!
//! - **List queries**: every collection endpoint accepts field filters with
//!   range operators, a name search, multi-field sort, field selection and
//!   page/limit pagination, all compiled by [`query::QueryFeatures`]
//! - **Pluggable storage**: MongoDB through the official driver, or an
//!   in-memory store for tests and demos (`memory://`)
//! - **Schema casting**: query and body values are cast to declared field
//!   types before they reach the store
//! - **Rating aggregation**: review writes keep each product's rating summary
//!   current
//! - **Middleware stack**: request IDs, tracing, compression, CORS, timeouts,
//!   body limits and panic recovery
//! - **Health checks**: liveness and readiness probes
//!
//! ## Example
//!
//! ```rust,no_run
//! use storefront::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config);
//!
//!     let store = connect(&config.database).await?;
//!     let app = router(AppState::new(config.clone(), store));
//!
//!     Server::new(config).serve(app).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod observability;
pub mod query;
pub mod ratings;
pub mod repository;
pub mod resources;
pub mod server;
pub mod state;
pub mod store;

/// Commonly used types and functions
pub mod prelude {
    pub use crate::config::{Config, DatabaseConfig, MiddlewareConfig, ServiceConfig};
    pub use crate::error::{Error, ErrorResponse, Result};
    pub use crate::handlers::{router, ItemResponse, ListResponse};
    pub use crate::health::{health, readiness};
    pub use crate::observability::init_tracing;
    pub use crate::query::{ListPage, PageRequest, Pagination, QueryFeatures, QueryParams};
    pub use crate::repository::ResourceRepository;
    pub use crate::resources::ResourceSpec;
    pub use crate::server::Server;
    pub use crate::state::AppState;
    pub use crate::store::{connect, DocumentStore, FindOptions, InMemoryStore, StoreError};

    pub use axum::{routing::get, Router};
}
