//! HTTP handlers and routing
//!
//! Every resource gets the same REST collection surface:
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | `GET` | `/api/{plural}` | list with filtering, search, sort, fields and pagination |
//! | `POST` | `/api/{plural}` | create (only for creatable resources) |
//! | `GET` | `/api/{plural}/{id}` | fetch one |
//! | `PATCH` | `/api/{plural}/{id}` | partial update |
//! | `DELETE` | `/api/{plural}/{id}` | remove, `204 No Content` |
//!
//! Nested list routes scope a child resource to its parent through the
//! list's initial filter: `/api/products/{id}/reviews`,
//! `/api/users/{id}/orders` and `/api/users/{id}/notifications`.

mod response;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bson::{doc, Document};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::health;
use crate::query::QueryParams;
use crate::repository::parse_id;
use crate::resources::{self, ResourceSpec, NOTIFICATIONS, ORDERS, PRODUCTS, REVIEWS, USERS};
use crate::state::AppState;

pub use response::{bson_to_json, document_to_json, ItemResponse, ListResponse};

type RawQuery = std::result::Result<Query<Vec<(String, String)>>, QueryRejection>;
type RawBody = std::result::Result<Json<Value>, JsonRejection>;

/// Build the application router
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::readiness));

    for spec in resources::all() {
        app = app.merge(resource_routes(spec));
    }

    app.merge(nested_list(&PRODUCTS, "product", &REVIEWS))
        .merge(nested_list(&USERS, "user", &ORDERS))
        .merge(nested_list(&USERS, "user", &NOTIFICATIONS))
        .with_state(state)
}

/// Collection and item routes for one resource
fn resource_routes(spec: &'static ResourceSpec) -> Router<AppState> {
    let mut collection = get(move |State(state): State<AppState>, query: RawQuery| {
        list(state, spec, query, Document::new())
    });
    if spec.creatable {
        collection = collection.post(move |State(state): State<AppState>, body: RawBody| {
            create(state, spec, body)
        });
    }

    let item = get(move |State(state): State<AppState>, Path(id): Path<String>| {
        fetch(state, spec, id)
    })
    .patch(
        move |State(state): State<AppState>, Path(id): Path<String>, body: RawBody| {
            update(state, spec, id, body)
        },
    )
    .delete(move |State(state): State<AppState>, Path(id): Path<String>| {
        remove(state, spec, id)
    });

    Router::new()
        .route(&format!("/api/{}", spec.plural), collection)
        .route(&format!("/api/{}/{{id}}", spec.plural), item)
}

/// List route for `child` documents whose `field` references a `parent`
fn nested_list(
    parent: &'static ResourceSpec,
    field: &'static str,
    child: &'static ResourceSpec,
) -> Router<AppState> {
    let path = format!("/api/{}/{{id}}/{}", parent.plural, child.plural);
    Router::new().route(
        &path,
        get(
            move |State(state): State<AppState>, Path(id): Path<String>, query: RawQuery| async move {
                let parent_id = parse_id(&id)?;
                list(state, child, query, doc! { field: parent_id }).await
            },
        ),
    )
}

async fn list(
    state: AppState,
    spec: &'static ResourceSpec,
    query: RawQuery,
    initial_filter: Document,
) -> Result<ListResponse> {
    let Query(pairs) = query.map_err(|rejection| Error::BadRequest(rejection.body_text()))?;
    let page = state
        .repository(spec)
        .list(QueryParams::from(pairs), initial_filter)
        .await?;
    Ok(ListResponse::new(spec.plural, page))
}

async fn fetch(state: AppState, spec: &'static ResourceSpec, id: String) -> Result<ItemResponse> {
    let document = state.repository(spec).get(&id).await?;
    Ok(ItemResponse::new(spec.name, document))
}

async fn create(
    state: AppState,
    spec: &'static ResourceSpec,
    body: RawBody,
) -> Result<ItemResponse> {
    let Json(body) = body.map_err(|rejection| Error::BadRequest(rejection.body_text()))?;
    let document = state.repository(spec).create(body).await?;
    Ok(ItemResponse::new(spec.name, document).created())
}

async fn update(
    state: AppState,
    spec: &'static ResourceSpec,
    id: String,
    body: RawBody,
) -> Result<ItemResponse> {
    let Json(body) = body.map_err(|rejection| Error::BadRequest(rejection.body_text()))?;
    let document = state.repository(spec).update(&id, body).await?;
    Ok(ItemResponse::new(spec.name, document))
}

async fn remove(state: AppState, spec: &'static ResourceSpec, id: String) -> Result<Response> {
    state.repository(spec).delete(&id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
