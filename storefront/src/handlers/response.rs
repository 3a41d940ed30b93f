//! Response envelopes and document rendering
//!
//! Lists render as
//! `{ "status": "success", "results": n, "pagination": {...} | null, "data": { "<plural>": [...] } }`
//! and single documents as `{ "status": "success", "data": { "<singular>": {...} } }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bson::{Bson, Document};
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::query::{ListPage, Pagination};

const SUCCESS: &str = "success";

/// Render a document as JSON: ObjectIds as hex strings, datetimes as RFC 3339
pub fn document_to_json(document: Document) -> Value {
    Value::Object(
        document
            .into_iter()
            .map(|(key, value)| (key, bson_to_json(value)))
            .collect(),
    )
}

/// Render a single BSON value as JSON
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(n) => Value::from(n),
        Bson::Int64(n) => Value::from(n),
        Bson::Double(n) => Number::from_f64(n).map_or(Value::Null, Value::Number),
        Bson::String(s) => Value::String(s),
        Bson::ObjectId(id) => Value::String(id.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(text) => Value::String(text),
            Err(_) => Value::from(dt.timestamp_millis()),
        },
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Document(inner) => document_to_json(inner),
        other => other.into_relaxed_extjson(),
    }
}

/// List response with optional pagination
#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
    /// Always `"success"`
    pub status: &'static str,
    /// Number of records in `data`
    pub results: usize,
    /// Page metadata; `null` for unpaged requests
    pub pagination: Option<Pagination>,
    /// `{ <plural>: [...] }`
    pub data: Map<String, Value>,
}

impl ListResponse {
    /// Wrap a list result under the resource's plural key
    pub fn new(plural: &str, page: ListPage<Document>) -> Self {
        let (records, pagination) = page.into_parts();
        let results = records.len();
        let items = records.into_iter().map(document_to_json).collect();

        let mut data = Map::new();
        data.insert(plural.to_string(), Value::Array(items));

        Self {
            status: SUCCESS,
            results,
            pagination,
            data,
        }
    }
}

impl IntoResponse for ListResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Single document response
#[derive(Debug, Clone, Serialize)]
pub struct ItemResponse {
    /// Always `"success"`
    pub status: &'static str,
    /// `{ <singular>: {...} }`
    pub data: Map<String, Value>,
    #[serde(skip)]
    code: StatusCode,
}

impl ItemResponse {
    /// Wrap a document under the resource's singular key
    pub fn new(name: &str, document: Document) -> Self {
        let mut data = Map::new();
        data.insert(name.to_string(), document_to_json(document));
        Self {
            status: SUCCESS,
            data,
            code: StatusCode::OK,
        }
    }

    /// Respond with 201 Created
    #[must_use]
    pub fn created(mut self) -> Self {
        self.code = StatusCode::CREATED;
        self
    }
}

impl IntoResponse for ItemResponse {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}
