//! List-query building shared by every collection endpoint
//!
//! A list request's query string is parsed into [`QueryParams`], staged on a
//! [`QueryFeatures`] builder and compiled once into a store filter, sort,
//! projection and optional page window. The result is a [`ListPage`]:
//! pagination metadata is present only when the request named a `page`.
//!
//! | parameter | effect |
//! |---|---|
//! | `sort` | comma-separated fields, `-field` for descending; default `-createdAt` |
//! | `fields` | comma-separated projection; `-field` excludes |
//! | `search` | case-insensitive substring match on `name` |
//! | `page` | 1-based page number; its presence enables pagination |
//! | `limit` | page size, default 8 |
//! | `<field>`, `<field>[gte\|gt\|lte\|lt]` | equality or range on that field |

mod cast;
mod features;
mod params;
mod pagination;
mod populate;

use thiserror::Error;

pub use cast::{
    cast_json, cast_str, CastError, FieldDef, FieldDefault, FieldKind, Schema, CREATED_AT,
    UPDATED_AT, VERSION_KEY,
};
pub use features::{CompiledQuery, QueryFeatures, SEARCH_FIELD};
pub use pagination::{ListPage, PageRequest, Pagination, DEFAULT_LIMIT, DEFAULT_PAGE};
pub use params::{parse_lenient_int, FieldFilter, QueryParams, RangeOp, RESERVED_KEYS};
pub use populate::Populate;

/// A list query that cannot be compiled
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// `fields` mixed included and excluded fields
    #[error("Cannot mix included and excluded fields (at \"{field}\")")]
    MixedProjection {
        /// First token that conflicted
        field: String,
    },

    /// A field path that would be read as a store operator
    #[error("Invalid field name \"{0}\"")]
    InvalidField(String),
}
