//! Field schemas and value casting
//!
//! Query-string values arrive as text and request bodies as JSON. Both are
//! cast to the BSON type a field is declared with before they reach the
//! store, so `price[gte]=100` compares numerically and `user=<hex>` matches
//! a stored ObjectId.

use std::fmt;

use bson::{doc, oid::ObjectId, Bson, Document};
use serde_json::Value;
use thiserror::Error;

/// Declared type of a document field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// UTF-8 text
    String,
    /// Integer or floating point number
    Number,
    /// `true` / `false`
    Boolean,
    /// 24-hex-digit document identifier
    ObjectId,
    /// Point in time (RFC 3339 on the wire)
    DateTime,
    /// Array stored as given; query values match elements as text
    Array,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
            Self::ObjectId => "ObjectId",
            Self::DateTime => "Date",
            Self::Array => "Array",
        };
        f.write_str(name)
    }
}

/// A value that could not be cast to its field's declared kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {path}: cast to {kind} failed for value \"{value}\"")]
pub struct CastError {
    /// Field path
    pub path: String,
    /// Offending value as received
    pub value: String,
    /// Kind the value had to be cast to
    pub kind: FieldKind,
}

impl CastError {
    /// Create a cast error
    pub fn new(path: impl Into<String>, value: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
            kind,
        }
    }
}

/// Default applied on create when a field is absent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    /// Text default
    Str(&'static str),
    /// Integer default
    Int(i64),
    /// Boolean default
    Bool(bool),
}

impl FieldDefault {
    /// BSON form of the default
    pub fn to_bson(self) -> Bson {
        match self {
            Self::Str(s) => Bson::String(s.to_string()),
            Self::Int(n) => Bson::Int64(n),
            Self::Bool(b) => Bson::Boolean(b),
        }
    }
}

/// Declaration of one top-level document field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDef {
    /// Field name
    pub path: &'static str,
    /// Declared kind
    pub kind: FieldKind,
    /// Must be present on create
    pub required: bool,
    /// Permitted text values; empty means unrestricted
    pub allowed: &'static [&'static str],
    /// Inclusive numeric bounds
    pub range: Option<(f64, f64)>,
    /// Value applied on create when absent
    pub default: Option<FieldDefault>,
}

impl FieldDef {
    /// Optional field of the given kind
    pub const fn new(path: &'static str, kind: FieldKind) -> Self {
        Self {
            path,
            kind,
            required: false,
            allowed: &[],
            range: None,
            default: None,
        }
    }

    /// Mark the field as required on create
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict a text field to a fixed set of values
    pub const fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }

    /// Restrict a number field to an inclusive range
    pub const fn between(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    /// Value applied on create when the field is absent
    pub const fn default_value(mut self, default: FieldDefault) -> Self {
        self.default = Some(default);
        self
    }
}

/// Field declarations for one collection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schema {
    /// Declared fields
    pub fields: &'static [FieldDef],
    /// Fields never returned to clients
    pub hidden: &'static [&'static str],
}

/// Timestamps maintained by the repositories on every document
pub const CREATED_AT: &str = "createdAt";
/// See [`CREATED_AT`]
pub const UPDATED_AT: &str = "updatedAt";
/// Document version key
pub const VERSION_KEY: &str = "__v";

impl Schema {
    /// Schema with no declared fields; every value stays a string
    pub const EMPTY: Schema = Schema::new(&[], &[]);

    /// Create a schema
    pub const fn new(fields: &'static [FieldDef], hidden: &'static [&'static str]) -> Self {
        Self { fields, hidden }
    }

    /// Declaration for a top-level field
    pub fn field(&self, path: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.path == path)
    }

    /// Kind of a path, including the implicit `_id` and timestamp fields
    pub fn kind_of(&self, path: &str) -> Option<FieldKind> {
        match path {
            "_id" => Some(FieldKind::ObjectId),
            CREATED_AT | UPDATED_AT => Some(FieldKind::DateTime),
            VERSION_KEY => Some(FieldKind::Number),
            _ => self.field(path).map(|f| f.kind),
        }
    }

    /// Whether `path` (or the top-level field containing it) is hidden
    pub fn is_hidden(&self, path: &str) -> bool {
        let top = path.split('.').next().unwrap_or(path);
        self.hidden.contains(&top)
    }

    /// Projection returned when a request selects no fields: drops `__v` and hidden fields
    pub fn default_projection(&self) -> Document {
        let mut projection = doc! { VERSION_KEY: 0 };
        for hidden in self.hidden {
            projection.insert(*hidden, 0);
        }
        projection
    }

    /// Cast a query-string value for `path`
    pub fn cast_query(&self, path: &str, raw: &str) -> Result<Bson, CastError> {
        match self.kind_of(path) {
            Some(kind) => cast_str(kind, path, raw),
            None => Ok(Bson::String(raw.to_string())),
        }
    }
}

/// Cast text to `kind`
pub fn cast_str(kind: FieldKind, path: &str, raw: &str) -> Result<Bson, CastError> {
    let fail = || CastError::new(path, raw, kind);
    match kind {
        FieldKind::String | FieldKind::Array => Ok(Bson::String(raw.to_string())),
        FieldKind::Number => {
            let trimmed = raw.trim();
            if let Ok(n) = trimmed.parse::<i64>() {
                return Ok(Bson::Int64(n));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Bson::Double)
                .ok_or_else(fail)
        }
        FieldKind::Boolean => match raw.trim() {
            "true" | "1" => Ok(Bson::Boolean(true)),
            "false" | "0" => Ok(Bson::Boolean(false)),
            _ => Err(fail()),
        },
        FieldKind::ObjectId => ObjectId::parse_str(raw.trim())
            .map(Bson::ObjectId)
            .map_err(|_| fail()),
        FieldKind::DateTime => parse_datetime(raw.trim()).map(Bson::DateTime).ok_or_else(fail),
    }
}

fn parse_datetime(raw: &str) -> Option<bson::DateTime> {
    bson::DateTime::parse_rfc3339_str(raw)
        .or_else(|_| bson::DateTime::parse_rfc3339_str(format!("{raw}T00:00:00Z")))
        .ok()
}

/// Cast a JSON body value to `kind`
///
/// `null` passes through for every kind; required-field checks happen in the
/// repository.
pub fn cast_json(kind: FieldKind, path: &str, value: &Value) -> Result<Bson, CastError> {
    let fail = || CastError::new(path, value.to_string(), kind);
    match (kind, value) {
        (_, Value::Null) => Ok(Bson::Null),
        (_, Value::String(s)) if kind != FieldKind::Array => cast_str(kind, path, s),
        (FieldKind::String, Value::Number(n)) => Ok(Bson::String(n.to_string())),
        (FieldKind::String, Value::Bool(b)) => Ok(Bson::String(b.to_string())),
        (FieldKind::Number, Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(Bson::Int64(i)),
            None => n.as_f64().map(Bson::Double).ok_or_else(fail),
        },
        (FieldKind::Boolean, Value::Bool(b)) => Ok(Bson::Boolean(*b)),
        (FieldKind::DateTime, Value::Number(n)) => n
            .as_i64()
            .map(|millis| Bson::DateTime(bson::DateTime::from_millis(millis)))
            .ok_or_else(fail),
        (FieldKind::Array, Value::Array(_)) => Bson::try_from(value.clone()).map_err(|_| fail()),
        _ => Err(fail()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIELDS: &[FieldDef] = &[
        FieldDef::new("price", FieldKind::Number).required(),
        FieldDef::new("active", FieldKind::Boolean),
        FieldDef::new("user", FieldKind::ObjectId),
        FieldDef::new("password", FieldKind::String),
    ];
    const SCHEMA: Schema = Schema::new(FIELDS, &["password"]);

    #[test]
    fn test_numbers_prefer_integers() {
        assert_eq!(SCHEMA.cast_query("price", "100").unwrap(), Bson::Int64(100));
        assert_eq!(SCHEMA.cast_query("price", " 9.5").unwrap(), Bson::Double(9.5));
        assert!(SCHEMA.cast_query("price", "cheap").is_err());
        assert!(SCHEMA.cast_query("price", "NaN").is_err());
    }

    #[test]
    fn test_booleans() {
        assert_eq!(SCHEMA.cast_query("active", "true").unwrap(), Bson::Boolean(true));
        assert_eq!(SCHEMA.cast_query("active", "0").unwrap(), Bson::Boolean(false));
        assert!(SCHEMA.cast_query("active", "yes").is_err());
    }

    #[test]
    fn test_object_ids() {
        let id = ObjectId::new();
        assert_eq!(
            SCHEMA.cast_query("user", &id.to_hex()).unwrap(),
            Bson::ObjectId(id)
        );
        assert_eq!(SCHEMA.cast_query("_id", &id.to_hex()).unwrap(), Bson::ObjectId(id));

        let err = SCHEMA.cast_query("_id", "not-an-id").unwrap_err();
        assert_eq!(err, CastError::new("_id", "not-an-id", FieldKind::ObjectId));
        assert_eq!(
            err.to_string(),
            "Invalid _id: cast to ObjectId failed for value \"not-an-id\""
        );
    }

    #[test]
    fn test_datetimes() {
        let parsed = SCHEMA.cast_query("createdAt", "2024-03-01T10:00:00Z").unwrap();
        assert!(matches!(parsed, Bson::DateTime(_)));
        assert!(matches!(
            SCHEMA.cast_query("createdAt", "2024-03-01").unwrap(),
            Bson::DateTime(_)
        ));
        assert!(SCHEMA.cast_query("createdAt", "yesterday").is_err());
    }

    #[test]
    fn test_undeclared_fields_stay_strings() {
        assert_eq!(
            SCHEMA.cast_query("color", "42").unwrap(),
            Bson::String("42".into())
        );
    }

    #[test]
    fn test_hidden_paths() {
        assert!(SCHEMA.is_hidden("password"));
        assert!(SCHEMA.is_hidden("password.hash"));
        assert!(!SCHEMA.is_hidden("price"));
    }

    #[test]
    fn test_default_projection() {
        assert_eq!(
            SCHEMA.default_projection(),
            doc! { "__v": 0, "password": 0 }
        );
    }

    #[test]
    fn test_json_casting() {
        assert_eq!(
            cast_json(FieldKind::Number, "price", &json!(12)).unwrap(),
            Bson::Int64(12)
        );
        assert_eq!(
            cast_json(FieldKind::Number, "price", &json!("12.5")).unwrap(),
            Bson::Double(12.5)
        );
        assert_eq!(
            cast_json(FieldKind::String, "name", &json!(7)).unwrap(),
            Bson::String("7".into())
        );
        assert_eq!(cast_json(FieldKind::Boolean, "read", &json!(null)).unwrap(), Bson::Null);
        assert!(cast_json(FieldKind::Number, "price", &json!({ "$gt": 1 })).is_err());
        assert!(cast_json(FieldKind::Array, "images", &json!("a.png")).is_err());

        let images = cast_json(FieldKind::Array, "images", &json!(["a.png", "b.png"])).unwrap();
        assert_eq!(images, Bson::Array(vec!["a.png".into(), "b.png".into()]));
    }
}
