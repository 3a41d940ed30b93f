use crate::query::{FieldDef, FieldDefault, FieldKind, Schema};

use super::ResourceSpec;

/// Account roles
pub const ROLES: &[&str] = &["user", "admin", "main-admin"];

const FIELDS: &[FieldDef] = &[
    FieldDef::new("name", FieldKind::String).required(),
    FieldDef::new("email", FieldKind::String).required(),
    FieldDef::new("role", FieldKind::String)
        .one_of(ROLES)
        .default_value(FieldDefault::Str("user")),
    FieldDef::new("active", FieldKind::Boolean).default_value(FieldDefault::Bool(true)),
    FieldDef::new("password", FieldKind::String),
];

const SCHEMA: Schema = Schema::new(FIELDS, &["password"]);

/// User accounts; created by the auth flow, never through this API
pub static USERS: ResourceSpec = ResourceSpec {
    name: "user",
    plural: "users",
    collection: "users",
    schema: &SCHEMA,
    populate: None,
    creatable: false,
    unique_together: &[],
    aggregates_ratings: false,
};
