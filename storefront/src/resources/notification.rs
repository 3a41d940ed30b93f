use crate::query::{FieldDef, FieldDefault, FieldKind, Schema};

use super::ResourceSpec;

const FIELDS: &[FieldDef] = &[
    FieldDef::new("user", FieldKind::ObjectId).required(),
    FieldDef::new("message", FieldKind::String).required(),
    FieldDef::new("read", FieldKind::Boolean).default_value(FieldDefault::Bool(false)),
];

const SCHEMA: Schema = Schema::new(FIELDS, &[]);

/// Per-user notifications
pub static NOTIFICATIONS: ResourceSpec = ResourceSpec {
    name: "notification",
    plural: "notifications",
    collection: "notifications",
    schema: &SCHEMA,
    populate: None,
    creatable: true,
    unique_together: &[],
    aggregates_ratings: false,
};
