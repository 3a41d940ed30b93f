use crate::query::{FieldDef, FieldKind, Populate, Schema};

use super::ResourceSpec;

const FIELDS: &[FieldDef] = &[
    FieldDef::new("user", FieldKind::ObjectId).required(),
    FieldDef::new("product", FieldKind::ObjectId).required(),
    FieldDef::new("rating", FieldKind::Number)
        .required()
        .between(1.0, 5.0),
    FieldDef::new("review", FieldKind::String),
];

const SCHEMA: Schema = Schema::new(FIELDS, &[]);

/// Product reviews; one per user and product
pub static REVIEWS: ResourceSpec = ResourceSpec {
    name: "review",
    plural: "reviews",
    collection: "reviews",
    schema: &SCHEMA,
    populate: Some(Populate::new("user", "users", &["name"])),
    creatable: true,
    unique_together: &["user", "product"],
    aggregates_ratings: true,
};
