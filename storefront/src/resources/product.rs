use crate::query::{FieldDef, FieldDefault, FieldKind, Schema};

use super::ResourceSpec;

const FIELDS: &[FieldDef] = &[
    FieldDef::new("name", FieldKind::String).required(),
    FieldDef::new("description", FieldKind::String),
    FieldDef::new("price", FieldKind::Number).required().between(0.0, f64::MAX),
    FieldDef::new("category", FieldKind::String),
    FieldDef::new("stock", FieldKind::Number)
        .between(0.0, f64::MAX)
        .default_value(FieldDefault::Int(0)),
    FieldDef::new("images", FieldKind::Array),
    FieldDef::new("ratingsAverage", FieldKind::Number)
        .between(0.0, 5.0)
        .default_value(FieldDefault::Int(0)),
    FieldDef::new("ratingsQuantity", FieldKind::Number).default_value(FieldDefault::Int(0)),
];

const SCHEMA: Schema = Schema::new(FIELDS, &[]);

/// Catalog products
pub static PRODUCTS: ResourceSpec = ResourceSpec {
    name: "product",
    plural: "products",
    collection: "products",
    schema: &SCHEMA,
    populate: None,
    creatable: true,
    unique_together: &[],
    aggregates_ratings: false,
};
