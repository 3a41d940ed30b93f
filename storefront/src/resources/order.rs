use crate::query::{FieldDef, FieldDefault, FieldKind, Populate, Schema};

use super::ResourceSpec;

/// Lifecycle states an order moves through
pub const ORDER_STATUSES: &[&str] = &["pending", "paid", "shipped", "delivered", "cancelled"];

const FIELDS: &[FieldDef] = &[
    FieldDef::new("user", FieldKind::ObjectId).required(),
    FieldDef::new("product", FieldKind::ObjectId).required(),
    FieldDef::new("quantity", FieldKind::Number)
        .required()
        .between(1.0, f64::MAX),
    FieldDef::new("totalPrice", FieldKind::Number).between(0.0, f64::MAX),
    FieldDef::new("status", FieldKind::String)
        .one_of(ORDER_STATUSES)
        .default_value(FieldDefault::Str("pending")),
];

const SCHEMA: Schema = Schema::new(FIELDS, &[]);

/// Orders placed by users
pub static ORDERS: ResourceSpec = ResourceSpec {
    name: "order",
    plural: "orders",
    collection: "orders",
    schema: &SCHEMA,
    populate: Some(Populate::new("product", "products", &["name", "price"])),
    creatable: true,
    unique_together: &[],
    aggregates_ratings: false,
};
