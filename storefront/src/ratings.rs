//! Product rating summaries
//!
//! A product carries `ratingsQuantity` and `ratingsAverage` derived from its
//! reviews. Both are recomputed from scratch after every review write.

use bson::{doc, oid::ObjectId, Bson};

use crate::error::Result;
use crate::resources::{PRODUCTS, REVIEWS};
use crate::store::{DocumentStore, FindOptions};

/// Aggregate rating of one product
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    /// Number of reviews
    pub quantity: u64,
    /// Mean rating rounded to one decimal, 0 without reviews
    pub average: f64,
}

impl RatingSummary {
    /// Summarize a set of ratings
    pub fn from_ratings(ratings: &[f64]) -> Self {
        if ratings.is_empty() {
            return Self {
                quantity: 0,
                average: 0.0,
            };
        }
        let mean = ratings.iter().sum::<f64>() / ratings.len() as f64;
        Self {
            quantity: ratings.len() as u64,
            average: (mean * 10.0).round() / 10.0,
        }
    }
}

/// Recompute and store the rating summary of `product`
pub async fn recompute(store: &dyn DocumentStore, product: ObjectId) -> Result<RatingSummary> {
    let reviews = store
        .find(
            REVIEWS.collection,
            doc! { "product": product },
            FindOptions::default().with_projection(doc! { "rating": 1 }),
        )
        .await?;

    let ratings: Vec<f64> = reviews
        .iter()
        .filter_map(|review| match review.get("rating") {
            Some(Bson::Int32(n)) => Some(f64::from(*n)),
            Some(Bson::Int64(n)) => Some(*n as f64),
            Some(Bson::Double(n)) => Some(*n),
            _ => None,
        })
        .collect();
    let summary = RatingSummary::from_ratings(&ratings);

    let quantity = i64::try_from(summary.quantity).unwrap_or(i64::MAX);
    let updated = store
        .update_one(
            PRODUCTS.collection,
            doc! { "_id": product },
            doc! { "ratingsQuantity": quantity, "ratingsAverage": summary.average },
        )
        .await?;

    if updated.is_none() {
        tracing::warn!(product = %product, "Reviewed product no longer exists");
    } else {
        tracing::debug!(
            product = %product,
            quantity = summary.quantity,
            average = summary.average,
            "Recomputed product ratings"
        );
    }
    Ok(summary)
}
