//! Property rating derived from the review list.

use serde::Serialize;

use crate::api::types::Review;
use crate::client::QueryClient;
use crate::query::Query;
use crate::registry::queries;

/// Average rating for one property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
  /// Mean of `overall_rating`, rounded to one decimal
  pub rating: f64,
  pub review_count: usize,
}

pub fn summarize(reviews: &[Review], property_id: &str) -> RatingSummary {
  let (sum, count) = reviews
    .iter()
    .filter(|r| r.property_id == property_id)
    .fold((0.0, 0usize), |(sum, count), r| (sum + r.overall_rating, count + 1));

  if count == 0 {
    return RatingSummary::default();
  }

  let mean = sum / count as f64;
  RatingSummary {
    rating: (mean * 10.0).round() / 10.0,
    review_count: count,
  }
}

/// Observer of one property's rating.
///
/// Wraps the full review list query and recomputes the summary on every
/// read, so it follows refetches and invalidations of that list.
#[derive(Debug)]
pub struct PropertyRating {
  property_id: String,
  reviews: Query<(), Vec<Review>>,
}

impl PropertyRating {
  pub fn new(client: &QueryClient, property_id: impl Into<String>) -> Self {
    Self {
      property_id: property_id.into(),
      reviews: client.query(queries::reviews(), ()),
    }
  }

  pub fn property_id(&self) -> &str {
    &self.property_id
  }

  /// Returns `true` if the underlying reviews changed.
  pub fn poll(&mut self) -> bool {
    self.reviews.poll()
  }

  pub fn summary(&self) -> RatingSummary {
    self
      .reviews
      .data()
      .map(|reviews| summarize(reviews, &self.property_id))
      .unwrap_or_default()
  }

  pub fn is_loading(&self) -> bool {
    self.reviews.is_loading()
  }
}
