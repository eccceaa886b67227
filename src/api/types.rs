//! Serde types matching the rental service's JSON.
//!
//! The service speaks camelCase; every type here renames accordingly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Listings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: String,
  pub location: String,
  pub price_per_night: f64,
  #[serde(default)]
  pub max_guests: u32,
  #[serde(default)]
  pub bedrooms: u32,
  #[serde(default)]
  pub bathrooms: u32,
  #[serde(default)]
  pub images: Vec<String>,
  #[serde(default)]
  pub amenities: Vec<String>,
  pub host_id: Option<String>,
  #[serde(default)]
  pub featured: bool,
  pub created_at: Option<DateTime<Utc>>,
}

/// Fields for creating or replacing a listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyInput {
  pub title: String,
  pub description: String,
  pub location: String,
  pub price_per_night: f64,
  pub max_guests: u32,
  pub bedrooms: u32,
  pub bathrooms: u32,
  pub images: Vec<String>,
  pub amenities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyUpdate {
  #[serde(skip)]
  pub id: String,
  #[serde(flatten)]
  pub fields: PropertyInput,
}

/// Search filters for the listings page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyFilter {
  pub location: Option<String>,
  pub min_price: Option<u32>,
  pub max_price: Option<u32>,
  pub guests: Option<u32>,
  pub page: Option<u32>,
}

impl PropertyFilter {
  /// Query-string pairs for the set filters, in a fixed order.
  pub fn to_query(&self) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Some(location) = &self.location {
      pairs.push(("location".to_string(), location.clone()));
    }
    if let Some(min) = self.min_price {
      pairs.push(("minPrice".to_string(), min.to_string()));
    }
    if let Some(max) = self.max_price {
      pairs.push(("maxPrice".to_string(), max.to_string()));
    }
    if let Some(guests) = self.guests {
      pairs.push(("guests".to_string(), guests.to_string()));
    }
    if let Some(page) = self.page {
      pairs.push(("page".to_string(), page.to_string()));
    }
    pairs
  }
}

// ============================================================================
// Reviews
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
  pub id: String,
  pub property_id: String,
  pub user_id: Option<String>,
  #[serde(default)]
  pub author_name: Option<String>,
  pub overall_rating: f64,
  #[serde(default)]
  pub comment: String,
  pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewInput {
  pub property_id: String,
  pub overall_rating: f64,
  pub comment: String,
}

// ============================================================================
// Blogs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
  pub id: String,
  pub slug: String,
  pub title: String,
  #[serde(default)]
  pub excerpt: String,
  #[serde(default)]
  pub content: String,
  pub author: Option<String>,
  pub category: Option<String>,
  pub cover_image: Option<String>,
  pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogInput {
  pub title: String,
  pub excerpt: String,
  pub content: String,
  pub category: Option<String>,
  pub cover_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogUpdate {
  #[serde(skip)]
  pub id: String,
  #[serde(flatten)]
  pub fields: BlogInput,
}

// ============================================================================
// Users and auth
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
  #[default]
  Guest,
  Host,
  Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
  pub id: String,
  pub email: String,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name: String,
  pub avatar: Option<String>,
  pub phone: Option<String>,
  #[serde(default)]
  pub role: UserRole,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
  pub first_name: Option<String>,
  pub last_name: Option<String>,
  pub phone: Option<String>,
  pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
  pub current_password: String,
  pub new_password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
  pub email: String,
  pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpInput {
  pub email: String,
  pub password: String,
  pub first_name: String,
  pub last_name: String,
}

/// Identity taken from an OAuth session, exchanged for an app token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthIdentity {
  pub email: String,
  pub avatar: Option<String>,
  pub first_name: String,
  pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
  pub token: String,
  pub user: Option<UserProfile>,
}

// ============================================================================
// Bookings and favorites
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
  #[default]
  Pending,
  Confirmed,
  Cancelled,
  Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
  pub id: String,
  pub property_id: String,
  pub check_in: String,
  pub check_out: String,
  pub guests: u32,
  pub total_price: f64,
  #[serde(default)]
  pub status: BookingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingInput {
  pub property_id: String,
  pub check_in: String,
  pub check_out: String,
  pub guests: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteToggle {
  pub property_id: String,
  pub favorited: bool,
}

// ============================================================================
// Admin dashboard
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
  pub total_users: u64,
  pub total_properties: u64,
  pub total_bookings: u64,
  pub total_reviews: u64,
  #[serde(default)]
  pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
  pub id: String,
  pub email: String,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name: String,
  #[serde(default)]
  pub role: UserRole,
  pub created_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Misc
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMessage {
  pub name: String,
  pub email: String,
  pub message: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_property_from_service_json() {
    let json = serde_json::json!({
      "id": "p1",
      "title": "Lake cabin",
      "location": "Tahoe",
      "pricePerNight": 180.0,
      "maxGuests": 4,
      "hostId": "h1",
      "featured": true,
      "createdAt": "2024-05-01T10:00:00Z"
    });

    let property: Property = serde_json::from_value(json).unwrap();
    assert_eq!(property.price_per_night, 180.0);
    assert_eq!(property.max_guests, 4);
    assert!(property.images.is_empty());
    assert!(property.featured);
  }

  #[test]
  fn test_filter_query_pairs() {
    let filter = PropertyFilter {
      location: Some("Lisbon".into()),
      guests: Some(2),
      ..Default::default()
    };
    assert_eq!(
      filter.to_query(),
      vec![
        ("location".to_string(), "Lisbon".to_string()),
        ("guests".to_string(), "2".to_string()),
      ]
    );
  }

  #[test]
  fn test_update_body_omits_id() {
    let update = PropertyUpdate {
      id: "p1".into(),
      fields: PropertyInput {
        title: "Loft".into(),
        ..Default::default()
      },
    };
    let value = serde_json::to_value(&update).unwrap();
    assert!(value.get("id").is_none());
    assert_eq!(value["title"], "Loft");
    assert_eq!(value["pricePerNight"], 0.0);
  }

  #[test]
  fn test_missing_role_defaults_to_guest() {
    let json = serde_json::json!({ "id": "u1", "email": "a@b.com" });
    let user: UserProfile = serde_json::from_value(json).unwrap();
    assert_eq!(user.role, UserRole::Guest);
  }
}
