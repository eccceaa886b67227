use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::auth::TokenManager;
use crate::error::ApiError;

use super::transport::{ApiRequest, Transport};
use super::types::{
  AdminStats, AdminUser, AuthResponse, Blog, BlogInput, BlogUpdate, Booking, BookingInput,
  ContactMessage, Credentials, FavoriteToggle, OAuthIdentity, PasswordChange, ProfileUpdate,
  Property, PropertyFilter, PropertyInput, PropertyUpdate, Review, ReviewInput, SignUpInput,
  UserProfile,
};

/// Rental service API client.
///
/// One method per remote operation. The current auth token, if any, is
/// attached to every request.
#[derive(Clone)]
pub struct ApiClient {
  transport: Arc<dyn Transport>,
  tokens: TokenManager,
}

impl ApiClient {
  pub fn new(transport: Arc<dyn Transport>, tokens: TokenManager) -> Self {
    Self { transport, tokens }
  }

  async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
    let path = request.path.clone();
    let request = request.with_token(self.tokens.current());
    let value = self.transport.send(request).await?;
    serde_json::from_value(value).map_err(|source| ApiError::Decode { path, source })
  }

  async fn call_unit(&self, request: ApiRequest) -> Result<(), ApiError> {
    let request = request.with_token(self.tokens.current());
    self.transport.send(request).await.map(|_| ())
  }

  // ==========================================================================
  // Listings
  // ==========================================================================

  pub async fn get_properties(&self, filter: &PropertyFilter) -> Result<Vec<Property>, ApiError> {
    self
      .call(ApiRequest::get("properties").with_query(filter.to_query()))
      .await
  }

  pub async fn get_property(&self, id: &str) -> Result<Property, ApiError> {
    self.call(ApiRequest::get("properties").segment(id)).await
  }

  pub async fn get_featured_properties(&self) -> Result<Vec<Property>, ApiError> {
    self.call(ApiRequest::get("properties/featured")).await
  }

  pub async fn get_host_properties(&self) -> Result<Vec<Property>, ApiError> {
    self.call(ApiRequest::get("host/properties")).await
  }

  pub async fn create_property(&self, input: &PropertyInput) -> Result<Property, ApiError> {
    self
      .call(ApiRequest::post("properties").with_body(to_body(input)?))
      .await
  }

  pub async fn update_property(&self, update: &PropertyUpdate) -> Result<Property, ApiError> {
    self
      .call(ApiRequest::put("properties").segment(update.id.as_str()).with_body(to_body(update)?))
      .await
  }

  pub async fn delete_property(&self, id: &str) -> Result<(), ApiError> {
    self
      .call_unit(ApiRequest::delete("properties").segment(id))
      .await
  }

  // ==========================================================================
  // Reviews
  // ==========================================================================

  pub async fn get_reviews(&self) -> Result<Vec<Review>, ApiError> {
    self.call(ApiRequest::get("reviews")).await
  }

  pub async fn get_property_reviews(&self, property_id: &str) -> Result<Vec<Review>, ApiError> {
    self
      .call(ApiRequest::get("properties").segment(property_id).segment("reviews"))
      .await
  }

  pub async fn get_my_reviews(&self) -> Result<Vec<Review>, ApiError> {
    self.call(ApiRequest::get("reviews/me")).await
  }

  pub async fn create_review(&self, input: &ReviewInput) -> Result<Review, ApiError> {
    self
      .call(ApiRequest::post("reviews").with_body(to_body(input)?))
      .await
  }

  pub async fn delete_review(&self, id: &str) -> Result<(), ApiError> {
    self
      .call_unit(ApiRequest::delete("reviews").segment(id))
      .await
  }

  // ==========================================================================
  // Blogs
  // ==========================================================================

  pub async fn get_blogs(&self) -> Result<Vec<Blog>, ApiError> {
    self.call(ApiRequest::get("blogs")).await
  }

  pub async fn get_blog(&self, slug: &str) -> Result<Blog, ApiError> {
    self.call(ApiRequest::get("blogs").segment(slug)).await
  }

  pub async fn create_blog(&self, input: &BlogInput) -> Result<Blog, ApiError> {
    self
      .call(ApiRequest::post("blogs").with_body(to_body(input)?))
      .await
  }

  pub async fn update_blog(&self, update: &BlogUpdate) -> Result<Blog, ApiError> {
    self
      .call(ApiRequest::put("blogs").segment(update.id.as_str()).with_body(to_body(update)?))
      .await
  }

  pub async fn delete_blog(&self, id: &str) -> Result<(), ApiError> {
    self
      .call_unit(ApiRequest::delete("blogs").segment(id))
      .await
  }

  // ==========================================================================
  // Auth and profile
  // ==========================================================================

  pub async fn sign_in(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
    self
      .call(ApiRequest::post("auth/signin").with_body(to_body(credentials)?))
      .await
  }

  pub async fn sign_up(&self, input: &SignUpInput) -> Result<AuthResponse, ApiError> {
    self
      .call(ApiRequest::post("auth/signup").with_body(to_body(input)?))
      .await
  }

  pub async fn exchange_oauth(&self, identity: &OAuthIdentity) -> Result<AuthResponse, ApiError> {
    self
      .call(ApiRequest::post("auth/oauth").with_body(to_body(identity)?))
      .await
  }

  pub async fn get_profile(&self) -> Result<UserProfile, ApiError> {
    self.call(ApiRequest::get("users/me")).await
  }

  pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
    self
      .call(ApiRequest::put("users/me").with_body(to_body(update)?))
      .await
  }

  pub async fn change_password(&self, change: &PasswordChange) -> Result<(), ApiError> {
    self
      .call_unit(ApiRequest::put("users/me/password").with_body(to_body(change)?))
      .await
  }

  // ==========================================================================
  // Bookings and favorites
  // ==========================================================================

  pub async fn get_bookings(&self) -> Result<Vec<Booking>, ApiError> {
    self.call(ApiRequest::get("bookings")).await
  }

  pub async fn create_booking(&self, input: &BookingInput) -> Result<Booking, ApiError> {
    self
      .call(ApiRequest::post("bookings").with_body(to_body(input)?))
      .await
  }

  pub async fn cancel_booking(&self, id: &str) -> Result<Booking, ApiError> {
    self
      .call(ApiRequest::post("bookings").segment(id).segment("cancel"))
      .await
  }

  pub async fn get_favorites(&self) -> Result<Vec<Property>, ApiError> {
    self.call(ApiRequest::get("favorites")).await
  }

  pub async fn toggle_favorite(&self, property_id: &str) -> Result<FavoriteToggle, ApiError> {
    self
      .call(ApiRequest::post("favorites").segment(property_id).segment("toggle"))
      .await
  }

  // ==========================================================================
  // Admin
  // ==========================================================================

  pub async fn get_admin_stats(&self) -> Result<AdminStats, ApiError> {
    self.call(ApiRequest::get("admin/stats")).await
  }

  pub async fn get_admin_users(&self) -> Result<Vec<AdminUser>, ApiError> {
    self.call(ApiRequest::get("admin/users")).await
  }

  pub async fn get_admin_properties(&self) -> Result<Vec<Property>, ApiError> {
    self.call(ApiRequest::get("admin/properties")).await
  }

  pub async fn delete_user(&self, id: &str) -> Result<(), ApiError> {
    self
      .call_unit(ApiRequest::delete("admin/users").segment(id))
      .await
  }

  // ==========================================================================
  // Misc
  // ==========================================================================

  pub async fn send_contact_message(&self, message: &ContactMessage) -> Result<(), ApiError> {
    self
      .call_unit(ApiRequest::post("contact").with_body(to_body(message)?))
      .await
  }
}

fn to_body<T: Serialize>(value: &T) -> Result<Value, ApiError> {
  serde_json::to_value(value).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::transport::Method;
  use crate::auth::TokenKey;
  use crate::testing::{fixtures, MockTransport, TestHarness};
  use serde_json::json;

  #[tokio::test]
  async fn test_token_attached_when_present() {
    let harness = TestHarness::new();
    harness.transport.respond("users/me", fixtures::profile_json());
    harness.tokens.set(TokenKey::AccessToken, "tok-1").unwrap();

    let profile = harness.api().get_profile().await.unwrap();
    assert_eq!(profile.email, "guest@rentals.test");

    let requests = harness.transport.requests();
    assert_eq!(requests[0].method, Method::Get);
    assert_eq!(requests[0].token.as_deref(), Some("tok-1"));
  }

  #[tokio::test]
  async fn test_filter_becomes_query_string() {
    let harness = TestHarness::new();
    harness.transport.respond("properties", json!([]));

    let filter = PropertyFilter {
      location: Some("Porto".into()),
      ..Default::default()
    };
    let properties = harness.api().get_properties(&filter).await.unwrap();
    assert!(properties.is_empty());

    let request = &harness.transport.requests()[0];
    assert_eq!(request.token, None);
    assert_eq!(
      request.query,
      vec![("location".to_string(), "Porto".to_string())]
    );
  }

  #[tokio::test]
  async fn test_mismatched_body_is_decode_error() {
    let harness = TestHarness::new();
    harness.transport.respond("properties/p1", json!({ "unexpected": true }));

    let err = harness.api().get_property("p1").await.unwrap_err();
    assert!(matches!(err, ApiError::Decode { .. }));
  }

  #[tokio::test]
  async fn test_update_uses_id_in_path() {
    let transport = Arc::new(MockTransport::new());
    transport.respond("blogs/b1", fixtures::blog_json("b1", "hello"));
    let api = ApiClient::new(transport.clone(), TestHarness::new().tokens);

    let update = BlogUpdate {
      id: "b1".into(),
      fields: BlogInput {
        title: "Hello again".into(),
        ..Default::default()
      },
    };
    api.update_blog(&update).await.unwrap();

    let request = &transport.requests()[0];
    assert_eq!(request.method, Method::Put);
    assert_eq!(request.path, "blogs/b1");
    assert_eq!(request.segments, vec!["blogs", "b1"]);
    assert_eq!(request.body.as_ref().unwrap()["title"], "Hello again");
  }

  #[tokio::test]
  async fn test_id_stays_one_segment() {
    let harness = TestHarness::new();
    harness.transport.fail("properties/../users/me", 404);

    let _ = harness.api().get_property("../users/me").await;

    let request = &harness.transport.requests()[0];
    assert_eq!(request.segments, vec!["properties", "../users/me"]);
  }
}
