//! Query descriptors, one per server resource.

use futures::future::FutureExt;

use super::descriptor::{always, non_empty, QueryDescriptor};
use super::names::QueryName;
use crate::api::types::{
  AdminStats, AdminUser, Blog, Booking, Property, PropertyFilter, Review, UserProfile,
};
use crate::cache::{KeyPart, KeyParams};

impl KeyParams for PropertyFilter {
  fn key_parts(&self) -> Vec<KeyPart> {
    let mut parts = self.location.key_parts();
    parts.extend(self.min_price.key_parts());
    parts.extend(self.max_price.key_parts());
    parts.extend(self.guests.key_parts());
    parts.extend(self.page.key_parts());
    parts
  }
}

// ============================================================================
// Listings
// ============================================================================

pub fn properties() -> QueryDescriptor<PropertyFilter, Vec<Property>> {
  QueryDescriptor {
    name: QueryName::Properties,
    ready: always,
    fetch: |api, filter| async move { api.get_properties(&filter).await }.boxed(),
  }
}

pub fn property() -> QueryDescriptor<String, Property> {
  QueryDescriptor {
    name: QueryName::Property,
    ready: non_empty,
    fetch: |api, id| async move { api.get_property(&id).await }.boxed(),
  }
}

pub fn featured_properties() -> QueryDescriptor<(), Vec<Property>> {
  QueryDescriptor {
    name: QueryName::FeaturedProperties,
    ready: always,
    fetch: |api, ()| async move { api.get_featured_properties().await }.boxed(),
  }
}

pub fn host_properties() -> QueryDescriptor<(), Vec<Property>> {
  QueryDescriptor {
    name: QueryName::HostProperties,
    ready: always,
    fetch: |api, ()| async move { api.get_host_properties().await }.boxed(),
  }
}

// ============================================================================
// Reviews
// ============================================================================

pub fn property_reviews() -> QueryDescriptor<String, Vec<Review>> {
  QueryDescriptor {
    name: QueryName::PropertyReviews,
    ready: non_empty,
    fetch: |api, property_id| async move { api.get_property_reviews(&property_id).await }.boxed(),
  }
}

pub fn reviews() -> QueryDescriptor<(), Vec<Review>> {
  QueryDescriptor {
    name: QueryName::Reviews,
    ready: always,
    fetch: |api, ()| async move { api.get_reviews().await }.boxed(),
  }
}

pub fn my_reviews() -> QueryDescriptor<(), Vec<Review>> {
  QueryDescriptor {
    name: QueryName::MyReviews,
    ready: always,
    fetch: |api, ()| async move { api.get_my_reviews().await }.boxed(),
  }
}

// ============================================================================
// Blogs
// ============================================================================

pub fn blogs() -> QueryDescriptor<(), Vec<Blog>> {
  QueryDescriptor {
    name: QueryName::Blogs,
    ready: always,
    fetch: |api, ()| async move { api.get_blogs().await }.boxed(),
  }
}

pub fn blog() -> QueryDescriptor<String, Blog> {
  QueryDescriptor {
    name: QueryName::Blog,
    ready: non_empty,
    fetch: |api, slug| async move { api.get_blog(&slug).await }.boxed(),
  }
}

// ============================================================================
// Account
// ============================================================================

pub fn profile() -> QueryDescriptor<(), UserProfile> {
  QueryDescriptor {
    name: QueryName::Profile,
    ready: always,
    fetch: |api, ()| async move { api.get_profile().await }.boxed(),
  }
}

pub fn bookings() -> QueryDescriptor<(), Vec<Booking>> {
  QueryDescriptor {
    name: QueryName::Bookings,
    ready: always,
    fetch: |api, ()| async move { api.get_bookings().await }.boxed(),
  }
}

pub fn favorites() -> QueryDescriptor<(), Vec<Property>> {
  QueryDescriptor {
    name: QueryName::Favorites,
    ready: always,
    fetch: |api, ()| async move { api.get_favorites().await }.boxed(),
  }
}

// ============================================================================
// Admin
// ============================================================================

pub fn admin_stats() -> QueryDescriptor<(), AdminStats> {
  QueryDescriptor {
    name: QueryName::AdminStats,
    ready: always,
    fetch: |api, ()| async move { api.get_admin_stats().await }.boxed(),
  }
}

pub fn admin_users() -> QueryDescriptor<(), Vec<AdminUser>> {
  QueryDescriptor {
    name: QueryName::AdminUsers,
    ready: always,
    fetch: |api, ()| async move { api.get_admin_users().await }.boxed(),
  }
}

pub fn admin_properties() -> QueryDescriptor<(), Vec<Property>> {
  QueryDescriptor {
    name: QueryName::AdminProperties,
    ready: always,
    fetch: |api, ()| async move { api.get_admin_properties().await }.boxed(),
  }
}

/// Names of every defined query descriptor.
pub fn defined() -> Vec<QueryName> {
  vec![
    properties().name,
    property().name,
    featured_properties().name,
    host_properties().name,
    property_reviews().name,
    reviews().name,
    my_reviews().name,
    blogs().name,
    blog().name,
    profile().name,
    bookings().name,
    favorites().name,
    admin_stats().name,
    admin_users().name,
    admin_properties().name,
  ]
}
