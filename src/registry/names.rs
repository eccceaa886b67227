//! Operation names and their static policies.
//!
//! Every query and mutation is named by an enum variant, so invalidation
//! targets are checked by the compiler rather than matched as strings.

use std::fmt;
use std::time::Duration;

use crate::notify::Notice;

const MINUTE: Duration = Duration::from_secs(60);

/// Fetch policy for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPolicy {
  /// How long a result is served without refetching
  pub stale_time: Duration,
  /// Extra attempts after a failed fetch
  pub retry: u32,
  /// Never executes without an auth token
  pub requires_token: bool,
}

impl QueryPolicy {
  const fn new(stale_time: Duration, retry: u32, requires_token: bool) -> Self {
    Self {
      stale_time,
      retry,
      requires_token,
    }
  }
}

/// Every cached read operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryName {
  Properties,
  Property,
  FeaturedProperties,
  HostProperties,
  PropertyReviews,
  Reviews,
  MyReviews,
  Blogs,
  Blog,
  Profile,
  Bookings,
  Favorites,
  AdminStats,
  AdminUsers,
  AdminProperties,
}

impl QueryName {
  pub const ALL: [QueryName; 15] = [
    QueryName::Properties,
    QueryName::Property,
    QueryName::FeaturedProperties,
    QueryName::HostProperties,
    QueryName::PropertyReviews,
    QueryName::Reviews,
    QueryName::MyReviews,
    QueryName::Blogs,
    QueryName::Blog,
    QueryName::Profile,
    QueryName::Bookings,
    QueryName::Favorites,
    QueryName::AdminStats,
    QueryName::AdminUsers,
    QueryName::AdminProperties,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      QueryName::Properties => "properties",
      QueryName::Property => "property",
      QueryName::FeaturedProperties => "featured-properties",
      QueryName::HostProperties => "host-properties",
      QueryName::PropertyReviews => "property-reviews",
      QueryName::Reviews => "reviews",
      QueryName::MyReviews => "my-reviews",
      QueryName::Blogs => "blogs",
      QueryName::Blog => "blog",
      QueryName::Profile => "profile",
      QueryName::Bookings => "bookings",
      QueryName::Favorites => "favorites",
      QueryName::AdminStats => "admin-stats",
      QueryName::AdminUsers => "admin-users",
      QueryName::AdminProperties => "admin-properties",
    }
  }

  pub const fn policy(self) -> QueryPolicy {
    match self {
      QueryName::Properties => QueryPolicy::new(MINUTE, 2, false),
      QueryName::Property => QueryPolicy::new(MINUTE, 2, false),
      QueryName::FeaturedProperties => QueryPolicy::new(Duration::from_secs(300), 2, false),
      QueryName::HostProperties => QueryPolicy::new(Duration::from_secs(30), 1, true),
      QueryName::PropertyReviews => QueryPolicy::new(Duration::from_secs(30), 1, false),
      QueryName::Reviews => QueryPolicy::new(Duration::from_secs(30), 1, false),
      QueryName::MyReviews => QueryPolicy::new(Duration::ZERO, 1, true),
      QueryName::Blogs => QueryPolicy::new(Duration::from_secs(300), 2, false),
      QueryName::Blog => QueryPolicy::new(Duration::from_secs(300), 2, false),
      QueryName::Profile => QueryPolicy::new(Duration::ZERO, 0, true),
      QueryName::Bookings => QueryPolicy::new(Duration::ZERO, 1, true),
      QueryName::Favorites => QueryPolicy::new(Duration::from_secs(30), 1, true),
      QueryName::AdminStats => QueryPolicy::new(Duration::ZERO, 0, true),
      QueryName::AdminUsers => QueryPolicy::new(Duration::from_secs(30), 0, true),
      QueryName::AdminProperties => QueryPolicy::new(Duration::from_secs(30), 0, true),
    }
  }
}

impl fmt::Display for QueryName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Every write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationName {
  SignIn,
  SignUp,
  OAuthExchange,
  UpdateProfile,
  ChangePassword,
  CreateProperty,
  UpdateProperty,
  DeleteProperty,
  CreateReview,
  DeleteReview,
  CreateBlog,
  UpdateBlog,
  DeleteBlog,
  CreateBooking,
  CancelBooking,
  ToggleFavorite,
  AdminDeleteUser,
  SendContact,
}

impl MutationName {
  pub const ALL: [MutationName; 18] = [
    MutationName::SignIn,
    MutationName::SignUp,
    MutationName::OAuthExchange,
    MutationName::UpdateProfile,
    MutationName::ChangePassword,
    MutationName::CreateProperty,
    MutationName::UpdateProperty,
    MutationName::DeleteProperty,
    MutationName::CreateReview,
    MutationName::DeleteReview,
    MutationName::CreateBlog,
    MutationName::UpdateBlog,
    MutationName::DeleteBlog,
    MutationName::CreateBooking,
    MutationName::CancelBooking,
    MutationName::ToggleFavorite,
    MutationName::AdminDeleteUser,
    MutationName::SendContact,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      MutationName::SignIn => "sign-in",
      MutationName::SignUp => "sign-up",
      MutationName::OAuthExchange => "oauth-exchange",
      MutationName::UpdateProfile => "update-profile",
      MutationName::ChangePassword => "change-password",
      MutationName::CreateProperty => "create-property",
      MutationName::UpdateProperty => "update-property",
      MutationName::DeleteProperty => "delete-property",
      MutationName::CreateReview => "create-review",
      MutationName::DeleteReview => "delete-review",
      MutationName::CreateBlog => "create-blog",
      MutationName::UpdateBlog => "update-blog",
      MutationName::DeleteBlog => "delete-blog",
      MutationName::CreateBooking => "create-booking",
      MutationName::CancelBooking => "cancel-booking",
      MutationName::ToggleFavorite => "toggle-favorite",
      MutationName::AdminDeleteUser => "admin-delete-user",
      MutationName::SendContact => "send-contact",
    }
  }

  /// Queries marked stale when this mutation succeeds.
  pub fn invalidates(self) -> &'static [QueryName] {
    use QueryName::*;

    match self {
      MutationName::SignIn
      | MutationName::SignUp
      | MutationName::OAuthExchange
      | MutationName::ChangePassword
      | MutationName::SendContact => &[],
      MutationName::UpdateProfile => &[Profile],
      MutationName::CreateProperty => &[
        Properties,
        HostProperties,
        FeaturedProperties,
        AdminProperties,
        AdminStats,
      ],
      MutationName::UpdateProperty => &[
        Properties,
        Property,
        HostProperties,
        FeaturedProperties,
        AdminProperties,
      ],
      MutationName::DeleteProperty => &[
        Properties,
        Property,
        HostProperties,
        FeaturedProperties,
        AdminProperties,
        AdminStats,
      ],
      MutationName::CreateReview | MutationName::DeleteReview => {
        &[Reviews, PropertyReviews, MyReviews]
      }
      MutationName::CreateBlog => &[Blogs],
      MutationName::UpdateBlog | MutationName::DeleteBlog => &[Blogs, Blog],
      MutationName::CreateBooking | MutationName::CancelBooking => &[Bookings, AdminStats],
      MutationName::ToggleFavorite => &[Favorites],
      MutationName::AdminDeleteUser => &[AdminUsers, AdminStats],
    }
  }

  /// User-facing messages published on success and failure, if any.
  pub fn notice(self) -> Option<Notice> {
    let (success, failure) = match self {
      MutationName::SignIn => ("Signed in", "Sign in failed"),
      MutationName::SignUp => ("Account created", "Sign up failed"),
      MutationName::UpdateProfile => ("Profile updated", "Could not update profile"),
      MutationName::ChangePassword => ("Password changed", "Could not change password"),
      MutationName::CreateProperty => ("Listing created", "Could not create listing"),
      MutationName::UpdateProperty => ("Listing updated", "Could not update listing"),
      MutationName::DeleteProperty => ("Listing deleted", "Could not delete listing"),
      MutationName::CreateReview => ("Review posted", "Could not post review"),
      MutationName::CreateBooking => ("Booking requested", "Could not create booking"),
      MutationName::CancelBooking => ("Booking cancelled", "Could not cancel booking"),
      MutationName::SendContact => ("Message sent", "Could not send message"),
      MutationName::OAuthExchange
      | MutationName::DeleteReview
      | MutationName::CreateBlog
      | MutationName::UpdateBlog
      | MutationName::DeleteBlog
      | MutationName::ToggleFavorite
      | MutationName::AdminDeleteUser => return None,
    };
    Some(Notice { success, failure })
  }
}

impl fmt::Display for MutationName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn test_query_names_unique() {
    let names: HashSet<&str> = QueryName::ALL.iter().map(|q| q.as_str()).collect();
    assert_eq!(names.len(), QueryName::ALL.len());
  }

  #[test]
  fn test_mutation_names_unique() {
    let names: HashSet<&str> = MutationName::ALL.iter().map(|m| m.as_str()).collect();
    assert_eq!(names.len(), MutationName::ALL.len());
  }

  #[test]
  fn test_invalidation_sets_have_no_duplicates() {
    for mutation in MutationName::ALL {
      let targets = mutation.invalidates();
      let unique: HashSet<_> = targets.iter().collect();
      assert_eq!(unique.len(), targets.len(), "duplicate target in {}", mutation);
    }
  }

  #[test]
  fn test_policies_within_bounds() {
    for query in QueryName::ALL {
      let policy = query.policy();
      assert!(policy.stale_time <= Duration::from_secs(300), "{}", query);
      assert!(policy.retry <= 2, "{}", query);
    }
  }

  #[test]
  fn test_account_queries_require_token() {
    for query in [
      QueryName::Profile,
      QueryName::Bookings,
      QueryName::Favorites,
      QueryName::AdminStats,
    ] {
      assert!(query.policy().requires_token, "{}", query);
    }
    assert!(!QueryName::Properties.policy().requires_token);
  }

  #[test]
  fn test_review_mutations_refresh_review_queries() {
    assert_eq!(
      MutationName::CreateReview.invalidates(),
      &[QueryName::Reviews, QueryName::PropertyReviews, QueryName::MyReviews]
    );
    assert!(MutationName::SignIn.invalidates().is_empty());
  }
}
