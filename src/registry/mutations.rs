//! Mutation descriptors, one per write endpoint.

use futures::future::FutureExt;

use super::descriptor::MutationDescriptor;
use super::names::MutationName;
use crate::api::types::{
  AuthResponse, Blog, BlogInput, BlogUpdate, Booking, BookingInput, ContactMessage, Credentials,
  FavoriteToggle, OAuthIdentity, PasswordChange, ProfileUpdate, Property, PropertyInput,
  PropertyUpdate, Review, ReviewInput, SignUpInput, UserProfile,
};

// ============================================================================
// Auth and profile
// ============================================================================

pub fn sign_in() -> MutationDescriptor<Credentials, AuthResponse> {
  MutationDescriptor {
    name: MutationName::SignIn,
    call: |api, credentials| async move { api.sign_in(&credentials).await }.boxed(),
  }
}

pub fn sign_up() -> MutationDescriptor<SignUpInput, AuthResponse> {
  MutationDescriptor {
    name: MutationName::SignUp,
    call: |api, input| async move { api.sign_up(&input).await }.boxed(),
  }
}

pub fn oauth_exchange() -> MutationDescriptor<OAuthIdentity, AuthResponse> {
  MutationDescriptor {
    name: MutationName::OAuthExchange,
    call: |api, identity| async move { api.exchange_oauth(&identity).await }.boxed(),
  }
}

pub fn update_profile() -> MutationDescriptor<ProfileUpdate, UserProfile> {
  MutationDescriptor {
    name: MutationName::UpdateProfile,
    call: |api, update| async move { api.update_profile(&update).await }.boxed(),
  }
}

pub fn change_password() -> MutationDescriptor<PasswordChange, ()> {
  MutationDescriptor {
    name: MutationName::ChangePassword,
    call: |api, change| async move { api.change_password(&change).await }.boxed(),
  }
}

// ============================================================================
// Listings
// ============================================================================

pub fn create_property() -> MutationDescriptor<PropertyInput, Property> {
  MutationDescriptor {
    name: MutationName::CreateProperty,
    call: |api, input| async move { api.create_property(&input).await }.boxed(),
  }
}

pub fn update_property() -> MutationDescriptor<PropertyUpdate, Property> {
  MutationDescriptor {
    name: MutationName::UpdateProperty,
    call: |api, update| async move { api.update_property(&update).await }.boxed(),
  }
}

pub fn delete_property() -> MutationDescriptor<String, ()> {
  MutationDescriptor {
    name: MutationName::DeleteProperty,
    call: |api, id| async move { api.delete_property(&id).await }.boxed(),
  }
}

// ============================================================================
// Reviews
// ============================================================================

pub fn create_review() -> MutationDescriptor<ReviewInput, Review> {
  MutationDescriptor {
    name: MutationName::CreateReview,
    call: |api, input| async move { api.create_review(&input).await }.boxed(),
  }
}

pub fn delete_review() -> MutationDescriptor<String, ()> {
  MutationDescriptor {
    name: MutationName::DeleteReview,
    call: |api, id| async move { api.delete_review(&id).await }.boxed(),
  }
}

// ============================================================================
// Blogs
// ============================================================================

pub fn create_blog() -> MutationDescriptor<BlogInput, Blog> {
  MutationDescriptor {
    name: MutationName::CreateBlog,
    call: |api, input| async move { api.create_blog(&input).await }.boxed(),
  }
}

pub fn update_blog() -> MutationDescriptor<BlogUpdate, Blog> {
  MutationDescriptor {
    name: MutationName::UpdateBlog,
    call: |api, update| async move { api.update_blog(&update).await }.boxed(),
  }
}

pub fn delete_blog() -> MutationDescriptor<String, ()> {
  MutationDescriptor {
    name: MutationName::DeleteBlog,
    call: |api, id| async move { api.delete_blog(&id).await }.boxed(),
  }
}

// ============================================================================
// Bookings and favorites
// ============================================================================

pub fn create_booking() -> MutationDescriptor<BookingInput, Booking> {
  MutationDescriptor {
    name: MutationName::CreateBooking,
    call: |api, input| async move { api.create_booking(&input).await }.boxed(),
  }
}

pub fn cancel_booking() -> MutationDescriptor<String, Booking> {
  MutationDescriptor {
    name: MutationName::CancelBooking,
    call: |api, id| async move { api.cancel_booking(&id).await }.boxed(),
  }
}

pub fn toggle_favorite() -> MutationDescriptor<String, FavoriteToggle> {
  MutationDescriptor {
    name: MutationName::ToggleFavorite,
    call: |api, property_id| async move { api.toggle_favorite(&property_id).await }.boxed(),
  }
}

// ============================================================================
// Admin and misc
// ============================================================================

pub fn admin_delete_user() -> MutationDescriptor<String, ()> {
  MutationDescriptor {
    name: MutationName::AdminDeleteUser,
    call: |api, id| async move { api.delete_user(&id).await }.boxed(),
  }
}

pub fn send_contact() -> MutationDescriptor<ContactMessage, ()> {
  MutationDescriptor {
    name: MutationName::SendContact,
    call: |api, message| async move { api.send_contact_message(&message).await }.boxed(),
  }
}
