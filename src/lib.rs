//! Client-side data sync for the rental service.
//!
//! A [`QueryClient`] caches reads declared in [`registry::queries`], runs
//! writes declared in [`registry::mutations`] and invalidates the reads each
//! write affects. The [`auth`] module owns the token that gates protected
//! queries, and keeps it in sync with other processes and with an external
//! OAuth session.

pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod mutation;
pub mod notify;
pub mod query;
pub mod rating;
pub mod registry;

#[cfg(test)]
mod testing;

pub use client::{ClientOptions, QueryClient};
pub use error::{ApiError, StorageError};
pub use mutation::{Mutation, MutationState};
pub use query::{Query, QueryState};
