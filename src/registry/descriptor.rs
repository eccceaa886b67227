//! Static descriptions of queries and mutations.

use futures::future::BoxFuture;
use std::fmt;
use std::time::Duration;

use super::names::{MutationName, QueryName, QueryPolicy};
use crate::api::ApiClient;
use crate::cache::{KeyParams, QueryKey};
use crate::error::ApiError;

/// Remote read bound to a query.
pub type FetchFn<P, T> = fn(ApiClient, P) -> BoxFuture<'static, Result<T, ApiError>>;

/// Remote write bound to a mutation.
pub type CallFn<I, O> = fn(ApiClient, I) -> BoxFuture<'static, Result<O, ApiError>>;

/// A cached, parameterized read operation.
pub struct QueryDescriptor<P, T> {
  pub name: QueryName,
  /// Whether the parameters are complete enough to run (e.g. an id is set)
  pub ready: fn(&P) -> bool,
  pub fetch: FetchFn<P, T>,
}

impl<P, T> QueryDescriptor<P, T> {
  pub fn policy(&self) -> QueryPolicy {
    self.name.policy()
  }

  pub fn stale_time(&self) -> Duration {
    self.name.policy().stale_time
  }

  pub fn retry(&self) -> u32 {
    self.name.policy().retry
  }

  pub fn requires_token(&self) -> bool {
    self.name.policy().requires_token
  }

  /// Disabled queries do not run and report no error.
  pub fn is_enabled(&self, params: &P, has_token: bool) -> bool {
    (self.ready)(params) && (has_token || !self.requires_token())
  }
}

impl<P: KeyParams, T> QueryDescriptor<P, T> {
  pub fn key(&self, params: &P) -> QueryKey {
    QueryKey::new(self.name, params)
  }
}

impl<P, T> Clone for QueryDescriptor<P, T> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<P, T> Copy for QueryDescriptor<P, T> {}

impl<P, T> fmt::Debug for QueryDescriptor<P, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueryDescriptor")
      .field("name", &self.name)
      .field("policy", &self.policy())
      .finish_non_exhaustive()
  }
}

/// An uncached write operation.
pub struct MutationDescriptor<I, O> {
  pub name: MutationName,
  pub call: CallFn<I, O>,
}

impl<I, O> MutationDescriptor<I, O> {
  pub fn invalidates(&self) -> &'static [QueryName] {
    self.name.invalidates()
  }
}

impl<I, O> Clone for MutationDescriptor<I, O> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<I, O> Copy for MutationDescriptor<I, O> {}

impl<I, O> fmt::Debug for MutationDescriptor<I, O> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MutationDescriptor")
      .field("name", &self.name)
      .field("invalidates", &self.invalidates())
      .finish_non_exhaustive()
  }
}

/// Parameter check for queries that always run.
pub fn always<P>(_: &P) -> bool {
  true
}

/// Parameter check for queries keyed by a non-empty id.
#[allow(clippy::ptr_arg)]
pub fn non_empty(id: &String) -> bool {
  !id.trim().is_empty()
}
