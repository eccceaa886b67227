//! Registry of every query and mutation the client knows.
//!
//! `names` holds the declarative tables (staleness, retries, token gating,
//! invalidation targets); `queries` and `mutations` bind each name to its
//! remote call.

mod descriptor;
pub mod mutations;
mod names;
pub mod queries;

pub use descriptor::{always, non_empty, CallFn, FetchFn, MutationDescriptor, QueryDescriptor};
pub use names::{MutationName, QueryName, QueryPolicy};
