//! Query result caching.
//!
//! This module provides the in-memory cache behind every query:
//! - Entries keyed by operation name plus ordered parameters
//! - Per-entry staleness windows and invalidation
//! - Observer tracking and garbage collection of unobserved entries
//! - Change events so mounted queries can follow updates

mod gc;
mod key;
mod store;

pub use gc::spawn_gc_task;
pub use key::{KeyPart, KeyParams, QueryKey};
pub use store::{CacheEntry, CacheEvent, EntryStatus, QueryCache};
