//! Auth token lifecycle.
//!
//! - `storage`: the key-value stores tokens persist in, with change events
//! - `token`: the token manager, the only reader and writer of token keys
//! - `watch`: a live view of the current token
//! - `session` / `exchange`: syncing an OAuth provider session into a token

mod exchange;
mod session;
mod storage;
mod token;
mod watch;

pub use exchange::{ExchangeOutcome, ExchangeState, TokenExchange};
pub use session::{split_name, OAuthSession, SessionStatus, SessionUser};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore, StorageEvent, StorageOrigin};
pub use token::{fingerprint, TokenKey, TokenManager};
pub use watch::TokenWatch;
