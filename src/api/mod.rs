//! Remote rental service API.

mod client;
mod transport;
pub mod types;

pub use client::ApiClient;
pub use transport::{ApiRequest, HttpTransport, Method, Transport};
