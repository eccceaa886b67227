//! Request/response plumbing between `ApiClient` and the network.

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
    })
  }
}

/// A single call to the rental service.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  /// Path relative to the API root, without a leading slash. Used for
  /// logging and routing; the URL is built from `segments`.
  pub path: String,
  /// Unescaped path segments
  pub segments: Vec<String>,
  pub query: Vec<(String, String)>,
  pub body: Option<Value>,
  /// Bearer token, for protected endpoints
  pub token: Option<String>,
}

impl ApiRequest {
  /// `path` is a fixed route and is split on `/`. Caller-supplied values
  /// go through [`ApiRequest::segment`].
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    let path = path.into().trim_start_matches('/').to_string();
    let segments = path
      .split('/')
      .filter(|s| !s.is_empty())
      .map(String::from)
      .collect();
    Self {
      method,
      path,
      segments,
      query: Vec::new(),
      body: None,
      token: None,
    }
  }

  pub fn get(path: impl Into<String>) -> Self {
    Self::new(Method::Get, path)
  }

  pub fn post(path: impl Into<String>) -> Self {
    Self::new(Method::Post, path)
  }

  pub fn put(path: impl Into<String>) -> Self {
    Self::new(Method::Put, path)
  }

  pub fn delete(path: impl Into<String>) -> Self {
    Self::new(Method::Delete, path)
  }

  /// Append one path segment, escaped as a whole when the URL is built.
  pub fn segment(mut self, segment: impl Into<String>) -> Self {
    let segment = segment.into();
    if !self.path.is_empty() {
      self.path.push('/');
    }
    self.path.push_str(&segment);
    self.segments.push(segment);
    self
  }

  pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
    self.query = query;
    self
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn with_token(mut self, token: Option<String>) -> Self {
    self.token = token;
    self
  }
}

/// Sends requests and returns the decoded JSON body.
///
/// An empty success body comes back as `Value::Null`.
pub trait Transport: Send + Sync {
  fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<Value, ApiError>>;
}

/// Transport over HTTP using reqwest.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
    // Url::join drops the last segment unless the base ends with a slash
    let normalized = if base_url.ends_with('/') {
      base_url.to_string()
    } else {
      format!("{}/", base_url)
    };
    let base_url = Url::parse(&normalized)
      .map_err(|e| ApiError::InvalidRequest(format!("bad base url {}: {}", base_url, e)))?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| ApiError::InvalidRequest(format!("failed to build http client: {}", e)))?;

    Ok(Self { client, base_url })
  }

  /// Append `segments` to the base URL, percent-encoding each one.
  ///
  /// `/`, `?` and `#` inside a segment never change the route. Empty and
  /// dot segments are refused.
  pub fn url_for(&self, segments: &[String]) -> Result<Url, ApiError> {
    if let Some(bad) = segments.iter().find(|s| is_dot_or_empty(s)) {
      return Err(ApiError::InvalidRequest(format!("bad path segment {:?}", bad)));
    }
    let mut url = self.base_url.clone();
    let cannot_be_base =
      || ApiError::InvalidRequest(format!("base url {} cannot take a path", self.base_url));
    url
      .path_segments_mut()
      .map_err(|_| cannot_be_base())?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }
}

impl Transport for HttpTransport {
  fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<Value, ApiError>> {
    let client = self.client.clone();
    let url = self.url_for(&request.segments);

    async move {
      let url = url?;
      let path = request.path;
      debug!(method = %request.method, path = %path, "api request");

      let mut builder = match request.method {
        Method::Get => client.get(url),
        Method::Post => client.post(url),
        Method::Put => client.put(url),
        Method::Delete => client.delete(url),
      };
      if !request.query.is_empty() {
        builder = builder.query(&request.query);
      }
      if let Some(token) = &request.token {
        builder = builder.bearer_auth(token);
      }
      if let Some(body) = &request.body {
        builder = builder.json(body);
      }

      let response = builder.send().await.map_err(|e| ApiError::Transport {
        path: path.clone(),
        message: e.to_string(),
      })?;

      let status = response.status();
      let bytes = response.bytes().await.map_err(|e| ApiError::Transport {
        path: path.clone(),
        message: e.to_string(),
      })?;

      if !status.is_success() {
        return Err(ApiError::Status {
          path,
          status: status.as_u16(),
          message: error_message(&bytes, status.canonical_reason()),
        });
      }

      if bytes.is_empty() {
        return Ok(Value::Null);
      }
      serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode { path, source })
    }
    .boxed()
  }
}

fn is_dot_or_empty(segment: &str) -> bool {
  let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
  matches!(decoded.as_str(), "" | "." | "..")
}

/// Pull a readable message out of an error body.
///
/// The service answers `{"message": "..."}` or `{"error": "..."}`.
fn error_message(body: &[u8], reason: Option<&str>) -> String {
  let from_json = serde_json::from_slice::<Value>(body).ok().and_then(|v| {
    v.get("message")
      .or_else(|| v.get("error"))
      .and_then(Value::as_str)
      .map(String::from)
  });

  from_json
    .or_else(|| {
      let text = String::from_utf8_lossy(body).trim().to_string();
      (!text.is_empty()).then_some(text)
    })
    .unwrap_or_else(|| reason.unwrap_or("request failed").to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_base_url_without_trailing_slash_keeps_prefix() {
    let transport = HttpTransport::new("https://rentals.test/api", Duration::from_secs(1)).unwrap();
    let request = ApiRequest::get("properties").segment("p1");
    assert_eq!(
      transport.url_for(&request.segments).unwrap().as_str(),
      "https://rentals.test/api/properties/p1"
    );
  }

  #[test]
  fn test_segment_cannot_leave_its_route() {
    let transport = HttpTransport::new("https://rentals.test/api", Duration::from_secs(1)).unwrap();
    let url = |id: &str| {
      let request = ApiRequest::get("properties").segment(id);
      transport.url_for(&request.segments)
    };

    let traversal = url("../users/me").unwrap();
    assert_eq!(traversal.as_str(), "https://rentals.test/api/properties/..%2Fusers%2Fme");

    let injected = url("a?admin=1").unwrap();
    assert_eq!(injected.path(), "/api/properties/a%3Fadmin=1");
    assert_eq!(injected.query(), None);

    let fragment = url("a#b").unwrap();
    assert_eq!(fragment.fragment(), None);
  }

  #[test]
  fn test_dot_and_empty_segments_rejected() {
    let transport = HttpTransport::new("https://rentals.test/api", Duration::from_secs(1)).unwrap();
    for id in ["..", ".", "%2E%2e", ""] {
      let request = ApiRequest::delete("properties").segment(id);
      assert!(
        matches!(transport.url_for(&request.segments), Err(ApiError::InvalidRequest(_))),
        "{:?} accepted",
        id
      );
    }
  }

  #[test]
  fn test_invalid_base_url() {
    assert!(matches!(
      HttpTransport::new("not a url", Duration::from_secs(1)),
      Err(ApiError::InvalidRequest(_))
    ));
  }

  #[test]
  fn test_request_path_is_relative() {
    assert_eq!(ApiRequest::get("/blogs").path, "blogs");
    let nested = ApiRequest::get("properties").segment("p1").segment("reviews");
    assert_eq!(nested.path, "properties/p1/reviews");
    assert_eq!(nested.segments, vec!["properties", "p1", "reviews"]);
  }

  #[test]
  fn test_error_message_sources() {
    assert_eq!(error_message(br#"{"message":"Invalid credentials"}"#, None), "Invalid credentials");
    assert_eq!(error_message(br#"{"error":"Forbidden"}"#, None), "Forbidden");
    assert_eq!(error_message(b"upstream down", None), "upstream down");
    assert_eq!(error_message(b"", Some("Not Found")), "Not Found");
  }
}
