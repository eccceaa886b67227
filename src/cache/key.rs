//! Cache keys: operation name plus ordered parameter values.

use std::fmt;

use crate::registry::QueryName;

/// One parameter value inside a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
  Null,
  Bool(bool),
  Int(i64),
  Str(String),
}

impl fmt::Display for KeyPart {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeyPart::Null => f.write_str("null"),
      KeyPart::Bool(b) => write!(f, "{}", b),
      KeyPart::Int(i) => write!(f, "{}", i),
      KeyPart::Str(s) => write!(f, "{:?}", s),
    }
  }
}

/// Parameters that can be turned into cache key parts.
///
/// Order matters: `(a, b)` and `(b, a)` produce different keys.
pub trait KeyParams {
  fn key_parts(&self) -> Vec<KeyPart>;
}

impl KeyParams for () {
  fn key_parts(&self) -> Vec<KeyPart> {
    Vec::new()
  }
}

impl KeyParams for String {
  fn key_parts(&self) -> Vec<KeyPart> {
    vec![KeyPart::Str(self.clone())]
  }
}

impl KeyParams for bool {
  fn key_parts(&self) -> Vec<KeyPart> {
    vec![KeyPart::Bool(*self)]
  }
}

macro_rules! int_key_params {
  ($($t:ty),*) => {
    $(
      impl KeyParams for $t {
        fn key_parts(&self) -> Vec<KeyPart> {
          vec![KeyPart::Int(i64::from(*self))]
        }
      }
    )*
  };
}

int_key_params!(u32, i32, i64);

impl KeyParams for u64 {
  fn key_parts(&self) -> Vec<KeyPart> {
    // Values above i64::MAX
    match i64::try_from(*self) {
      Ok(value) => vec![KeyPart::Int(value)],
      Err(_) => vec![KeyPart::Str(self.to_string())],
    }
  }
}

impl<T: KeyParams> KeyParams for Option<T> {
  fn key_parts(&self) -> Vec<KeyPart> {
    match self {
      Some(value) => value.key_parts(),
      None => vec![KeyPart::Null],
    }
  }
}

impl<A: KeyParams, B: KeyParams> KeyParams for (A, B) {
  fn key_parts(&self) -> Vec<KeyPart> {
    let mut parts = self.0.key_parts();
    parts.extend(self.1.key_parts());
    parts
  }
}

/// Identity of a cached query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
  pub name: QueryName,
  pub params: Vec<KeyPart>,
}

impl QueryKey {
  pub fn new(name: QueryName, params: &impl KeyParams) -> Self {
    Self {
      name,
      params: params.key_parts(),
    }
  }

  /// Key for an operation without parameters.
  pub fn bare(name: QueryName) -> Self {
    Self {
      name,
      params: Vec::new(),
    }
  }

  /// Whether this key falls under `name`, regardless of parameters.
  pub fn belongs_to(&self, name: QueryName) -> bool {
    self.name == name
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{:?}", self.name.as_str())?;
    for part in &self.params {
      write!(f, ", {}", part)?;
    }
    f.write_str("]")
  }
}
