// src/message/blob.rs

use bytes::Bytes;
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

/// An immutable, cheaply cloneable byte string used for routing identities and topics.
#[derive(Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Blob {
  inner: Bytes,
}

impl Blob {
  pub fn new() -> Self {
    Self { inner: Bytes::new() }
  }

  pub fn from_bytes(bytes: Bytes) -> Self {
    Self { inner: bytes }
  }

  pub fn from_static(data: &'static [u8]) -> Self {
    Self {
      inner: Bytes::from_static(data),
    }
  }

  pub fn size(&self) -> usize {
    self.inner.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.is_empty()
  }

  pub fn to_bytes(&self) -> Bytes {
    self.inner.clone()
  }

  /// Printable form for logs and error messages: UTF-8 when possible, hex otherwise.
  pub fn display_lossy(&self) -> String {
    match std::str::from_utf8(&self.inner) {
      Ok(s) if s.chars().all(|c| !c.is_control()) => s.to_string(),
      _ => self.inner.iter().map(|b| format!("{:02x}", b)).collect(),
    }
  }
}

impl Deref for Blob {
  type Target = [u8];
  fn deref(&self) -> &Self::Target {
    &self.inner
  }
}

impl AsRef<[u8]> for Blob {
  fn as_ref(&self) -> &[u8] {
    &self.inner
  }
}

impl Borrow<[u8]> for Blob {
  fn borrow(&self) -> &[u8] {
    &self.inner
  }
}

impl From<Vec<u8>> for Blob {
  fn from(vec: Vec<u8>) -> Self {
    Self {
      inner: Bytes::from(vec),
    }
  }
}

impl From<&[u8]> for Blob {
  fn from(data: &[u8]) -> Self {
    Self {
      inner: Bytes::copy_from_slice(data),
    }
  }
}

impl From<Bytes> for Blob {
  fn from(bytes: Bytes) -> Self {
    Self { inner: bytes }
  }
}

impl fmt::Debug for Blob {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Blob({})", self.display_lossy())
  }
}
