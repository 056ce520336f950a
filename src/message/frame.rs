// src/message/frame.rs

use crate::message::flags::FrameFlags;
use bytes::Bytes;
use std::fmt;

/// A single message part.
///
/// The payload is a reference-counted [`Bytes`], so cloning a frame (for a capture tap or a
/// PUB fan-out) never copies data. The size is fixed once the frame exists.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Frame {
  data: Bytes,
  flags: FrameFlags,
}

impl Frame {
  pub fn new(data: impl Into<Bytes>) -> Self {
    Self {
      data: data.into(),
      flags: FrameFlags::empty(),
    }
  }

  /// A zero-length frame, e.g. the REQ/REP envelope delimiter.
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn from_vec(data: Vec<u8>) -> Self {
    Self::new(data)
  }

  pub fn from_static(data: &'static [u8]) -> Self {
    Self::new(Bytes::from_static(data))
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// Returns the payload handle; cloning `Bytes` is cheap.
  pub fn data_bytes(&self) -> Bytes {
    self.data.clone()
  }

  pub fn into_bytes(self) -> Bytes {
    self.data
  }

  pub fn size(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn flags(&self) -> FrameFlags {
    self.flags
  }

  pub fn set_flags(&mut self, flags: FrameFlags) {
    self.flags = flags;
  }

  pub fn is_more(&self) -> bool {
    self.flags.contains(FrameFlags::MORE)
  }

  pub fn set_more(&mut self, more: bool) {
    self.flags.set(FrameFlags::MORE, more);
  }

  pub fn is_command(&self) -> bool {
    self.flags.contains(FrameFlags::COMMAND)
  }

  pub(crate) fn with_flags(mut self, flags: FrameFlags) -> Self {
    self.flags = flags;
    self
  }
}

impl fmt::Debug for Frame {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Frame")
      .field("size", &self.size())
      .field("flags", &self.flags)
      .finish()
  }
}

impl From<&'static str> for Frame {
  fn from(s: &'static str) -> Self {
    Frame::from_static(s.as_bytes())
  }
}

impl From<String> for Frame {
  fn from(s: String) -> Self {
    Frame::new(s.into_bytes())
  }
}

impl From<Vec<u8>> for Frame {
  fn from(v: Vec<u8>) -> Self {
    Frame::from_vec(v)
  }
}

impl From<&[u8]> for Frame {
  fn from(v: &[u8]) -> Self {
    Frame::new(Bytes::copy_from_slice(v))
  }
}

impl From<Bytes> for Frame {
  fn from(b: Bytes) -> Self {
    Frame::new(b)
  }
}
