// src/message/multipart.rs

use crate::message::frame::Frame;
use bytes::Bytes;

/// One logical message: an ordered run of one or more frames delivered all-or-nothing.
///
/// On the wire every frame but the last carries the MORE flag. Sockets normalize the flags
/// when a message is sent, so callers never have to set them by hand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
  frames: Vec<Frame>,
}

impl Message {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_frames(frames: Vec<Frame>) -> Self {
    Self { frames }
  }

  /// Appends a frame, returning `self` for chaining.
  pub fn with(mut self, frame: impl Into<Frame>) -> Self {
    self.frames.push(frame.into());
    self
  }

  pub fn push(&mut self, frame: impl Into<Frame>) {
    self.frames.push(frame.into());
  }

  pub fn push_front(&mut self, frame: impl Into<Frame>) {
    self.frames.insert(0, frame.into());
  }

  pub fn pop_front(&mut self) -> Option<Frame> {
    if self.frames.is_empty() {
      None
    } else {
      Some(self.frames.remove(0))
    }
  }

  pub fn frames(&self) -> &[Frame] {
    &self.frames
  }

  pub fn into_frames(self) -> Vec<Frame> {
    self.frames
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&Frame> {
    self.frames.get(index)
  }

  pub fn first(&self) -> Option<&Frame> {
    self.frames.first()
  }

  pub fn last(&self) -> Option<&Frame> {
    self.frames.last()
  }

  /// Total payload bytes across all frames.
  pub fn byte_len(&self) -> usize {
    self.frames.iter().map(Frame::size).sum()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
    self.frames.iter()
  }

  /// Frame payloads as owned byte vectors, mostly useful in tests and logs.
  pub fn to_vecs(&self) -> Vec<Vec<u8>> {
    self.frames.iter().map(|f| f.data().to_vec()).collect()
  }
}

/// Sets MORE on every frame except the last.
pub(crate) fn normalize_more(frames: &mut [Frame]) {
  let last = frames.len().saturating_sub(1);
  for (i, frame) in frames.iter_mut().enumerate() {
    frame.set_more(i < last);
  }
}

impl IntoIterator for Message {
  type Item = Frame;
  type IntoIter = std::vec::IntoIter<Frame>;

  fn into_iter(self) -> Self::IntoIter {
    self.frames.into_iter()
  }
}

impl<'a> IntoIterator for &'a Message {
  type Item = &'a Frame;
  type IntoIter = std::slice::Iter<'a, Frame>;

  fn into_iter(self) -> Self::IntoIter {
    self.frames.iter()
  }
}

impl From<Vec<Frame>> for Message {
  fn from(frames: Vec<Frame>) -> Self {
    Self { frames }
  }
}

impl From<Frame> for Message {
  fn from(frame: Frame) -> Self {
    Self { frames: vec![frame] }
  }
}

impl From<&'static str> for Message {
  fn from(s: &'static str) -> Self {
    Frame::from(s).into()
  }
}

impl From<String> for Message {
  fn from(s: String) -> Self {
    Frame::from(s).into()
  }
}

impl From<Vec<u8>> for Message {
  fn from(v: Vec<u8>) -> Self {
    Frame::from(v).into()
  }
}

impl From<Bytes> for Message {
  fn from(b: Bytes) -> Self {
    Frame::from(b).into()
  }
}

impl From<Vec<&'static str>> for Message {
  fn from(parts: Vec<&'static str>) -> Self {
    parts.into_iter().map(Frame::from).collect()
  }
}

impl From<Vec<Vec<u8>>> for Message {
  fn from(parts: Vec<Vec<u8>>) -> Self {
    parts.into_iter().map(Frame::from).collect()
  }
}

impl FromIterator<Frame> for Message {
  fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
    Self {
      frames: iter.into_iter().collect(),
    }
  }
}
