// src/message/typed.rs

//! Typed envelope: a two-frame convention where the first frame names the payload type and the
//! second carries the packed value.
//!
//! Peers that do not use this layer simply see two ordinary frames. In process the tag is a
//! checked [`TypeTag`]; the string form only exists on the wire.

use crate::error::ZmqError;
use crate::message::{Frame, Message};
use bytes::Bytes;
use std::fmt;

/// Discriminator for the payload carried by a [`TypedMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
  Str,
  Bytes,
  Bool,
  I8,
  I16,
  I32,
  I64,
  U8,
  U16,
  U32,
  U64,
  F32,
  F64,
  /// Application-defined payload type.
  Custom(String),
}

impl TypeTag {
  pub fn as_str(&self) -> &str {
    match self {
      TypeTag::Str => "String",
      TypeTag::Bytes => "Bytes",
      TypeTag::Bool => "bool",
      TypeTag::I8 => "i8",
      TypeTag::I16 => "i16",
      TypeTag::I32 => "i32",
      TypeTag::I64 => "i64",
      TypeTag::U8 => "u8",
      TypeTag::U16 => "u16",
      TypeTag::U32 => "u32",
      TypeTag::U64 => "u64",
      TypeTag::F32 => "f32",
      TypeTag::F64 => "f64",
      TypeTag::Custom(name) => name,
    }
  }

  pub fn parse(name: &str) -> Self {
    match name {
      "String" => TypeTag::Str,
      "Bytes" => TypeTag::Bytes,
      "bool" => TypeTag::Bool,
      "i8" => TypeTag::I8,
      "i16" => TypeTag::I16,
      "i32" => TypeTag::I32,
      "i64" => TypeTag::I64,
      "u8" => TypeTag::U8,
      "u16" => TypeTag::U16,
      "u32" => TypeTag::U32,
      "u64" => TypeTag::U64,
      "f32" => TypeTag::F32,
      "f64" => TypeTag::F64,
      other => TypeTag::Custom(other.to_string()),
    }
  }
}

impl fmt::Display for TypeTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A value that can travel inside a [`TypedMessage`].
pub trait Streamable: Sized {
  fn tag() -> TypeTag;
  fn pack(&self) -> Bytes;
  fn unpack(data: &[u8]) -> Result<Self, ZmqError>;
}

fn wrong_width<T>(data: &[u8]) -> ZmqError {
  ZmqError::InvalidMessage(format!(
    "payload of {} bytes cannot hold a {}",
    data.len(),
    std::any::type_name::<T>()
  ))
}

macro_rules! numeric_streamable {
  ($($ty:ty => $tag:ident),* $(,)?) => {
    $(
      impl Streamable for $ty {
        fn tag() -> TypeTag {
          TypeTag::$tag
        }

        fn pack(&self) -> Bytes {
          Bytes::copy_from_slice(&self.to_le_bytes())
        }

        fn unpack(data: &[u8]) -> Result<Self, ZmqError> {
          let raw = data.try_into().map_err(|_| wrong_width::<$ty>(data))?;
          Ok(<$ty>::from_le_bytes(raw))
        }
      }
    )*
  };
}

numeric_streamable! {
  i8 => I8, i16 => I16, i32 => I32, i64 => I64,
  u8 => U8, u16 => U16, u32 => U32, u64 => U64,
  f32 => F32, f64 => F64,
}

impl Streamable for bool {
  fn tag() -> TypeTag {
    TypeTag::Bool
  }

  fn pack(&self) -> Bytes {
    Bytes::copy_from_slice(&[u8::from(*self)])
  }

  fn unpack(data: &[u8]) -> Result<Self, ZmqError> {
    match data {
      [0] => Ok(false),
      [1] => Ok(true),
      _ => Err(wrong_width::<bool>(data)),
    }
  }
}

impl Streamable for String {
  fn tag() -> TypeTag {
    TypeTag::Str
  }

  fn pack(&self) -> Bytes {
    Bytes::copy_from_slice(self.as_bytes())
  }

  fn unpack(data: &[u8]) -> Result<Self, ZmqError> {
    String::from_utf8(data.to_vec()).map_err(|e| ZmqError::InvalidMessage(e.to_string()))
  }
}

impl Streamable for Vec<u8> {
  fn tag() -> TypeTag {
    TypeTag::Bytes
  }

  fn pack(&self) -> Bytes {
    Bytes::copy_from_slice(self)
  }

  fn unpack(data: &[u8]) -> Result<Self, ZmqError> {
    Ok(data.to_vec())
  }
}

/// A type tag plus its packed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedMessage {
  tag: TypeTag,
  payload: Bytes,
}

impl TypedMessage {
  pub fn new<T: Streamable>(value: &T) -> Self {
    Self {
      tag: T::tag(),
      payload: value.pack(),
    }
  }

  /// Wraps an already packed payload under an explicit tag.
  pub fn from_parts(tag: TypeTag, payload: impl Into<Bytes>) -> Self {
    Self {
      tag,
      payload: payload.into(),
    }
  }

  pub fn tag(&self) -> &TypeTag {
    &self.tag
  }

  pub fn payload(&self) -> &[u8] {
    &self.payload
  }

  pub fn has_type<T: Streamable>(&self) -> bool {
    self.tag == T::tag()
  }

  /// Unpacks the payload, failing with `BadType` when the tag names another type.
  pub fn value<T: Streamable>(&self) -> Result<T, ZmqError> {
    let expected = T::tag();
    if self.tag != expected {
      return Err(ZmqError::BadType {
        expected: expected.to_string(),
        found: self.tag.to_string(),
      });
    }
    T::unpack(&self.payload)
  }

  pub fn into_message(self) -> Message {
    Message::new()
      .with(Frame::new(Bytes::copy_from_slice(self.tag.as_str().as_bytes())))
      .with(Frame::new(self.payload))
  }
}

impl From<TypedMessage> for Message {
  fn from(typed: TypedMessage) -> Self {
    typed.into_message()
  }
}

impl TryFrom<Message> for TypedMessage {
  type Error = ZmqError;

  fn try_from(msg: Message) -> Result<Self, Self::Error> {
    if msg.len() != 2 {
      return Err(ZmqError::InvalidMessage(format!(
        "typed envelope needs 2 frames, got {}",
        msg.len()
      )));
    }
    let mut frames = msg.into_frames().into_iter();
    let (tag_frame, payload) = match (frames.next(), frames.next()) {
      (Some(t), Some(p)) => (t, p),
      _ => return Err(ZmqError::Internal("typed envelope frame count changed".into())),
    };
    let tag = std::str::from_utf8(tag_frame.data())
      .map_err(|_| ZmqError::InvalidMessage("type tag is not UTF-8".into()))?;
    Ok(Self {
      tag: TypeTag::parse(tag),
      payload: payload.into_bytes(),
    })
  }
}
