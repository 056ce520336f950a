// src/protocol/zmtp/codec.rs

use crate::error::{codes, ZmqError};
use crate::message::{Frame, FrameFlags};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

pub const FLAG_MORE: u8 = 0b0000_0001;
pub const FLAG_LONG: u8 = 0b0000_0010;
pub const FLAG_COMMAND: u8 = 0b0000_0100;

/// Upper bound on what a partially received body reserves at once. The announced size is
/// untrusted until the bytes actually arrive.
const MAX_BODY_RESERVE: usize = 64 * 1024;

/// ZMTP 3.0 frame codec. Frames up to 255 bytes use the short form, larger ones the 8-byte
/// length form.
#[derive(Debug, Default)]
pub struct ZmtpCodec {
  state: DecodeState,
  /// Largest accepted inbound frame, `None` for no limit.
  max_frame_size: Option<usize>,
}

#[derive(Debug, Default, Clone, Copy)]
enum DecodeState {
  #[default]
  Header,
  Body {
    flags: u8,
    size: usize,
  },
}

impl ZmtpCodec {
  pub fn new() -> Self {
    Self::default()
  }

  /// Applies MAXMSGSIZE semantics: negative means unlimited.
  pub fn with_max_frame_size(max: i64) -> Self {
    Self {
      state: DecodeState::Header,
      max_frame_size: usize::try_from(max).ok(),
    }
  }
}

impl Encoder<Frame> for ZmtpCodec {
  type Error = ZmqError;

  fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
    let data = item.data();
    let mut flags = 0u8;
    if item.flags().contains(FrameFlags::MORE) {
      flags |= FLAG_MORE;
    }
    if item.flags().contains(FrameFlags::COMMAND) {
      flags |= FLAG_COMMAND;
    }
    if data.len() <= u8::MAX as usize {
      dst.reserve(2 + data.len());
      dst.put_u8(flags);
      dst.put_u8(data.len() as u8);
    } else {
      dst.reserve(9 + data.len());
      dst.put_u8(flags | FLAG_LONG);
      dst.put_u64(data.len() as u64);
    }
    dst.put_slice(data);
    Ok(())
  }
}

impl Decoder for ZmtpCodec {
  type Item = Frame;
  type Error = ZmqError;

  fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
    loop {
      match self.state {
        DecodeState::Header => {
          let Some(&flags) = src.first() else {
            return Ok(None);
          };
          if flags & !(FLAG_MORE | FLAG_LONG | FLAG_COMMAND) != 0 {
            return Err(ZmqError::ProtocolViolation(format!("reserved frame flag bits set: {flags:#04x}")));
          }
          let header_len = if flags & FLAG_LONG != 0 { 9 } else { 2 };
          if src.len() < header_len {
            src.reserve(header_len - src.len());
            return Ok(None);
          }
          let mut header = src.split_to(header_len);
          header.advance(1);
          let size = if header_len == 9 {
            let announced = header.get_u64();
            match usize::try_from(announced) {
              Ok(size) if size <= isize::MAX as usize => size,
              _ => {
                return Err(ZmqError::ProtocolViolation(format!(
                  "frame length {announced} is not addressable"
                )))
              }
            }
          } else {
            usize::from(header.get_u8())
          };
          if let Some(max) = self.max_frame_size {
            if size > max && flags & FLAG_COMMAND == 0 {
              return Err(ZmqError::engine(
                codes::EMSGSIZE,
                format!("inbound frame of {size} bytes exceeds MAXMSGSIZE {max}"),
              ));
            }
          }
          self.state = DecodeState::Body { flags, size };
        }
        DecodeState::Body { flags, size } => {
          if src.len() < size {
            src.reserve((size - src.len()).min(MAX_BODY_RESERVE));
            return Ok(None);
          }
          let body = src.split_to(size).freeze();
          self.state = DecodeState::Header;
          let mut frame_flags = FrameFlags::empty();
          if flags & FLAG_MORE != 0 {
            frame_flags |= FrameFlags::MORE;
          }
          if flags & FLAG_COMMAND != 0 {
            frame_flags |= FrameFlags::COMMAND;
          }
          let mut frame = Frame::new(body);
          frame.set_flags(frame_flags);
          return Ok(Some(frame));
        }
      }
    }
  }
}
