// src/protocol/zmtp/command.rs

use crate::error::ZmqError;
use crate::message::{Frame, FrameFlags};
use bytes::{BufMut, Bytes, BytesMut};

pub const CMD_READY: &[u8] = b"READY";
pub const CMD_ERROR: &[u8] = b"ERROR";
pub const CMD_PING: &[u8] = b"PING";
pub const CMD_PONG: &[u8] = b"PONG";

pub const PROP_SOCKET_TYPE: &str = "Socket-Type";
pub const PROP_IDENTITY: &str = "Identity";

/// Metadata exchanged in READY.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadyProperties {
  pub socket_type: Option<String>,
  pub identity: Option<Bytes>,
  /// Properties we do not interpret, kept in arrival order.
  pub other: Vec<(String, Bytes)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZmtpCommand {
  Ready(ReadyProperties),
  Error(String),
  Ping { ttl: u16, context: Bytes },
  Pong(Bytes),
  Unknown(Bytes),
}

impl ZmtpCommand {
  /// Parses the body of a frame carrying the COMMAND flag.
  pub fn parse(frame: &Frame) -> Result<Self, ZmqError> {
    let body = frame.data();
    let name_len = *body
      .first()
      .ok_or_else(|| ZmqError::ProtocolViolation("empty command frame".into()))? as usize;
    if body.len() < 1 + name_len {
      return Err(ZmqError::ProtocolViolation("truncated command name".into()));
    }
    let name = &body[1..1 + name_len];
    let data = &body[1 + name_len..];
    let command = match name {
      CMD_READY => ZmtpCommand::Ready(parse_properties(data)?),
      CMD_ERROR => {
        let len = data.first().copied().unwrap_or(0) as usize;
        let reason = data.get(1..1 + len).unwrap_or(&[]);
        ZmtpCommand::Error(String::from_utf8_lossy(reason).into_owned())
      }
      CMD_PING => {
        if data.len() < 2 {
          return Err(ZmqError::ProtocolViolation("PING without TTL".into()));
        }
        ZmtpCommand::Ping {
          ttl: u16::from_be_bytes([data[0], data[1]]),
          context: Bytes::copy_from_slice(&data[2..]),
        }
      }
      CMD_PONG => ZmtpCommand::Pong(Bytes::copy_from_slice(data)),
      _ => ZmtpCommand::Unknown(Bytes::copy_from_slice(name)),
    };
    Ok(command)
  }

  pub fn ready(socket_type: &str, identity: Option<&[u8]>) -> Frame {
    let mut props = BytesMut::new();
    put_property(&mut props, PROP_SOCKET_TYPE, socket_type.as_bytes());
    if let Some(id) = identity {
      put_property(&mut props, PROP_IDENTITY, id);
    }
    command_frame(CMD_READY, &props)
  }

  pub fn error(reason: &str) -> Frame {
    let reason = &reason.as_bytes()[..reason.len().min(u8::MAX as usize)];
    let mut data = BytesMut::with_capacity(1 + reason.len());
    data.put_u8(reason.len() as u8);
    data.put_slice(reason);
    command_frame(CMD_ERROR, &data)
  }
}

fn command_frame(name: &[u8], data: &[u8]) -> Frame {
  let mut body = BytesMut::with_capacity(1 + name.len() + data.len());
  body.put_u8(name.len() as u8);
  body.put_slice(name);
  body.put_slice(data);
  let mut frame = Frame::new(body.freeze());
  frame.set_flags(FrameFlags::COMMAND);
  frame
}

fn put_property(buf: &mut BytesMut, name: &str, value: &[u8]) {
  buf.put_u8(name.len() as u8);
  buf.put_slice(name.as_bytes());
  buf.put_u32(value.len() as u32);
  buf.put_slice(value);
}

/// Property list: name-len (1 byte), name, value-len (4 bytes BE), value.
fn parse_properties(mut data: &[u8]) -> Result<ReadyProperties, ZmqError> {
  let truncated = || ZmqError::ProtocolViolation("truncated READY property".into());
  let mut props = ReadyProperties::default();
  while !data.is_empty() {
    let name_len = data[0] as usize;
    let name = data.get(1..1 + name_len).ok_or_else(truncated)?;
    let rest = &data[1 + name_len..];
    let len_bytes: [u8; 4] = rest.get(..4).ok_or_else(truncated)?.try_into().map_err(|_| truncated())?;
    let value_len = u32::from_be_bytes(len_bytes) as usize;
    let value = rest.get(4..4 + value_len).ok_or_else(truncated)?;
    let name = String::from_utf8_lossy(name).into_owned();
    // Property names are case-insensitive.
    if name.eq_ignore_ascii_case(PROP_SOCKET_TYPE) {
      props.socket_type = Some(String::from_utf8_lossy(value).into_owned());
    } else if name.eq_ignore_ascii_case(PROP_IDENTITY) {
      props.identity = (!value.is_empty()).then(|| Bytes::copy_from_slice(value));
    } else {
      props.other.push((name, Bytes::copy_from_slice(value)));
    }
    data = &rest[4 + value_len..];
  }
  Ok(props)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ready_round_trip() {
    let frame = ZmtpCommand::ready("DEALER", Some(&b"D1"[..]));
    assert!(frame.is_command());
    match ZmtpCommand::parse(&frame).unwrap() {
      ZmtpCommand::Ready(props) => {
        assert_eq!(props.socket_type.as_deref(), Some("DEALER"));
        assert_eq!(props.identity.as_deref(), Some(&b"D1"[..]));
        assert!(props.other.is_empty());
      }
      other => panic!("unexpected command {other:?}"),
    }
  }

  #[test]
  fn truncated_properties_are_a_violation() {
    let mut frame_bytes = ZmtpCommand::ready("PUB", None).data().to_vec();
    frame_bytes.truncate(frame_bytes.len() - 1);
    let mut frame = Frame::from(frame_bytes);
    frame.set_flags(FrameFlags::COMMAND);
    assert!(matches!(ZmtpCommand::parse(&frame), Err(ZmqError::ProtocolViolation(_))));
  }

  #[test]
  fn ping_carries_ttl_and_context() {
    let mut body = vec![4u8];
    body.extend_from_slice(b"PING");
    body.extend_from_slice(&[0, 10]);
    body.extend_from_slice(b"ctx");
    let frame = Frame::from(body);
    assert_eq!(
      ZmtpCommand::parse(&frame).unwrap(),
      ZmtpCommand::Ping {
        ttl: 10,
        context: Bytes::from_static(b"ctx")
      }
    );
  }
}
