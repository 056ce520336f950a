// src/protocol/zmtp/greeting.rs

use crate::error::ZmqError;
use bytes::{BufMut, BytesMut};

pub const GREETING_LENGTH: usize = 64;
pub const MECHANISM_LENGTH: usize = 20;

pub const VERSION_MAJOR: u8 = 3;
pub const VERSION_MINOR: u8 = 0;

const SIGNATURE_END_OFFSET: usize = 9;
const VERSION_MAJOR_OFFSET: usize = 10;
const VERSION_MINOR_OFFSET: usize = 11;
const MECHANISM_OFFSET: usize = 12;
const AS_SERVER_OFFSET: usize = MECHANISM_OFFSET + MECHANISM_LENGTH;

/// The only security mechanism the engine negotiates.
pub const NULL_MECHANISM: &str = "NULL";

/// The fixed 64-byte preamble both sides send before any frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZmtpGreeting {
  pub version: (u8, u8),
  pub mechanism: [u8; MECHANISM_LENGTH],
  pub as_server: bool,
}

impl ZmtpGreeting {
  pub fn null(as_server: bool) -> Self {
    let mut mechanism = [0u8; MECHANISM_LENGTH];
    mechanism[..NULL_MECHANISM.len()].copy_from_slice(NULL_MECHANISM.as_bytes());
    Self {
      version: (VERSION_MAJOR, VERSION_MINOR),
      mechanism,
      as_server,
    }
  }

  pub fn encode(&self, buffer: &mut BytesMut) {
    buffer.reserve(GREETING_LENGTH);
    buffer.put_u8(0xFF);
    buffer.put_bytes(0, 8);
    buffer.put_u8(0x7F);
    buffer.put_u8(self.version.0);
    buffer.put_u8(self.version.1);
    buffer.put_slice(&self.mechanism);
    buffer.put_u8(self.as_server as u8);
    buffer.put_bytes(0, GREETING_LENGTH - AS_SERVER_OFFSET - 1);
  }

  /// Parses a complete greeting. Peers older than ZMTP 3.0 are refused.
  pub fn decode(data: &[u8; GREETING_LENGTH]) -> Result<Self, ZmqError> {
    if data[0] != 0xFF || data[SIGNATURE_END_OFFSET] != 0x7F {
      return Err(ZmqError::ProtocolViolation("invalid greeting signature".into()));
    }
    let version = (data[VERSION_MAJOR_OFFSET], data[VERSION_MINOR_OFFSET]);
    if version.0 < VERSION_MAJOR {
      return Err(ZmqError::ProtocolViolation(format!(
        "unsupported ZMTP version {}.{}",
        version.0, version.1
      )));
    }
    let mut mechanism = [0u8; MECHANISM_LENGTH];
    mechanism.copy_from_slice(&data[MECHANISM_OFFSET..MECHANISM_OFFSET + MECHANISM_LENGTH]);
    let as_server = match data[AS_SERVER_OFFSET] {
      0 => false,
      1 => true,
      other => {
        return Err(ZmqError::ProtocolViolation(format!("invalid as-server flag {other:#04x}")));
      }
    };
    Ok(Self {
      version,
      mechanism,
      as_server,
    })
  }

  pub fn mechanism_name(&self) -> &str {
    let end = self.mechanism.iter().position(|&b| b == 0).unwrap_or(MECHANISM_LENGTH);
    std::str::from_utf8(&self.mechanism[..end]).unwrap_or("<invalid>")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn null_greeting_layout() {
    let mut buf = BytesMut::new();
    ZmtpGreeting::null(true).encode(&mut buf);
    assert_eq!(buf.len(), GREETING_LENGTH);
    assert_eq!(buf[0], 0xFF);
    assert_eq!(buf[9], 0x7F);
    assert_eq!(&buf[12..16], b"NULL");
    assert_eq!(buf[32], 1);

    let raw: [u8; GREETING_LENGTH] = buf[..].try_into().unwrap();
    let parsed = ZmtpGreeting::decode(&raw).unwrap();
    assert_eq!(parsed.mechanism_name(), "NULL");
    assert!(parsed.as_server);
  }

  #[test]
  fn old_versions_are_refused() {
    let mut buf = BytesMut::new();
    ZmtpGreeting::null(false).encode(&mut buf);
    buf[10] = 2;
    let raw: [u8; GREETING_LENGTH] = buf[..].try_into().unwrap();
    assert!(matches!(ZmtpGreeting::decode(&raw), Err(ZmqError::ProtocolViolation(_))));
  }
}
