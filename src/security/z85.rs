// src/security/z85.rs

//! Z85 (ZeroMQ RFC 32) text encoding: every 4 bytes become 5 printable characters.

use crate::error::ZmqError;

const ALPHABET: &[u8; 85] =
  b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ.-:+=^!/*?&<>()[]{}@%$#";

const INVALID: u8 = 0xFF;

const fn decode_table() -> [u8; 256] {
  let mut table = [INVALID; 256];
  let mut i = 0;
  while i < ALPHABET.len() {
    table[ALPHABET[i] as usize] = i as u8;
    i += 1;
  }
  table
}

static DECODE: [u8; 256] = decode_table();

/// Encodes `data`, whose length must be a multiple of 4.
pub fn encode(data: &[u8]) -> Result<String, ZmqError> {
  if data.len() % 4 != 0 {
    return Err(ZmqError::InvalidMessage(format!(
      "Z85 input length {} is not a multiple of 4",
      data.len()
    )));
  }
  let mut out = String::with_capacity(data.len() / 4 * 5);
  for chunk in data.chunks_exact(4) {
    let mut value = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    let mut block = [0u8; 5];
    for slot in block.iter_mut().rev() {
      *slot = ALPHABET[(value % 85) as usize];
      value /= 85;
    }
    // Every alphabet byte is ASCII.
    out.extend(block.iter().map(|&b| b as char));
  }
  Ok(out)
}

/// Decodes `text`, whose length must be a multiple of 5.
pub fn decode(text: &str) -> Result<Vec<u8>, ZmqError> {
  let raw = text.as_bytes();
  if raw.len() % 5 != 0 {
    return Err(ZmqError::InvalidMessage(format!(
      "Z85 input length {} is not a multiple of 5",
      raw.len()
    )));
  }
  let mut out = Vec::with_capacity(raw.len() / 5 * 4);
  for chunk in raw.chunks_exact(5) {
    let mut value: u64 = 0;
    for &c in chunk {
      let digit = DECODE[c as usize];
      if digit == INVALID {
        return Err(ZmqError::InvalidMessage(format!("invalid Z85 character {:?}", c as char)));
      }
      value = value * 85 + u64::from(digit);
    }
    let value = u32::try_from(value)
      .map_err(|_| ZmqError::InvalidMessage("Z85 block overflows 32 bits".into()))?;
    out.extend_from_slice(&value.to_be_bytes());
  }
  Ok(out)
}
