// src/security/mod.rs

//! Secure-channel key material handling.
//!
//! Only the transport of CURVE keys through socket options lives here; key generation and the
//! CURVE handshake itself are not part of this crate.

pub mod z85;

use crate::error::ZmqError;

pub const CURVE_KEY_LEN: usize = 32;
pub const CURVE_KEY_Z85_LEN: usize = 40;

/// Accepts a CURVE key as 32 raw bytes or as its 40-character Z85 text form.
pub fn parse_curve_key(value: &[u8]) -> Result<[u8; CURVE_KEY_LEN], ZmqError> {
  match value.len() {
    CURVE_KEY_LEN => {
      let mut key = [0u8; CURVE_KEY_LEN];
      key.copy_from_slice(value);
      Ok(key)
    }
    CURVE_KEY_Z85_LEN => {
      let text = std::str::from_utf8(value).map_err(|_| ZmqError::InvalidKeySize(value.len()))?;
      let decoded = z85::decode(text)?;
      let mut key = [0u8; CURVE_KEY_LEN];
      key.copy_from_slice(&decoded);
      Ok(key)
    }
    other => Err(ZmqError::InvalidKeySize(other)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn raw_and_text_forms_agree() {
    let raw = [0xA5u8; 32];
    let text = z85::encode(&raw).unwrap();
    assert_eq!(parse_curve_key(&raw).unwrap(), raw);
    assert_eq!(parse_curve_key(text.as_bytes()).unwrap(), raw);
  }

  #[test]
  fn other_lengths_are_invalid_key_size() {
    assert!(matches!(parse_curve_key(&[0u8; 31]), Err(ZmqError::InvalidKeySize(31))));
    assert!(matches!(parse_curve_key(&[]), Err(ZmqError::InvalidKeySize(0))));
  }
}
