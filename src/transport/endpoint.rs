// src/transport/endpoint.rs

use crate::error::ZmqError;
use std::path::PathBuf;

/// A parsed `scheme://address` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Endpoint {
  /// `host` may be `*` (all interfaces); port 0 asks for an ephemeral port.
  Tcp { host: String, port: u16 },
  /// `*` asks for a generated path.
  Ipc(PathBuf),
  Inproc(String),
}

pub(crate) fn parse_endpoint(uri: &str) -> Result<Endpoint, ZmqError> {
  let invalid = || ZmqError::InvalidEndpoint(uri.to_string());
  let (scheme, address) = uri.split_once("://").ok_or_else(invalid)?;
  if address.is_empty() || address.contains('\0') {
    return Err(invalid());
  }

  match scheme {
    "tcp" => {
      let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
      let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
      if host.is_empty() {
        return Err(invalid());
      }
      let port = match port {
        "*" | "0" => 0,
        digits => digits.parse::<u16>().map_err(|_| invalid())?,
      };
      Ok(Endpoint::Tcp {
        host: host.to_string(),
        port,
      })
    }
    "ipc" => Ok(Endpoint::Ipc(PathBuf::from(address))),
    "inproc" => Ok(Endpoint::Inproc(address.to_string())),
    _ => Err(ZmqError::UnsupportedTransport(uri.to_string())),
  }
}
