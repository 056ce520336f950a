// src/error.rs

use std::io;
use thiserror::Error;

/// errno-style codes reported by [`ZmqError::code`].
///
/// The values follow Linux numbering, with the ZeroMQ-specific ones taken from libzmq's
/// `ZMQ_HAUSNUMERO` range so that callers porting code can keep their existing checks.
pub mod codes {
  pub const ENOENT: i32 = 2;
  pub const EIO: i32 = 5;
  pub const EAGAIN: i32 = 11;
  pub const EACCES: i32 = 13;
  pub const EFAULT: i32 = 14;
  pub const EINVAL: i32 = 22;
  pub const EMFILE: i32 = 24;
  pub const EMSGSIZE: i32 = 90;
  pub const EPROTO: i32 = 71;
  pub const EPROTONOSUPPORT: i32 = 93;
  pub const ENOTSUP: i32 = 95;
  pub const EADDRINUSE: i32 = 98;
  pub const EADDRNOTAVAIL: i32 = 99;
  pub const ENETUNREACH: i32 = 101;
  pub const ECONNRESET: i32 = 104;
  pub const ENOTSOCK: i32 = 88;
  pub const ETIMEDOUT: i32 = 110;
  pub const ECONNREFUSED: i32 = 111;
  pub const EHOSTUNREACH: i32 = 113;

  const HAUSNUMERO: i32 = 156_384_712;
  pub const EFSM: i32 = HAUSNUMERO + 51;
  pub const ETERM: i32 = HAUSNUMERO + 53;
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ZmqError {
  // --- Configuration errors ---
  #[error("Context is closed or was never initialized")]
  InvalidContext,
  #[error("Invalid identity size {0}: identities must be 1..=255 bytes")]
  InvalidIdentitySize(usize),
  #[error("Invalid key size {0}: expected 32 raw bytes or 40 Z85 characters")]
  InvalidKeySize(usize),
  #[error("Too many sockets: context limit of {0} reached")]
  TooManySockets(usize),

  // --- Engine errors ---
  #[error("Engine error {code}: {description}")]
  Engine { code: i32, description: String },
  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  // --- Flow control ---
  #[error("Operation would block")]
  WouldBlock,
  #[error("Operation timed out")]
  Timeout,

  // --- Connection/Binding Errors ---
  #[error("Address already in use: {0}")]
  AddrInUse(String),
  #[error("Address not available: {0}")]
  AddrNotAvailable(String),
  #[error("Connection refused by peer: {0}")]
  ConnectionRefused(String),
  #[error("Host is unreachable: {0}")]
  HostUnreachable(String),
  #[error("Connection closed by peer or transport")]
  ConnectionClosed,
  #[error("Permission denied for endpoint: {0}")]
  PermissionDenied(String),

  // --- Endpoint Errors ---
  #[error("Invalid endpoint format: {0}")]
  InvalidEndpoint(String),
  #[error("Endpoint not bound or connected on this socket: {0}")]
  EndpointNotFound(String),
  #[error("Transport scheme not supported or enabled: {0}")]
  UnsupportedTransport(String),

  // --- Option Errors ---
  #[error("Invalid socket option ID: {0}")]
  InvalidOption(i32),
  #[error("Invalid value provided for option ID {0}")]
  InvalidOptionValue(i32),

  // --- State Errors ---
  #[error("Operation not supported by this socket type: {0}")]
  UnsupportedOperation(&'static str),
  #[error("Operation is invalid for the current socket state: {0}")]
  InvalidState(&'static str),
  #[error("Socket is closed")]
  SocketClosed,

  // --- Protocol Errors ---
  #[error("Multipart message was interrupted before its last frame")]
  Incomplete,
  #[error("Message is unroutable: no connected peer with identity {0}")]
  Unroutable(String),
  #[error("Typed envelope mismatch: expected '{expected}', found '{found}'")]
  BadType { expected: String, found: String },
  #[error("ZMTP protocol violation: {0}")]
  ProtocolViolation(String),
  #[error("Invalid message format for operation: {0}")]
  InvalidMessage(String),

  // --- Internal Errors ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

impl ZmqError {
  pub fn from_io_endpoint(e: io::Error, endpoint: &str) -> Self {
    match e.kind() {
      io::ErrorKind::AddrInUse => ZmqError::AddrInUse(endpoint.to_string()),
      io::ErrorKind::AddrNotAvailable => ZmqError::AddrNotAvailable(endpoint.to_string()),
      io::ErrorKind::ConnectionRefused => ZmqError::ConnectionRefused(endpoint.to_string()),
      io::ErrorKind::PermissionDenied => ZmqError::PermissionDenied(endpoint.to_string()),
      io::ErrorKind::TimedOut => ZmqError::Timeout,
      io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => ZmqError::ConnectionClosed,
      _ => ZmqError::Io(e),
    }
  }

  /// Builds an [`ZmqError::Engine`] from an errno-style code.
  pub fn engine(code: i32, description: impl Into<String>) -> Self {
    ZmqError::Engine {
      code,
      description: description.into(),
    }
  }

  /// The errno-style number for this error, as libzmq's `zmq_errno()` would report it.
  pub fn code(&self) -> i32 {
    use codes::*;
    match self {
      ZmqError::InvalidContext => ETERM,
      ZmqError::InvalidIdentitySize(_) | ZmqError::InvalidKeySize(_) => EINVAL,
      ZmqError::TooManySockets(_) => EMFILE,
      ZmqError::Engine { code, .. } => *code,
      ZmqError::Io(e) => e.raw_os_error().unwrap_or(EIO),
      ZmqError::WouldBlock | ZmqError::Timeout => EAGAIN,
      ZmqError::AddrInUse(_) => EADDRINUSE,
      ZmqError::AddrNotAvailable(_) => EADDRNOTAVAIL,
      ZmqError::ConnectionRefused(_) => ECONNREFUSED,
      ZmqError::HostUnreachable(_) | ZmqError::Unroutable(_) => EHOSTUNREACH,
      ZmqError::ConnectionClosed => ECONNRESET,
      ZmqError::PermissionDenied(_) => EACCES,
      ZmqError::InvalidEndpoint(_) => EINVAL,
      ZmqError::EndpointNotFound(_) => ENOENT,
      ZmqError::UnsupportedTransport(_) => EPROTONOSUPPORT,
      ZmqError::InvalidOption(_) | ZmqError::InvalidOptionValue(_) => EINVAL,
      ZmqError::UnsupportedOperation(_) => ENOTSUP,
      ZmqError::InvalidState(_) => EFSM,
      ZmqError::SocketClosed => ENOTSOCK,
      ZmqError::Incomplete | ZmqError::ProtocolViolation(_) => EPROTO,
      ZmqError::BadType { .. } | ZmqError::InvalidMessage(_) => EINVAL,
      ZmqError::Internal(_) => EFAULT,
    }
  }

  /// True for the flow-control outcomes a caller may simply retry later.
  pub fn is_would_block(&self) -> bool {
    matches!(self, ZmqError::WouldBlock | ZmqError::Timeout)
  }
}
