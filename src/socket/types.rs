// src/socket/types.rs

use crate::error::ZmqError;
use std::fmt;

/// The type of a socket, defining its messaging pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
  /// **PAIR:** Exclusive connection to exactly one peer PAIR.
  Pair,
  /// **PUB (Publish):** Distributes messages to all subscribers whose subscriptions match the
  /// first frame. Never blocks; a subscriber at its HWM simply misses messages.
  Pub,
  /// **SUB (Subscribe):** Receives only messages matching one of its subscribed prefixes.
  Sub,
  /// **REQ (Request):** Strict send/receive alternation, load-balanced over peers.
  Req,
  /// **REP (Reply):** Strict receive/send alternation; replies go back to the requester.
  Rep,
  /// **DEALER:** Asynchronous request-reply. Round-robins outgoing messages and fair-queues
  /// incoming ones, without touching the envelope.
  Dealer,
  /// **ROUTER:** Prefixes incoming messages with the sender's identity and routes outgoing
  /// messages by their leading identity frame.
  Router,
  /// **PULL:** Fair-queues messages from PUSH peers.
  Pull,
  /// **PUSH:** Round-robins messages to PULL peers.
  Push,
  /// **XPUB:** A PUB that also hands subscription messages to the application.
  XPub,
  /// **XSUB:** A SUB whose subscriptions are sent as ordinary messages by the application.
  XSub,
  /// **STREAM:** Exchanges raw bytes with non-ZMTP TCP peers, addressed by identity frames.
  Stream,
}

impl SocketType {
  /// libzmq's numeric value for the type (`ZMQ_PAIR` = 0 ...).
  pub fn as_raw(self) -> i32 {
    match self {
      SocketType::Pair => 0,
      SocketType::Pub => 1,
      SocketType::Sub => 2,
      SocketType::Req => 3,
      SocketType::Rep => 4,
      SocketType::Dealer => 5,
      SocketType::Router => 6,
      SocketType::Pull => 7,
      SocketType::Push => 8,
      SocketType::XPub => 9,
      SocketType::XSub => 10,
      SocketType::Stream => 11,
    }
  }

  pub fn from_raw(value: i32) -> Result<Self, ZmqError> {
    Ok(match value {
      0 => SocketType::Pair,
      1 => SocketType::Pub,
      2 => SocketType::Sub,
      3 => SocketType::Req,
      4 => SocketType::Rep,
      5 => SocketType::Dealer,
      6 => SocketType::Router,
      7 => SocketType::Pull,
      8 => SocketType::Push,
      9 => SocketType::XPub,
      10 => SocketType::XSub,
      11 => SocketType::Stream,
      _ => return Err(ZmqError::InvalidMessage(format!("unknown socket type {}", value))),
    })
  }

  /// Name used in the ZMTP `Socket-Type` property.
  pub fn zmtp_name(self) -> &'static str {
    match self {
      SocketType::Pair => "PAIR",
      SocketType::Pub => "PUB",
      SocketType::Sub => "SUB",
      SocketType::Req => "REQ",
      SocketType::Rep => "REP",
      SocketType::Dealer => "DEALER",
      SocketType::Router => "ROUTER",
      SocketType::Pull => "PULL",
      SocketType::Push => "PUSH",
      SocketType::XPub => "XPUB",
      SocketType::XSub => "XSUB",
      SocketType::Stream => "STREAM",
    }
  }

  pub fn from_zmtp_name(name: &[u8]) -> Option<Self> {
    Some(match name {
      b"PAIR" => SocketType::Pair,
      b"PUB" => SocketType::Pub,
      b"SUB" => SocketType::Sub,
      b"REQ" => SocketType::Req,
      b"REP" => SocketType::Rep,
      b"DEALER" => SocketType::Dealer,
      b"ROUTER" => SocketType::Router,
      b"PULL" => SocketType::Pull,
      b"PUSH" => SocketType::Push,
      b"XPUB" => SocketType::XPub,
      b"XSUB" => SocketType::XSub,
      b"STREAM" => SocketType::Stream,
      _ => return None,
    })
  }

  /// Whether a peer of type `peer` may be connected to a socket of this type (ZMTP RFC 23/28/29/30).
  pub fn is_compatible(self, peer: SocketType) -> bool {
    use SocketType::*;
    matches!(
      (self, peer),
      (Pair, Pair)
        | (Pub, Sub)
        | (Pub, XSub)
        | (XPub, Sub)
        | (XPub, XSub)
        | (Sub, Pub)
        | (Sub, XPub)
        | (XSub, Pub)
        | (XSub, XPub)
        | (Req, Rep)
        | (Req, Router)
        | (Rep, Req)
        | (Rep, Dealer)
        | (Dealer, Rep)
        | (Dealer, Dealer)
        | (Dealer, Router)
        | (Router, Req)
        | (Router, Dealer)
        | (Router, Router)
        | (Push, Pull)
        | (Pull, Push)
    )
  }

  /// Whether the type keeps a subscription set.
  pub fn is_subscriber(self) -> bool {
    matches!(self, SocketType::Sub | SocketType::XSub)
  }

  /// Router-like types need the peer's identity before a pipe can be routed to.
  pub(crate) fn routes_by_identity(self) -> bool {
    matches!(self, SocketType::Router | SocketType::Stream)
  }
}

impl fmt::Display for SocketType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.zmtp_name())
  }
}
