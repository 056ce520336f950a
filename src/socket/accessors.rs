// src/socket/accessors.rs

//! Typed getters and setters over the raw option surface.

use super::options::{self, parse_bool_option, parse_i32_option, parse_i64_option};
use super::Socket;
use crate::error::ZmqError;

/// `i32` options: `$get` reads, `$set` writes.
macro_rules! int_options {
  ($( $(#[$doc:meta])* $get:ident, $set:ident => $id:path; )*) => {
    impl Socket {
      $(
        $(#[$doc])*
        pub fn $get(&self) -> Result<i32, ZmqError> {
          parse_i32_option(&self.get_option_raw($id)?, $id)
        }

        $(#[$doc])*
        pub fn $set(&self, value: i32) -> Result<(), ZmqError> {
          self.set_option_raw($id, &value.to_ne_bytes())
        }
      )*
    }
  };
}

macro_rules! bool_options {
  ($( $(#[$doc:meta])* $get:ident, $set:ident => $id:path; )*) => {
    impl Socket {
      $(
        $(#[$doc])*
        pub fn $get(&self) -> Result<bool, ZmqError> {
          parse_bool_option(&self.get_option_raw($id)?, $id)
        }

        $(#[$doc])*
        pub fn $set(&self, value: bool) -> Result<(), ZmqError> {
          self.set_option_raw($id, &i32::from(value).to_ne_bytes())
        }
      )*
    }
  };
}

macro_rules! string_options {
  ($( $(#[$doc:meta])* $get:ident, $set:ident => $id:path; )*) => {
    impl Socket {
      $(
        $(#[$doc])*
        pub fn $get(&self) -> Result<String, ZmqError> {
          let raw = self.get_option_raw($id)?;
          String::from_utf8(raw).map_err(|_| ZmqError::InvalidOptionValue($id))
        }

        $(#[$doc])*
        pub fn $set(&self, value: &str) -> Result<(), ZmqError> {
          self.set_option_raw($id, value.as_bytes())
        }
      )*
    }
  };
}

int_options! {
  /// Outbound queue limit per peer, in messages (0 = unbounded).
  sndhwm, set_sndhwm => options::SNDHWM;
  /// Inbound queue limit, in messages (0 = unbounded). The queue is sized when the first
  /// connection attaches; later changes do not resize it.
  rcvhwm, set_rcvhwm => options::RCVHWM;
  /// Milliseconds; -1 blocks indefinitely, 0 never blocks.
  sndtimeo, set_sndtimeo => options::SNDTIMEO;
  rcvtimeo, set_rcvtimeo => options::RCVTIMEO;
  /// Milliseconds a close waits for queued messages; -1 waits indefinitely.
  linger, set_linger => options::LINGER;
  /// Milliseconds between reconnect attempts; -1 disables reconnection.
  reconnect_ivl, set_reconnect_ivl => options::RECONNECT_IVL;
  /// Upper bound for exponential reconnect backoff; 0 keeps the interval fixed.
  reconnect_ivl_max, set_reconnect_ivl_max => options::RECONNECT_IVL_MAX;
  backlog, set_backlog => options::BACKLOG;
  /// Milliseconds allowed for the ZMTP handshake; 0 means no limit.
  handshake_ivl, set_handshake_ivl => options::HANDSHAKE_IVL;
  /// -1 system default, 0 off, 1 on.
  tcp_keepalive, set_tcp_keepalive => options::TCP_KEEPALIVE;
  tcp_keepalive_cnt, set_tcp_keepalive_cnt => options::TCP_KEEPALIVE_CNT;
  tcp_keepalive_idle, set_tcp_keepalive_idle => options::TCP_KEEPALIVE_IDLE;
  tcp_keepalive_intvl, set_tcp_keepalive_intvl => options::TCP_KEEPALIVE_INTVL;
  multicast_hops, set_multicast_hops => options::MULTICAST_HOPS;
  /// Kilobits per second.
  rate, set_rate => options::RATE;
  recovery_ivl, set_recovery_ivl => options::RECOVERY_IVL;
}

bool_options! {
  /// When set, messages are only queued to peers that are actually connected.
  immediate, set_immediate => options::IMMEDIATE;
  ipv6, set_ipv6 => options::IPV6;
  ipv4only, set_ipv4only => options::IPV4ONLY;
  /// ROUTER only: fail unroutable sends with `Unroutable` instead of dropping them.
  router_mandatory, set_router_mandatory => options::ROUTER_MANDATORY;
  /// ROUTER only: talk raw bytes like a STREAM socket.
  router_raw, set_router_raw => options::ROUTER_RAW;
  /// ROUTER only: a new peer may take over an identity already in use.
  router_handover, set_router_handover => options::ROUTER_HANDOVER;
  /// Keep only the most recent message in each queue. Set it before bind/connect: the
  /// inbound queue is fixed when the first connection attaches.
  conflate, set_conflate => options::CONFLATE;
  curve_server, set_curve_server => options::CURVE_SERVER;
}

string_options! {
  /// `host:port` of a SOCKS5 proxy for outgoing TCP connections.
  socks_proxy, set_socks_proxy => options::SOCKS_PROXY;
  socks_username, set_socks_username => options::SOCKS_USERNAME;
  socks_password, set_socks_password => options::SOCKS_PASSWORD;
  /// CURVE keys read back as 40-character Z85 text; empty when unset.
  curve_public_key, set_curve_public_key => options::CURVE_PUBLICKEY;
  curve_secret_key, set_curve_secret_key => options::CURVE_SECRETKEY;
  curve_server_key, set_curve_server_key => options::CURVE_SERVERKEY;
}

impl Socket {
  /// Largest inbound message accepted, in bytes; -1 for no limit.
  pub fn maxmsgsize(&self) -> Result<i64, ZmqError> {
    parse_i64_option(&self.get_option_raw(options::MAXMSGSIZE)?, options::MAXMSGSIZE)
  }

  pub fn set_maxmsgsize(&self, value: i64) -> Result<(), ZmqError> {
    self.set_option_raw(options::MAXMSGSIZE, &value.to_ne_bytes())
  }

  /// Bitmask of I/O threads this socket's connections may use.
  pub fn affinity(&self) -> Result<u64, ZmqError> {
    let raw = parse_i64_option(&self.get_option_raw(options::AFFINITY)?, options::AFFINITY)?;
    Ok(raw as u64)
  }

  pub fn set_affinity(&self, value: u64) -> Result<(), ZmqError> {
    self.set_option_raw(options::AFFINITY, &value.to_ne_bytes())
  }

  /// The routing identity announced to peers; empty when unset.
  pub fn identity(&self) -> Result<Vec<u8>, ZmqError> {
    self.get_option_raw(options::ROUTING_ID)
  }

  /// Must be 1 to 255 bytes and must not start with a zero byte.
  pub fn set_identity(&self, identity: &[u8]) -> Result<(), ZmqError> {
    if identity.is_empty() || identity.len() > options::MAX_IDENTITY_LEN {
      return Err(ZmqError::InvalidIdentitySize(identity.len()));
    }
    self.set_option_raw(options::ROUTING_ID, identity)
  }

  /// CURVE keys given as 32 raw bytes (the string setters take Z85 text).
  pub fn set_curve_public_key_bytes(&self, key: &[u8]) -> Result<(), ZmqError> {
    self.set_option_raw(options::CURVE_PUBLICKEY, key)
  }

  pub fn set_curve_secret_key_bytes(&self, key: &[u8]) -> Result<(), ZmqError> {
    self.set_option_raw(options::CURVE_SECRETKEY, key)
  }

  pub fn set_curve_server_key_bytes(&self, key: &[u8]) -> Result<(), ZmqError> {
    self.set_option_raw(options::CURVE_SERVERKEY, key)
  }

  /// The endpoint most recently bound or connected, with wildcards resolved.
  pub fn last_endpoint(&self) -> Result<String, ZmqError> {
    let raw = self.get_option_raw(options::LAST_ENDPOINT)?;
    String::from_utf8(raw).map_err(|_| ZmqError::InvalidOptionValue(options::LAST_ENDPOINT))
  }

  /// `POLLIN`/`POLLOUT` readiness bits.
  pub fn events(&self) -> Result<i32, ZmqError> {
    parse_i32_option(&self.get_option_raw(options::EVENTS)?, options::EVENTS)
  }

  /// True when the last frame handed out by `receive` has more frames following.
  pub fn rcvmore(&self) -> Result<bool, ZmqError> {
    parse_bool_option(&self.get_option_raw(options::RCVMORE)?, options::RCVMORE)
  }

  /// The socket type as reported by the TYPE option.
  pub fn type_option(&self) -> Result<i32, ZmqError> {
    parse_i32_option(&self.get_option_raw(options::TYPE)?, options::TYPE)
  }
}
