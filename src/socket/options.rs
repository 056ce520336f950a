// src/socket/options.rs

use std::time::Duration;

use crate::security::{self, CURVE_KEY_LEN};
use crate::socket::types::SocketType;
use crate::{Blob, ZmqError};

// Use values consistent with libzmq where possible
pub const AFFINITY: i32 = 4;
pub const ROUTING_ID: i32 = 5; // Often called ZMQ_IDENTITY
pub const SUBSCRIBE: i32 = 6;
pub const UNSUBSCRIBE: i32 = 7;
pub const RATE: i32 = 8;
pub const RECOVERY_IVL: i32 = 9;
pub const RCVMORE: i32 = 13;
pub const EVENTS: i32 = 15;
pub const TYPE: i32 = 16;
pub const LINGER: i32 = 17;
pub const RECONNECT_IVL: i32 = 18;
pub const BACKLOG: i32 = 19;
pub const RECONNECT_IVL_MAX: i32 = 21;
pub const MAXMSGSIZE: i32 = 22;
pub const SNDHWM: i32 = 23;
pub const RCVHWM: i32 = 24;
pub const MULTICAST_HOPS: i32 = 25;
pub const RCVTIMEO: i32 = 27;
pub const SNDTIMEO: i32 = 28;
pub const IPV4ONLY: i32 = 31;
pub const LAST_ENDPOINT: i32 = 32;
pub const ROUTER_MANDATORY: i32 = 33;
pub const TCP_KEEPALIVE: i32 = 34;
pub const TCP_KEEPALIVE_CNT: i32 = 35;
pub const TCP_KEEPALIVE_IDLE: i32 = 36;
pub const TCP_KEEPALIVE_INTVL: i32 = 37;
pub const IMMEDIATE: i32 = 39;
pub const ROUTER_RAW: i32 = 41;
pub const IPV6: i32 = 42;
pub const CURVE_SERVER: i32 = 47;
pub const CURVE_PUBLICKEY: i32 = 48;
pub const CURVE_SECRETKEY: i32 = 49;
pub const CURVE_SERVERKEY: i32 = 50;
pub const CONFLATE: i32 = 54;
pub const ROUTER_HANDOVER: i32 = 56;
pub const HANDSHAKE_IVL: i32 = 66;
pub const SOCKS_PROXY: i32 = 68;
pub const SOCKS_USERNAME: i32 = 99;
pub const SOCKS_PASSWORD: i32 = 100;

/// Bits reported by the `EVENTS` option.
pub const POLLIN: i32 = 1;
pub const POLLOUT: i32 = 2;

pub const MAX_IDENTITY_LEN: usize = 255;

/// Holds parsed and validated socket options.
#[derive(Debug, Clone)]
pub(crate) struct SocketOptions {
  // High water marks, 0 means unbounded.
  pub sndhwm: i32,
  pub rcvhwm: i32,
  // Timeouts: None = -1 (infinite), Some(ZERO) = 0 (immediate), Some(>0) = timeout
  pub sndtimeo: Option<Duration>,
  pub rcvtimeo: Option<Duration>,
  pub linger: Option<Duration>,
  /// None disables reconnection (-1).
  pub reconnect_ivl: Option<Duration>,
  /// ZERO disables exponential backoff.
  pub reconnect_ivl_max: Duration,
  pub backlog: i32,
  pub handshake_ivl: Option<Duration>,
  pub immediate: bool,
  pub maxmsgsize: i64,
  pub ipv6: bool,
  // TCP keepalive, -1 leaves the OS default in place.
  pub tcp_keepalive: i32,
  pub tcp_keepalive_cnt: i32,
  pub tcp_keepalive_idle: i32,
  pub tcp_keepalive_intvl: i32,
  // Multicast settings are carried for API compatibility only.
  pub multicast_hops: i32,
  pub rate: i32,
  pub recovery_ivl: i32,
  pub affinity: u64,
  pub routing_id: Option<Blob>,
  pub router_mandatory: bool,
  pub router_raw: bool,
  pub router_handover: bool,
  pub conflate: bool,
  pub socks_proxy: Option<String>,
  pub socks_username: Option<String>,
  pub socks_password: Option<String>,
  pub curve_server: bool,
  pub curve_public_key: Option<[u8; CURVE_KEY_LEN]>,
  pub curve_secret_key: Option<[u8; CURVE_KEY_LEN]>,
  pub curve_server_key: Option<[u8; CURVE_KEY_LEN]>,
}

impl Default for SocketOptions {
  fn default() -> Self {
    Self {
      sndhwm: 1000,
      rcvhwm: 1000,
      sndtimeo: None,
      rcvtimeo: None,
      linger: Some(Duration::ZERO), // 0 here, unlike libzmq's -1: closing never blocks by default
      reconnect_ivl: Some(Duration::from_millis(100)),
      reconnect_ivl_max: Duration::ZERO,
      backlog: 100,
      handshake_ivl: Some(Duration::from_millis(30_000)),
      immediate: false,
      maxmsgsize: -1,
      ipv6: false,
      tcp_keepalive: -1,
      tcp_keepalive_cnt: -1,
      tcp_keepalive_idle: -1,
      tcp_keepalive_intvl: -1,
      multicast_hops: 1,
      rate: 100,
      recovery_ivl: 10_000,
      affinity: 0,
      routing_id: None,
      router_mandatory: false,
      router_raw: false,
      router_handover: false,
      conflate: false,
      socks_proxy: None,
      socks_username: None,
      socks_password: None,
      curve_server: false,
      curve_public_key: None,
      curve_secret_key: None,
      curve_server_key: None,
    }
  }
}

impl SocketOptions {
  /// Applies a raw option value. Dynamic options (subscriptions, read-only state) are handled by
  /// the socket before it gets here.
  pub(crate) fn set(&mut self, socket_type: SocketType, option: i32, value: &[u8]) -> Result<(), ZmqError> {
    match option {
      SNDHWM => self.sndhwm = parse_non_negative(value, option)?,
      RCVHWM => self.rcvhwm = parse_non_negative(value, option)?,
      SNDTIMEO => self.sndtimeo = parse_timeout_option(value, option)?,
      RCVTIMEO => self.rcvtimeo = parse_timeout_option(value, option)?,
      LINGER => self.linger = parse_timeout_option(value, option)?,
      RECONNECT_IVL => self.reconnect_ivl = parse_timeout_option(value, option)?,
      RECONNECT_IVL_MAX => {
        self.reconnect_ivl_max = Duration::from_millis(parse_non_negative(value, option)? as u64)
      }
      BACKLOG => self.backlog = parse_non_negative(value, option)?,
      HANDSHAKE_IVL => {
        let ms = parse_non_negative(value, option)?;
        self.handshake_ivl = (ms > 0).then(|| Duration::from_millis(ms as u64));
      }
      IMMEDIATE => self.immediate = parse_bool_option(value, option)?,
      MAXMSGSIZE => {
        let v = parse_i64_option(value, option)?;
        if v < -1 {
          return Err(ZmqError::InvalidOptionValue(option));
        }
        self.maxmsgsize = v;
      }
      IPV6 => self.ipv6 = parse_bool_option(value, option)?,
      IPV4ONLY => self.ipv6 = !parse_bool_option(value, option)?,
      TCP_KEEPALIVE => self.tcp_keepalive = parse_keepalive_mode_option(value)?,
      TCP_KEEPALIVE_CNT => self.tcp_keepalive_cnt = parse_at_least_minus_one(value, option)?,
      TCP_KEEPALIVE_IDLE => self.tcp_keepalive_idle = parse_at_least_minus_one(value, option)?,
      TCP_KEEPALIVE_INTVL => self.tcp_keepalive_intvl = parse_at_least_minus_one(value, option)?,
      MULTICAST_HOPS => self.multicast_hops = parse_positive(value, option)?,
      RATE => self.rate = parse_positive(value, option)?,
      RECOVERY_IVL => self.recovery_ivl = parse_non_negative(value, option)?,
      AFFINITY => self.affinity = parse_i64_option(value, option)? as u64,
      ROUTING_ID => self.routing_id = Some(parse_identity_option(value)?),
      ROUTER_MANDATORY | ROUTER_RAW | ROUTER_HANDOVER => {
        if socket_type != SocketType::Router {
          return Err(ZmqError::InvalidOptionValue(option));
        }
        let flag = parse_bool_option(value, option)?;
        match option {
          ROUTER_MANDATORY => self.router_mandatory = flag,
          ROUTER_RAW => self.router_raw = flag,
          _ => self.router_handover = flag,
        }
      }
      CONFLATE => self.conflate = parse_bool_option(value, option)?,
      SOCKS_PROXY => self.socks_proxy = parse_string_option(value, option)?,
      SOCKS_USERNAME => self.socks_username = parse_string_option(value, option)?,
      SOCKS_PASSWORD => self.socks_password = parse_string_option(value, option)?,
      CURVE_SERVER => self.curve_server = parse_bool_option(value, option)?,
      CURVE_PUBLICKEY => self.curve_public_key = Some(security::parse_curve_key(value)?),
      CURVE_SECRETKEY => self.curve_secret_key = Some(security::parse_curve_key(value)?),
      CURVE_SERVERKEY => self.curve_server_key = Some(security::parse_curve_key(value)?),
      // Read-only options (RCVMORE, EVENTS, TYPE, LAST_ENDPOINT) land here too.
      _ => return Err(ZmqError::InvalidOption(option)),
    }
    Ok(())
  }

  /// Reads a stored option in its raw form (native-endian integers, raw bytes for blobs,
  /// Z85 text for CURVE keys).
  pub(crate) fn get(&self, option: i32) -> Result<Vec<u8>, ZmqError> {
    let int = |v: i32| Ok(v.to_ne_bytes().to_vec());
    let flag = |b: bool| Ok(i32::from(b).to_ne_bytes().to_vec());
    match option {
      SNDHWM => int(self.sndhwm),
      RCVHWM => int(self.rcvhwm),
      SNDTIMEO => int(duration_to_ms(self.sndtimeo)),
      RCVTIMEO => int(duration_to_ms(self.rcvtimeo)),
      LINGER => int(duration_to_ms(self.linger)),
      RECONNECT_IVL => int(duration_to_ms(self.reconnect_ivl)),
      RECONNECT_IVL_MAX => int(duration_to_ms(Some(self.reconnect_ivl_max))),
      BACKLOG => int(self.backlog),
      HANDSHAKE_IVL => int(self.handshake_ivl.map_or(0, |d| duration_to_ms(Some(d)))),
      IMMEDIATE => flag(self.immediate),
      MAXMSGSIZE => Ok(self.maxmsgsize.to_ne_bytes().to_vec()),
      IPV6 => flag(self.ipv6),
      IPV4ONLY => flag(!self.ipv6),
      TCP_KEEPALIVE => int(self.tcp_keepalive),
      TCP_KEEPALIVE_CNT => int(self.tcp_keepalive_cnt),
      TCP_KEEPALIVE_IDLE => int(self.tcp_keepalive_idle),
      TCP_KEEPALIVE_INTVL => int(self.tcp_keepalive_intvl),
      MULTICAST_HOPS => int(self.multicast_hops),
      RATE => int(self.rate),
      RECOVERY_IVL => int(self.recovery_ivl),
      AFFINITY => Ok(self.affinity.to_ne_bytes().to_vec()),
      ROUTING_ID => Ok(self.routing_id.as_ref().map(|b| b.to_vec()).unwrap_or_default()),
      ROUTER_MANDATORY => flag(self.router_mandatory),
      ROUTER_RAW => flag(self.router_raw),
      ROUTER_HANDOVER => flag(self.router_handover),
      CONFLATE => flag(self.conflate),
      SOCKS_PROXY => Ok(self.socks_proxy.clone().unwrap_or_default().into_bytes()),
      SOCKS_USERNAME => Ok(self.socks_username.clone().unwrap_or_default().into_bytes()),
      SOCKS_PASSWORD => Ok(self.socks_password.clone().unwrap_or_default().into_bytes()),
      CURVE_SERVER => flag(self.curve_server),
      CURVE_PUBLICKEY => key_as_z85(&self.curve_public_key),
      CURVE_SECRETKEY => key_as_z85(&self.curve_secret_key),
      CURVE_SERVERKEY => key_as_z85(&self.curve_server_key),
      _ => Err(ZmqError::InvalidOption(option)),
    }
  }
}

fn duration_to_ms(d: Option<Duration>) -> i32 {
  match d {
    None => -1,
    Some(d) => i32::try_from(d.as_millis()).unwrap_or(i32::MAX),
  }
}

fn key_as_z85(key: &Option<[u8; CURVE_KEY_LEN]>) -> Result<Vec<u8>, ZmqError> {
  match key {
    Some(k) => Ok(security::z85::encode(k)?.into_bytes()),
    None => Ok(Vec::new()),
  }
}

// --- Helper functions for parsing option values ---

/// Parses a native-endian i32, the representation libzmq's C API uses for int options.
pub(crate) fn parse_i32_option(value: &[u8], option_id: i32) -> Result<i32, ZmqError> {
  let arr: [u8; 4] = value.try_into().map_err(|_| ZmqError::InvalidOptionValue(option_id))?;
  Ok(i32::from_ne_bytes(arr))
}

pub(crate) fn parse_i64_option(value: &[u8], option_id: i32) -> Result<i64, ZmqError> {
  let arr: [u8; 8] = value.try_into().map_err(|_| ZmqError::InvalidOptionValue(option_id))?;
  Ok(i64::from_ne_bytes(arr))
}

/// Booleans must be exactly 0 or 1.
pub(crate) fn parse_bool_option(value: &[u8], option_id: i32) -> Result<bool, ZmqError> {
  match parse_i32_option(value, option_id)? {
    0 => Ok(false),
    1 => Ok(true),
    _ => Err(ZmqError::InvalidOptionValue(option_id)),
  }
}

fn parse_non_negative(value: &[u8], option_id: i32) -> Result<i32, ZmqError> {
  let v = parse_i32_option(value, option_id)?;
  if v < 0 {
    return Err(ZmqError::InvalidOptionValue(option_id));
  }
  Ok(v)
}

fn parse_positive(value: &[u8], option_id: i32) -> Result<i32, ZmqError> {
  let v = parse_i32_option(value, option_id)?;
  if v <= 0 {
    return Err(ZmqError::InvalidOptionValue(option_id));
  }
  Ok(v)
}

fn parse_at_least_minus_one(value: &[u8], option_id: i32) -> Result<i32, ZmqError> {
  let v = parse_i32_option(value, option_id)?;
  if v < -1 {
    return Err(ZmqError::InvalidOptionValue(option_id));
  }
  Ok(v)
}

/// Parses a timeout-like value in milliseconds: -1 is infinite, 0 is immediate.
pub(crate) fn parse_timeout_option(value: &[u8], option_id: i32) -> Result<Option<Duration>, ZmqError> {
  match parse_i32_option(value, option_id)? {
    -1 => Ok(None),
    v @ 0.. => Ok(Some(Duration::from_millis(v as u64))),
    _ => Err(ZmqError::InvalidOptionValue(option_id)),
  }
}

/// Parses the ZMQ_TCP_KEEPALIVE option (-1, 0, 1).
pub(crate) fn parse_keepalive_mode_option(value: &[u8]) -> Result<i32, ZmqError> {
  let val = parse_i32_option(value, TCP_KEEPALIVE)?;
  if (-1..=1).contains(&val) {
    Ok(val)
  } else {
    Err(ZmqError::InvalidOptionValue(TCP_KEEPALIVE))
  }
}

/// Validates a user-assigned routing identity.
pub(crate) fn parse_identity_option(value: &[u8]) -> Result<Blob, ZmqError> {
  if value.is_empty() || value.len() > MAX_IDENTITY_LEN {
    return Err(ZmqError::InvalidIdentitySize(value.len()));
  }
  // A leading zero byte is reserved for generated identities.
  if value[0] == 0 {
    return Err(ZmqError::InvalidOptionValue(ROUTING_ID));
  }
  Ok(Blob::from(value))
}

/// Empty strings clear the option.
fn parse_string_option(value: &[u8], option_id: i32) -> Result<Option<String>, ZmqError> {
  if value.is_empty() {
    return Ok(None);
  }
  let s = std::str::from_utf8(value).map_err(|_| ZmqError::InvalidOptionValue(option_id))?;
  Ok(Some(s.to_string()))
}

/// Values that can be handed to [`Socket::set_option`](crate::Socket::set_option).
pub trait ToBytes {
  fn to_bytes(&self) -> Vec<u8>;
}

impl ToBytes for i32 {
  fn to_bytes(&self) -> Vec<u8> {
    self.to_ne_bytes().to_vec()
  }
}

impl ToBytes for i64 {
  fn to_bytes(&self) -> Vec<u8> {
    self.to_ne_bytes().to_vec()
  }
}

impl ToBytes for u64 {
  fn to_bytes(&self) -> Vec<u8> {
    self.to_ne_bytes().to_vec()
  }
}

impl ToBytes for bool {
  fn to_bytes(&self) -> Vec<u8> {
    i32::from(*self).to_ne_bytes().to_vec()
  }
}

impl ToBytes for &str {
  fn to_bytes(&self) -> Vec<u8> {
    self.as_bytes().to_vec()
  }
}

impl ToBytes for String {
  fn to_bytes(&self) -> Vec<u8> {
    self.as_bytes().to_vec()
  }
}

impl ToBytes for &[u8] {
  fn to_bytes(&self) -> Vec<u8> {
    self.to_vec()
  }
}

impl ToBytes for Vec<u8> {
  fn to_bytes(&self) -> Vec<u8> {
    self.clone()
  }
}
