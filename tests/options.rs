// tests/options.rs

use zsock::options;
use zsock::{SocketType, ZmqError};
mod common;

#[tokio::test]
async fn test_defaults() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Dealer)?;

  assert_eq!(socket.sndhwm()?, 1000);
  assert_eq!(socket.rcvhwm()?, 1000);
  assert_eq!(socket.sndtimeo()?, -1);
  assert_eq!(socket.rcvtimeo()?, -1);
  assert_eq!(socket.linger()?, 0);
  assert_eq!(socket.reconnect_ivl()?, 100);
  assert_eq!(socket.reconnect_ivl_max()?, 0);
  assert_eq!(socket.maxmsgsize()?, -1);
  assert!(!socket.immediate()?);
  assert!(!socket.ipv6()?);
  assert!(socket.ipv4only()?);
  assert!(socket.identity()?.is_empty());
  assert_eq!(socket.last_endpoint()?, "");
  assert_eq!(socket.type_option()?, SocketType::Dealer.as_raw());
  assert_eq!(socket.curve_public_key()?, "");

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_identity_length_bounds() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Dealer)?;

  assert!(matches!(socket.set_identity(b""), Err(ZmqError::InvalidIdentitySize(0))));
  assert!(matches!(
    socket.set_identity(&[b'x'; 256]),
    Err(ZmqError::InvalidIdentitySize(256))
  ));
  // Leading zero bytes are reserved for generated identities.
  assert!(socket.set_identity(b"\x00abc").is_err());

  socket.set_identity(b"a")?;
  assert_eq!(socket.identity()?, b"a");
  socket.set_identity(&[b'y'; 255])?;
  assert_eq!(socket.identity()?.len(), 255);

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_invalid_values_are_rejected() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Pull)?;

  assert!(matches!(socket.set_sndhwm(-1), Err(ZmqError::InvalidOptionValue(options::SNDHWM))));
  assert!(matches!(socket.set_rcvtimeo(-2), Err(ZmqError::InvalidOptionValue(options::RCVTIMEO))));
  assert!(matches!(socket.set_tcp_keepalive(2), Err(ZmqError::InvalidOptionValue(_))));
  assert!(matches!(socket.set_maxmsgsize(-5), Err(ZmqError::InvalidOptionValue(_))));
  assert!(matches!(socket.set_rate(0), Err(ZmqError::InvalidOptionValue(_))));
  // Booleans are 0 or 1.
  assert!(matches!(socket.set_option(options::CONFLATE, 7), Err(ZmqError::InvalidOptionValue(_))));
  // Wrong width.
  assert!(matches!(
    socket.set_option_raw(options::SNDHWM, &[1, 2]),
    Err(ZmqError::InvalidOptionValue(_))
  ));
  // Unknown and read-only options.
  assert!(matches!(socket.set_option(9999, 1), Err(ZmqError::InvalidOption(9999))));
  assert!(matches!(socket.set_option(options::TYPE, 1), Err(ZmqError::InvalidOption(_))));
  assert!(matches!(socket.get_option_raw(9999), Err(ZmqError::InvalidOption(9999))));

  // Nothing changed.
  assert_eq!(socket.sndhwm()?, 1000);
  assert_eq!(socket.rcvtimeo()?, -1);

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_set_and_read_back() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Router)?;

  socket.set_option(options::SNDHWM, 10)?;
  socket.set_rcvhwm(20)?;
  socket.set_sndtimeo(250)?;
  socket.set_linger(-1)?;
  socket.set_reconnect_ivl(-1)?;
  socket.set_reconnect_ivl_max(5000)?;
  socket.set_router_mandatory(true)?;
  socket.set_router_handover(true)?;
  socket.set_affinity(0b101)?;
  socket.set_maxmsgsize(1 << 20)?;
  socket.set_socks_proxy("127.0.0.1:1080")?;
  socket.set_tcp_keepalive(1)?;
  socket.set_tcp_keepalive_idle(30)?;

  assert_eq!(socket.sndhwm()?, 10);
  assert_eq!(socket.rcvhwm()?, 20);
  assert_eq!(socket.sndtimeo()?, 250);
  assert_eq!(socket.linger()?, -1);
  assert_eq!(socket.reconnect_ivl()?, -1);
  assert_eq!(socket.reconnect_ivl_max()?, 5000);
  assert!(socket.router_mandatory()?);
  assert!(socket.router_handover()?);
  assert_eq!(socket.affinity()?, 0b101);
  assert_eq!(socket.maxmsgsize()?, 1 << 20);
  assert_eq!(socket.socks_proxy()?, "127.0.0.1:1080");
  assert_eq!(socket.tcp_keepalive()?, 1);
  assert_eq!(socket.tcp_keepalive_idle()?, 30);

  // Empty string clears.
  socket.set_socks_proxy("")?;
  assert_eq!(socket.socks_proxy()?, "");

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_ipv6_and_ipv4only_are_inverse() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Pub)?;

  socket.set_ipv6(true)?;
  assert!(!socket.ipv4only()?);
  socket.set_ipv4only(true)?;
  assert!(!socket.ipv6()?);

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_curve_keys_in_both_forms() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Dealer)?;

  socket.set_curve_server(true)?;
  assert!(socket.curve_server()?);

  socket.set_curve_public_key_bytes(&[0u8; 32])?;
  let text = socket.curve_public_key()?;
  assert_eq!(text.len(), 40);

  // The Z85 text form sets the same key.
  socket.set_curve_secret_key(&text)?;
  assert_eq!(socket.curve_secret_key()?, text);

  assert!(matches!(socket.set_curve_server_key_bytes(&[1u8; 31]), Err(ZmqError::InvalidKeySize(31))));

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_last_endpoint_tracks_bind_and_connect() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let first = common::unique_inproc_endpoint();
  let second = common::unique_inproc_endpoint();

  let socket = ctx.socket(SocketType::Pair)?;
  socket.bind(&first).await?;
  assert_eq!(socket.last_endpoint()?, first);

  let other = ctx.socket(SocketType::Pair)?;
  other.connect(&second).await?;
  assert_eq!(other.last_endpoint()?, second);

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_events_and_rcvmore() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let endpoint = common::unique_inproc_endpoint();

  let push = ctx.bind(SocketType::Push, &endpoint).await?;
  let pull = ctx.connect(SocketType::Pull, &endpoint).await?;

  assert_eq!(pull.events()? & options::POLLIN, 0);
  assert!(push.events()? & options::POLLOUT != 0);

  push.send(vec!["a", "b"]).await?;
  assert!(pull.poll(common::LONG_TIMEOUT.as_millis() as i64).await?);
  assert!(pull.events()? & options::POLLIN != 0);

  let _ = pull.receive()?;
  assert!(pull.rcvmore()?);
  let _ = pull.receive()?;
  assert!(!pull.rcvmore()?);

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_options_fail_after_close() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Pair)?;
  socket.close().await?;
  assert!(socket.is_closed());
  assert!(matches!(socket.sndhwm(), Err(ZmqError::SocketClosed)));
  assert!(matches!(socket.set_sndhwm(5), Err(ZmqError::SocketClosed)));
  // Closing again is fine.
  socket.close().await?;
  ctx.close();
  Ok(())
}
