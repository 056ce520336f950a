// tests/tcp.rs

use serial_test::serial;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use zsock::{Context, Socket, SocketType, ZmqError};
mod common;

use common::{recv_timeout, LONG_TIMEOUT, SHORT_TIMEOUT};

const WILDCARD: &str = "tcp://127.0.0.1:*";

async fn bind_wildcard(ctx: &Context, socket_type: SocketType) -> Result<(Socket, String), ZmqError> {
  let socket = ctx.bind(socket_type, WILDCARD).await?;
  let endpoint = socket.last_endpoint()?;
  println!("Bound {:?} to {}", socket_type, endpoint);
  Ok((socket, endpoint))
}

#[tokio::test]
#[serial]
async fn test_wildcard_port_is_resolved() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let (_pull, endpoint) = bind_wildcard(&ctx, SocketType::Pull).await?;

  let port: u16 = endpoint
    .rsplit_once(':')
    .and_then(|(_, p)| p.parse().ok())
    .expect("resolved endpoint has a numeric port");
  assert!(endpoint.starts_with("tcp://127.0.0.1:"));
  assert_ne!(port, 0);

  // The port is really taken.
  let other = ctx.socket(SocketType::Pull)?;
  assert!(matches!(other.bind(&endpoint).await, Err(ZmqError::AddrInUse(_))));

  ctx.close();
  Ok(())
}

#[tokio::test]
#[serial]
async fn test_push_pull_over_tcp() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let (pull, endpoint) = bind_wildcard(&ctx, SocketType::Pull).await?;
  let push = ctx.connect(SocketType::Push, &endpoint).await?;

  push.send(vec!["multi", "", "part"]).await?;
  let msg = recv_timeout(&pull, LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&msg), vec!["multi", "", "part"]);

  // Large frames use the long length encoding.
  let big = vec![0xABu8; 300_000];
  push.send(big.clone()).await?;
  let msg = recv_timeout(&pull, LONG_TIMEOUT).await?;
  assert_eq!(msg.frames()[0].data(), big.as_slice());

  ctx.close();
  Ok(())
}

#[tokio::test]
#[serial]
async fn test_router_dealer_identity_over_tcp() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let (router, endpoint) = bind_wildcard(&ctx, SocketType::Router).await?;
  let dealer = ctx.socket(SocketType::Dealer)?;
  dealer.set_identity(b"D1")?;
  dealer.connect(&endpoint).await?;

  dealer.send("hello").await?;
  let request = recv_timeout(&router, LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&request), vec!["D1", "hello"]);

  router.send(vec!["D1", "world"]).await?;
  let reply = recv_timeout(&dealer, LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&reply), vec!["world"]);

  ctx.close();
  Ok(())
}

#[tokio::test]
#[serial]
async fn test_pub_sub_over_tcp() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let (publisher, endpoint) = bind_wildcard(&ctx, SocketType::Pub).await?;
  let subscriber = ctx.connect(SocketType::Sub, &endpoint).await?;
  subscriber.subscribe("A")?;

  let msg = common::send_until_received(&publisher, &subscriber, "A-ready", LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&msg), vec!["A-ready"]);
  while recv_timeout(&subscriber, SHORT_TIMEOUT).await.is_ok() {}

  publisher.send("B-skip").await?;
  publisher.send("A-keep").await?;
  let msg = recv_timeout(&subscriber, LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&msg), vec!["A-keep"]);

  ctx.close();
  Ok(())
}

#[tokio::test]
#[serial]
async fn test_connect_before_bind_over_tcp() -> Result<(), ZmqError> {
  let ctx = common::test_context();

  // Find a free port, then release it.
  let endpoint = {
    let (scratch, endpoint) = bind_wildcard(&ctx, SocketType::Pull).await?;
    scratch.unbind(&endpoint).await?;
    endpoint
  };

  let push = ctx.socket(SocketType::Push)?;
  push.set_reconnect_ivl(20)?;
  push.connect(&endpoint).await?;
  // Queued until the peer shows up.
  push.send("early").await?;

  tokio::time::sleep(Duration::from_millis(50)).await;
  let pull = bind_with_retry(&ctx, SocketType::Pull, &endpoint).await?;
  let msg = recv_timeout(&pull, LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&msg), vec!["early"]);

  ctx.close();
  Ok(())
}

#[tokio::test]
#[serial]
async fn test_reconnects_after_peer_restart() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let (pull, endpoint) = bind_wildcard(&ctx, SocketType::Pull).await?;

  let push = ctx.socket(SocketType::Push)?;
  push.set_reconnect_ivl(20)?;
  push.set_reconnect_ivl_max(200)?;
  push.connect(&endpoint).await?;
  push.send("first").await?;
  assert!(recv_timeout(&pull, LONG_TIMEOUT).await.is_ok());

  pull.close().await?;
  tokio::time::sleep(Duration::from_millis(100)).await;

  let restarted = bind_with_retry(&ctx, SocketType::Pull, &endpoint).await?;
  let msg = common::send_until_received(&push, &restarted, "again", LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&msg), vec!["again"]);

  ctx.close();
  Ok(())
}

#[tokio::test]
#[serial]
async fn test_subscriber_resubscribes_after_publisher_restart() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let (publisher, endpoint) = bind_wildcard(&ctx, SocketType::Pub).await?;

  let subscriber = ctx.socket(SocketType::Sub)?;
  subscriber.set_reconnect_ivl(20)?;
  subscriber.set_reconnect_ivl_max(200)?;
  subscriber.connect(&endpoint).await?;
  subscriber.subscribe("")?;
  common::send_until_received(&publisher, &subscriber, "before", LONG_TIMEOUT).await?;

  publisher.close().await?;
  tokio::time::sleep(Duration::from_millis(100)).await;

  let restarted = bind_with_retry(&ctx, SocketType::Pub, &endpoint).await?;
  let msg = common::send_until_received(&restarted, &subscriber, "after", LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&msg), vec!["after"]);

  ctx.close();
  Ok(())
}

/// Plays a PUSH peer by hand: NULL greeting and READY, then `frames` as raw ZMTP, then a clean
/// close. Everything the socket sends is read so the close is a FIN, not a reset.
async fn raw_push_peer(endpoint: &str, frames: &[(bool, &[u8])]) -> std::io::Result<()> {
  let addr = endpoint.strip_prefix("tcp://").expect("tcp endpoint");
  let mut stream = TcpStream::connect(addr).await?;

  let mut greeting = vec![0xFF];
  greeting.extend_from_slice(&[0u8; 8]);
  greeting.extend_from_slice(&[0x7F, 3, 0]);
  let mut mechanism = [0u8; 20];
  mechanism[..4].copy_from_slice(b"NULL");
  greeting.extend_from_slice(&mechanism);
  greeting.push(0);
  greeting.extend_from_slice(&[0u8; 31]);
  assert_eq!(greeting.len(), 64);
  stream.write_all(&greeting).await?;
  let mut peer_greeting = [0u8; 64];
  stream.read_exact(&mut peer_greeting).await?;

  let mut ready = vec![5];
  ready.extend_from_slice(b"READY");
  ready.push(11);
  ready.extend_from_slice(b"Socket-Type");
  ready.extend_from_slice(&4u32.to_be_bytes());
  ready.extend_from_slice(b"PUSH");
  stream.write_all(&[0x04, ready.len() as u8]).await?;
  stream.write_all(&ready).await?;

  let mut header = [0u8; 2];
  stream.read_exact(&mut header).await?;
  assert_eq!(header[0], 0x04, "expected a short command frame");
  let mut peer_ready = vec![0u8; header[1] as usize];
  stream.read_exact(&mut peer_ready).await?;

  for (more, data) in frames {
    stream.write_all(&[u8::from(*more), data.len() as u8]).await?;
    stream.write_all(data).await?;
  }
  stream.shutdown().await?;
  Ok(())
}

#[tokio::test]
#[serial]
async fn test_message_cut_short_is_incomplete() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let (pull, endpoint) = bind_wildcard(&ctx, SocketType::Pull).await?;

  // Whole-message receive reports the truncation.
  raw_push_peer(&endpoint, &[(true, b"head")]).await?;
  assert!(pull.poll(LONG_TIMEOUT.as_millis() as i64).await?);
  assert!(matches!(pull.receive_all(), Err(ZmqError::Incomplete)));

  // Frame-level receive hands out what arrived, then reports the missing continuation.
  raw_push_peer(&endpoint, &[(true, b"part")]).await?;
  assert!(pull.poll(LONG_TIMEOUT.as_millis() as i64).await?);
  let frame = pull.receive()?.expect("partial frame");
  assert_eq!(frame.data(), b"part");
  assert!(frame.is_more());
  assert!(matches!(pull.receive(), Err(ZmqError::Incomplete)));

  // A complete message from a later peer is unaffected.
  raw_push_peer(&endpoint, &[(true, b"a"), (false, b"b")]).await?;
  let msg = recv_timeout(&pull, LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&msg), vec!["a", "b"]);

  ctx.close();
  Ok(())
}

#[tokio::test]
#[serial]
async fn test_incompatible_peers_never_exchange()-> Result<(), ZmqError> {
  let ctx = common::test_context();
  let (pull, endpoint) = bind_wildcard(&ctx, SocketType::Pull).await?;

  // DEALER and PULL do not match; the handshake is refused and the connecter keeps retrying.
  let dealer = ctx.socket(SocketType::Dealer)?;
  dealer.set_reconnect_ivl(50)?;
  dealer.connect(&endpoint).await?;
  dealer.send("lost").await?;

  assert!(matches!(recv_timeout(&pull, SHORT_TIMEOUT).await, Err(ZmqError::Timeout)));

  ctx.close();
  Ok(())
}

#[tokio::test]
#[serial]
async fn test_keepalive_options_apply() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let pull = ctx.socket(SocketType::Pull)?;
  pull.set_tcp_keepalive(1)?;
  pull.set_tcp_keepalive_idle(60)?;
  pull.set_tcp_keepalive_intvl(5)?;
  pull.set_tcp_keepalive_cnt(3)?;
  pull.bind(WILDCARD).await?;
  let endpoint = pull.last_endpoint()?;

  let push = ctx.socket(SocketType::Push)?;
  push.set_tcp_keepalive(0)?;
  push.connect(&endpoint).await?;
  push.send("alive").await?;
  assert!(recv_timeout(&pull, LONG_TIMEOUT).await.is_ok());

  ctx.close();
  Ok(())
}

#[cfg(all(unix, feature = "ipc"))]
#[tokio::test]
async fn test_ipc_round_trip() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let endpoint = common::unique_ipc_endpoint();

  let rep = ctx.bind(SocketType::Rep, &endpoint).await?;
  let req = ctx.connect(SocketType::Req, &endpoint).await?;
  req.send("over-ipc").await?;
  let request = recv_timeout(&rep, LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&request), vec!["over-ipc"]);
  rep.send("ack").await?;
  assert_eq!(common::frames_as_strings(&recv_timeout(&req, LONG_TIMEOUT).await?), vec!["ack"]);

  ctx.close();
  Ok(())
}

#[cfg(all(unix, feature = "ipc"))]
#[tokio::test]
async fn test_ipc_wildcard_creates_a_path() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let pull = ctx.bind(SocketType::Pull, "ipc://*").await?;
  let endpoint = pull.last_endpoint()?;
  let path = endpoint.strip_prefix("ipc://").expect("ipc endpoint");
  assert!(std::path::Path::new(path).exists());

  let push = ctx.connect(SocketType::Push, &endpoint).await?;
  push.send("hi").await?;
  assert!(recv_timeout(&pull, LONG_TIMEOUT).await.is_ok());

  ctx.close();
  Ok(())
}

/// The OS may hold on to a just-released port for a moment.
async fn bind_with_retry(ctx: &Context, socket_type: SocketType, endpoint: &str) -> Result<Socket, ZmqError> {
  let mut attempts = 0;
  loop {
    match ctx.bind(socket_type, endpoint).await {
      Err(ZmqError::AddrInUse(_)) if attempts < 20 => {
        attempts += 1;
        tokio::time::sleep(Duration::from_millis(50)).await;
      }
      other => return other,
    }
  }
}
