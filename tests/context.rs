// tests/context.rs

use std::time::Duration;
use zsock::{Context, ContextConfig, SocketType, ZmqError};
mod common;

use common::{recv_timeout, LONG_TIMEOUT, SHORT_TIMEOUT};

#[tokio::test]
async fn test_close_is_idempotent() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  assert!(!ctx.is_closed());
  ctx.close();
  ctx.close();
  assert!(ctx.is_closed());
  assert!(matches!(ctx.socket(SocketType::Pair), Err(ZmqError::InvalidContext)));
  assert!(matches!(
    ctx.bind(SocketType::Pull, &common::unique_inproc_endpoint()).await,
    Err(ZmqError::InvalidContext)
  ));
  Ok(())
}

#[tokio::test]
async fn test_close_shuts_down_sockets() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let endpoint = common::unique_inproc_endpoint();
  let pull = ctx.bind(SocketType::Pull, &endpoint).await?;

  // A receiver parked in recv is woken by the close.
  let waiter = {
    let pull = pull.clone();
    tokio::spawn(async move { pull.recv().await })
  };
  tokio::time::sleep(Duration::from_millis(20)).await;
  ctx.close();

  let woken = tokio::time::timeout(LONG_TIMEOUT, waiter)
    .await
    .expect("recv should return after close")
    .expect("task panicked");
  assert!(matches!(woken, Err(ZmqError::SocketClosed | ZmqError::InvalidContext)), "got {woken:?}");

  assert!(pull.is_closed());
  assert!(matches!(pull.send("x").await, Err(ZmqError::SocketClosed | ZmqError::InvalidContext)));
  Ok(())
}

#[tokio::test]
async fn test_max_sockets() -> Result<(), ZmqError> {
  let ctx = Context::with_config(ContextConfig::default().max_sockets(2))?;
  assert_eq!(ctx.max_sockets(), 2);

  let first = ctx.socket(SocketType::Pair)?;
  let _second = ctx.socket(SocketType::Pair)?;
  assert_eq!(ctx.socket_count(), 2);
  assert!(matches!(ctx.socket(SocketType::Pair), Err(ZmqError::TooManySockets(2))));

  // Closing one frees its slot.
  first.close().await?;
  let _third = ctx.socket(SocketType::Pair)?;
  assert_eq!(ctx.socket_count(), 2);

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_io_threads_config() -> Result<(), ZmqError> {
  let ctx = Context::with_config(ContextConfig::default().io_threads(3))?;
  assert_eq!(ctx.io_threads(), 3);
  assert_eq!(Context::new()?.io_threads(), 1);
  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_inproc_name_is_exclusive() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let endpoint = common::unique_inproc_endpoint();

  let first = ctx.bind(SocketType::Pull, &endpoint).await?;
  let second = ctx.socket(SocketType::Pull)?;
  assert!(matches!(second.bind(&endpoint).await, Err(ZmqError::AddrInUse(_))));

  // Released by unbind.
  first.unbind(&endpoint).await?;
  second.bind(&endpoint).await?;
  assert!(matches!(first.unbind(&endpoint).await, Err(ZmqError::EndpointNotFound(_))));

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_inproc_names_are_per_context() -> Result<(), ZmqError> {
  let a = common::test_context();
  let b = common::test_context();
  let endpoint = common::unique_inproc_endpoint();

  let _pa = a.bind(SocketType::Pull, &endpoint).await?;
  let _pb = b.bind(SocketType::Pull, &endpoint).await?;

  a.close();
  b.close();
  Ok(())
}

#[tokio::test]
async fn test_connect_before_bind() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let endpoint = common::unique_inproc_endpoint();

  let push = ctx.connect(SocketType::Push, &endpoint).await?;
  // Queued on the not-yet-linked pipe.
  push.send("early-1").await?;
  push.send("early-2").await?;

  let pull = ctx.bind(SocketType::Pull, &endpoint).await?;
  let first = recv_timeout(&pull, LONG_TIMEOUT).await?;
  let second = recv_timeout(&pull, LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&first), vec!["early-1"]);
  assert_eq!(common::frames_as_strings(&second), vec!["early-2"]);

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_inproc_relinks_after_rebind() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let endpoint = common::unique_inproc_endpoint();

  let push = ctx.connect(SocketType::Push, &endpoint).await?;
  let pull = ctx.bind(SocketType::Pull, &endpoint).await?;
  push.send("one").await?;
  assert_eq!(common::frames_as_strings(&recv_timeout(&pull, LONG_TIMEOUT).await?), vec!["one"]);

  pull.close().await?;
  tokio::time::sleep(common::SETTLE).await;

  let replacement = ctx.bind(SocketType::Pull, &endpoint).await?;
  let msg = common::send_until_received(&push, &replacement, "two", LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&msg), vec!["two"]);

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_disconnect_stops_delivery() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let endpoint = common::unique_inproc_endpoint();

  let pull = ctx.bind(SocketType::Pull, &endpoint).await?;
  let push = ctx.connect(SocketType::Push, &endpoint).await?;
  push.send("before").await?;
  assert!(recv_timeout(&pull, LONG_TIMEOUT).await.is_ok());

  push.disconnect(&endpoint).await?;
  tokio::time::sleep(common::SETTLE).await;
  push.set_sndtimeo(0)?;
  assert!(matches!(push.send("after").await, Err(ZmqError::WouldBlock)));
  assert!(matches!(recv_timeout(&pull, SHORT_TIMEOUT).await, Err(ZmqError::Timeout)));
  assert!(matches!(push.disconnect(&endpoint).await, Err(ZmqError::EndpointNotFound(_))));

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_sockets_keep_context_alive() -> Result<(), ZmqError> {
  let endpoint = common::unique_inproc_endpoint();
  let pull = {
    let ctx = common::test_context();
    ctx.bind(SocketType::Pull, &endpoint).await?
  };
  // The context handle is gone, but the socket still holds it.
  let ctx = pull.context().clone();
  assert!(!ctx.is_closed());
  let push = ctx.connect(SocketType::Push, &endpoint).await?;
  push.send("still here").await?;
  assert!(recv_timeout(&pull, LONG_TIMEOUT).await.is_ok());
  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_invalid_endpoints() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Pair)?;
  assert!(matches!(socket.bind("bogus").await, Err(ZmqError::InvalidEndpoint(_))));
  assert!(matches!(socket.bind("pgm://eth0;239.1.1.1:5555").await, Err(ZmqError::UnsupportedTransport(_))));
  assert!(matches!(socket.connect("inproc://").await, Err(ZmqError::InvalidEndpoint(_))));
  assert!(matches!(socket.connect("tcp://127.0.0.1:notaport").await, Err(ZmqError::InvalidEndpoint(_))));
  ctx.close();
  Ok(())
}

#[test]
fn test_blocking_callers_with_block_on() {
  let ctx = common::test_context();
  let endpoint = common::unique_inproc_endpoint();
  tokio_test::block_on(async {
    let pull = ctx.bind(SocketType::Pull, &endpoint).await?;
    let push = ctx.connect(SocketType::Push, &endpoint).await?;
    push.try_send("sync")?;
    let msg = recv_timeout(&pull, LONG_TIMEOUT).await?;
    assert_eq!(common::frames_as_strings(&msg), vec!["sync"]);
    Ok::<_, ZmqError>(())
  })
  .expect("block_on round trip");
  ctx.close();
}
