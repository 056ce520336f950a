// tests/common.rs
#![allow(dead_code)]

use zsock::{Context, Message, Socket, ZmqError};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::Duration;

use tokio::time::timeout;

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(250);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(3);
/// Time given to subscriptions and background connects to settle.
pub const SETTLE: Duration = Duration::from_millis(100);

static IPC_ENDPOINT_COUNTER: AtomicUsize = AtomicUsize::new(0);
static INPROC_ENDPOINT_COUNTER: AtomicUsize = AtomicUsize::new(0);

static TRACING_INIT: Once = Once::new();

fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // RUST_LOG overrides the default.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zsock=debug,warn"));

    let subscriber = FmtSubscriber::builder()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer()
      .finish();

    // Another test binary thread may have won the race; that's fine.
    let _ = tracing::subscriber::set_global_default(subscriber);
  });
}

pub fn test_context() -> Context {
  setup_tracing();
  Context::new().expect("Failed to create test context")
}

pub fn unique_ipc_endpoint() -> String {
  let pid = std::process::id();
  let count = IPC_ENDPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
  let path = std::env::temp_dir().join(format!("zsock_test_{}_{}.ipc", pid, count));
  format!("ipc://{}", path.display())
}

pub fn unique_inproc_endpoint() -> String {
  let pid = std::process::id();
  let count = INPROC_ENDPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
  format!("inproc://zsock_test_{}_{}", pid, count)
}

/// `recv` bounded by `duration`, mapping the elapsed case to `Timeout`.
pub async fn recv_timeout(socket: &Socket, duration: Duration) -> Result<Message, ZmqError> {
  match timeout(duration, socket.recv()).await {
    Ok(result) => result,
    Err(_) => Err(ZmqError::Timeout),
  }
}

/// Payload of every frame as UTF-8 text.
pub fn frames_as_strings(msg: &Message) -> Vec<String> {
  msg.iter().map(|f| String::from_utf8_lossy(f.data()).into_owned()).collect()
}

/// Sends `msg` repeatedly until the peer answers, for connections that are still being set up
/// (subscriptions in flight, TCP handshakes). Returns the first reply.
pub async fn send_until_received(
  sender: &Socket,
  receiver: &Socket,
  msg: impl Into<Message>,
  overall: Duration,
) -> Result<Message, ZmqError> {
  let msg = msg.into();
  let deadline = tokio::time::Instant::now() + overall;
  loop {
    sender.send(msg.clone()).await?;
    match recv_timeout(receiver, Duration::from_millis(50)).await {
      Ok(reply) => return Ok(reply),
      Err(ZmqError::Timeout) if tokio::time::Instant::now() < deadline => continue,
      Err(e) => return Err(e),
    }
  }
}
