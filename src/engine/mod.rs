// src/engine/mod.rs

//! Per-connection engines for the stream transports (TCP and IPC).
//!
//! An engine owns one byte stream. It performs the handshake, attaches a pipe to the socket
//! core and then moves messages both ways until the connection ends or is cancelled.

pub(crate) mod session;
pub(crate) mod stream_session;

use crate::message::Frame;
use crate::socket::core::SocketCore;
use crate::socket::types::SocketType;

use async_channel::Receiver;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

/// Byte stream an engine runs over.
pub(crate) trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> AsyncStream for T {}

pub(crate) type BoxedStream = Box<dyn AsyncStream>;

/// A pipe created at connect time (IMMEDIATE off) that outlives individual connections, so
/// messages queued while disconnected go out once a connection is up.
#[derive(Debug)]
pub(crate) struct EarlyPipe {
  pub id: usize,
  pub rx: Receiver<Vec<Frame>>,
  pub token: CancellationToken,
}

/// Runs one connection to completion. Hands the early pipe back (if one was lent) so the
/// connecter can reuse it for the next connection.
pub(crate) async fn run_connection(
  core: Arc<SocketCore>,
  stream: BoxedStream,
  endpoint: String,
  early: Option<EarlyPipe>,
  token: CancellationToken,
) -> Option<EarlyPipe> {
  let raw = core.socket_type == SocketType::Stream || core.options().router_raw;
  if raw {
    stream_session::run(core, stream, endpoint, token).await;
    early
  } else {
    session::run(core, stream, endpoint, early, token).await
  }
}
