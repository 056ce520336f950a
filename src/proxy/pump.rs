// src/proxy/pump.rs

//! The relay loop shared by `Context::proxy`, `Context::proxy_steerable` and `Proxy`.

use crate::context::Context;
use crate::error::ZmqError;
use crate::message::{Message, SendFlags};
use crate::proxy::{Direction, ProxyStats};
use crate::socket::core::SocketCore;
use crate::socket::{Socket, SocketType};
use crate::transport;

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Upper bound on how long one iteration waits for traffic before re-checking for a stop.
pub(crate) const PUMP_TICK: Duration = Duration::from_millis(100);

/// The sockets a pump moves messages between.
#[derive(Clone)]
pub(crate) struct ProxyLegs {
  frontend: Arc<SocketCore>,
  backend: Arc<SocketCore>,
  capture: Option<Arc<SocketCore>>,
}

impl ProxyLegs {
  pub(crate) fn new(frontend: &Socket, backend: &Socket, capture: Option<&Socket>) -> Self {
    Self {
      frontend: frontend.core().clone(),
      backend: backend.core().clone(),
      capture: capture.map(|c| c.core().clone()),
    }
  }
}

/// Relays until `token` is cancelled. Errors from a closed leg end the loop; a cancelled
/// token always ends it with `Ok`.
pub(crate) async fn run(legs: ProxyLegs, token: CancellationToken, stats: Arc<ProxyStats>) -> Result<(), ZmqError> {
  tracing::debug!(
    frontend = legs.frontend.handle,
    backend = legs.backend.handle,
    capture = ?legs.capture.as_ref().map(|c| c.handle),
    "Proxy pump started"
  );
  let result = pump(&legs, &token, &stats).await;
  match result {
    Err(_) if token.is_cancelled() => Ok(()),
    Err(e) => {
      tracing::warn!(error = %e, "Proxy pump stopped on error");
      Err(e)
    }
    Ok(()) => {
      tracing::debug!("Proxy pump stopped");
      Ok(())
    }
  }
}

async fn pump(legs: &ProxyLegs, token: &CancellationToken, stats: &ProxyStats) -> Result<(), ZmqError> {
  loop {
    let deadline = Instant::now() + PUMP_TICK;
    let woke = tokio::select! {
      biased;
      _ = token.cancelled() => return Ok(()),
      res = legs.frontend.wait_readable(Some(deadline)) => res?,
      res = legs.backend.wait_readable(Some(deadline)) => res?,
    };
    if !woke {
      continue;
    }
    forward_one(legs, Direction::FrontendToBackend, token, stats).await?;
    forward_one(legs, Direction::BackendToFrontend, token, stats).await?;
  }
}

/// Moves at most one whole message in `direction`.
async fn forward_one(
  legs: &ProxyLegs,
  direction: Direction,
  token: &CancellationToken,
  stats: &ProxyStats,
) -> Result<(), ZmqError> {
  let (from, to) = match direction {
    Direction::FrontendToBackend => (&legs.frontend, &legs.backend),
    Direction::BackendToFrontend => (&legs.backend, &legs.frontend),
  };
  if !from.poll(0).await? {
    return Ok(());
  }
  let msg = match from.receive_message() {
    Ok(Some(msg)) => msg,
    Ok(None) => return Ok(()),
    Err(ZmqError::Incomplete) => {
      tracing::debug!(?direction, "Proxy skipped a truncated message");
      return Ok(());
    }
    Err(e) => return Err(e),
  };

  if let Some(capture) = &legs.capture {
    if let Err(e) = capture.try_send(msg.clone()) {
      tracing::trace!(?direction, error = %e, "Capture socket did not take a message copy");
    }
  }

  let bytes = msg.byte_len();
  let sent = tokio::select! {
    res = to.send(msg, SendFlags::empty()) => res,
    _ = token.cancelled() => return Ok(()),
  };
  match sent {
    Ok(_) => stats.record(direction, bytes),
    Err(e @ (ZmqError::SocketClosed | ZmqError::InvalidContext)) => return Err(e),
    Err(e) => tracing::debug!(?direction, error = %e, "Proxy dropped a message it could not forward"),
  }
  Ok(())
}

/// A pump started by [`spawn_steerable`].
pub(crate) struct Steerable {
  /// The caller's end of the control channel.
  pub control: Socket,
  /// Cancels the pump directly, without going through the control channel.
  pub token: CancellationToken,
  pub task: JoinHandle<Result<(), ZmqError>>,
}

impl Steerable {
  /// Whether the pump has already ended (terminated, cancelled or failed).
  pub fn is_finished(&self) -> bool {
    self.task.is_finished()
  }
}

/// Starts a pump on the I/O runtime, controlled through a PAIR pair on a private inproc
/// address. Any message sent on the returned control socket stops the pump.
pub(crate) async fn spawn_steerable(ctx: &Context, legs: ProxyLegs, stats: Arc<ProxyStats>) -> Result<Steerable, ZmqError> {
  let inner = ctx.inner();
  let suffix: u64 = rand::rng().random();
  let endpoint = format!("inproc://zsock-proxy-control-{suffix:016x}");

  // The internal end is a bare core so the running pump does not pin the context.
  let internal = inner.create_core(SocketType::Pair)?;
  if let Err(e) = transport::bind(&internal, &endpoint).await {
    internal.shutdown();
    return Err(e);
  }
  let control = match ctx.connect(SocketType::Pair, &endpoint).await {
    Ok(control) => control,
    Err(e) => {
      internal.shutdown();
      return Err(e);
    }
  };

  let token = inner.shutdown_token().child_token();
  let pump_token = token.clone();
  let runtime = inner.runtime_handle()?;
  let task = runtime.spawn(async move {
    let result = tokio::select! {
      res = run(legs, token.clone(), stats) => res,
      _ = token.cancelled() => Ok(()),
      cmd = internal.recv() => {
        match cmd {
          Ok(msg) => tracing::debug!(frames = msg.len(), "Steerable proxy received terminate"),
          Err(e) => tracing::debug!(error = %e, "Steerable proxy control channel closed"),
        }
        Ok(())
      }
    };
    token.cancel();
    internal.shutdown();
    result
  });
  Ok(Steerable {
    control,
    token: pump_token,
    task,
  })
}

/// Builds the terminate message for a steerable proxy's control socket.
pub(crate) fn terminate_message() -> Message {
  Message::from("TERMINATE")
}
