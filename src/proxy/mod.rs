// src/proxy/mod.rs

//! Proxies (devices): relay whole messages between a frontend and a backend socket, optionally
//! copying every message to a capture socket.

pub(crate) mod pump;

use crate::context::Context;
use crate::error::ZmqError;
use crate::socket::{Socket, SocketType};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a [`Proxy`]. There is no way back from `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
  Created,
  Running,
  Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
  FrontendToBackend,
  BackendToFrontend,
}

/// Messages and payload bytes relayed in one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Traffic {
  pub messages: u64,
  pub bytes: u64,
}

#[derive(Debug, Default)]
pub struct ProxyStats {
  fwd_messages: AtomicU64,
  fwd_bytes: AtomicU64,
  back_messages: AtomicU64,
  back_bytes: AtomicU64,
}

impl ProxyStats {
  pub(crate) fn record(&self, direction: Direction, bytes: usize) {
    let (messages, total) = match direction {
      Direction::FrontendToBackend => (&self.fwd_messages, &self.fwd_bytes),
      Direction::BackendToFrontend => (&self.back_messages, &self.back_bytes),
    };
    messages.fetch_add(1, Ordering::Relaxed);
    total.fetch_add(bytes as u64, Ordering::Relaxed);
  }

  pub fn frontend_to_backend(&self) -> Traffic {
    Traffic {
      messages: self.fwd_messages.load(Ordering::Relaxed),
      bytes: self.fwd_bytes.load(Ordering::Relaxed),
    }
  }

  pub fn backend_to_frontend(&self) -> Traffic {
    Traffic {
      messages: self.back_messages.load(Ordering::Relaxed),
      bytes: self.back_bytes.load(Ordering::Relaxed),
    }
  }
}

enum Driver {
  Idle,
  Pump {
    token: CancellationToken,
    task: JoinHandle<Result<(), ZmqError>>,
  },
  Steerable(pump::Steerable),
}

struct ProxyRun {
  state: ProxyState,
  driver: Driver,
}

/// A relay between two sockets running on the context's I/O runtime.
///
/// `start` runs the pump until `stop`; `start_steerable` runs it under a control PAIR socket
/// instead. Whichever way it was started, `stop` ends it. Dropping a running proxy stops it.
pub struct Proxy {
  ctx: Context,
  frontend: Socket,
  backend: Socket,
  capture: Option<Socket>,
  run: Mutex<ProxyRun>,
  stats: Arc<ProxyStats>,
}

impl Proxy {
  /// The sockets should already be bound or connected.
  pub fn new(ctx: &Context, frontend: Socket, backend: Socket, capture: Option<Socket>) -> Self {
    Self {
      ctx: ctx.clone(),
      frontend,
      backend,
      capture,
      run: Mutex::new(ProxyRun {
        state: ProxyState::Created,
        driver: Driver::Idle,
      }),
      stats: Arc::new(ProxyStats::default()),
    }
  }

  fn legs(&self) -> pump::ProxyLegs {
    pump::ProxyLegs::new(&self.frontend, &self.backend, self.capture.as_ref())
  }

  /// Starts relaying in the background. A no-op while running; a stopped proxy cannot be
  /// restarted (`InvalidState`).
  pub fn start(&self) -> Result<(), ZmqError> {
    let mut run = self.run.lock();
    match run.state {
      ProxyState::Running => return Ok(()),
      ProxyState::Stopped => return Err(ZmqError::InvalidState("proxy was stopped and cannot be restarted")),
      ProxyState::Created => {}
    }
    let runtime = self.ctx.inner().runtime_handle()?;
    let token = self.ctx.inner().shutdown_token().child_token();
    let task = runtime.spawn(pump::run(self.legs(), token.clone(), self.stats.clone()));
    run.driver = Driver::Pump { token, task };
    run.state = ProxyState::Running;
    tracing::info!(frontend = ?self.frontend, backend = ?self.backend, "Proxy started");
    Ok(())
  }

  /// Starts relaying under a control channel; `stop` then sends the terminate message.
  pub async fn start_steerable(&self) -> Result<(), ZmqError> {
    {
      let run = self.run.lock();
      match run.state {
        ProxyState::Running => return Ok(()),
        ProxyState::Stopped => return Err(ZmqError::InvalidState("proxy was stopped and cannot be restarted")),
        ProxyState::Created => {}
      }
    }
    let steerable = pump::spawn_steerable(&self.ctx, self.legs(), self.stats.clone()).await?;

    let mut run = self.run.lock();
    if run.state != ProxyState::Created {
      // Lost a race with another start; stop the relay we just made.
      steerable.token.cancel();
      return Ok(());
    }
    run.driver = Driver::Steerable(steerable);
    run.state = ProxyState::Running;
    tracing::info!(frontend = ?self.frontend, backend = ?self.backend, "Steerable proxy started");
    Ok(())
  }

  /// Stops relaying. A no-op unless running. Messages already in flight may still arrive.
  pub fn stop(&self) -> Result<(), ZmqError> {
    let mut run = self.run.lock();
    if run.state != ProxyState::Running {
      return Ok(());
    }
    run.state = ProxyState::Stopped;
    match std::mem::replace(&mut run.driver, Driver::Idle) {
      Driver::Pump { token, .. } => token.cancel(),
      Driver::Steerable(steerable) => {
        if let Err(e) = steerable.control.try_send(pump::terminate_message()) {
          tracing::debug!(error = %e, "Could not deliver terminate to steerable proxy");
        }
        // The control socket closes right after this, which may discard the message in flight.
        steerable.token.cancel();
      }
      Driver::Idle => {}
    }
    tracing::info!("Proxy stopped");
    Ok(())
  }

  pub fn state(&self) -> ProxyState {
    self.run.lock().state
  }

  /// True between a successful start and `stop`, unless the relay ended by itself (a leg was
  /// closed, or a steerable proxy received a terminate message from elsewhere).
  pub fn is_running(&self) -> bool {
    let run = self.run.lock();
    match &run.driver {
      Driver::Pump { task, .. } => !task.is_finished(),
      Driver::Steerable(steerable) => !steerable.is_finished(),
      Driver::Idle => false,
    }
  }

  pub fn stats(&self) -> &ProxyStats {
    &self.stats
  }

  pub fn frontend(&self) -> &Socket {
    &self.frontend
  }

  pub fn backend(&self) -> &Socket {
    &self.backend
  }

  pub fn capture(&self) -> Option<&Socket> {
    self.capture.as_ref()
  }
}

impl Drop for Proxy {
  fn drop(&mut self) {
    let _ = self.stop();
  }
}

impl std::fmt::Debug for Proxy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Proxy")
      .field("frontend", &self.frontend)
      .field("backend", &self.backend)
      .field("capture", &self.capture)
      .field("state", &self.state())
      .finish()
  }
}

/// The classic device wirings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyPattern {
  /// ROUTER frontend, DEALER backend: request/reply load balancing.
  Queue,
  /// SUB frontend (subscribed to everything), PUB backend: topic fan-out.
  Forwarder,
  /// PULL frontend, PUSH backend: work distribution.
  Streamer,
}

impl ProxyPattern {
  /// (frontend, backend) socket types.
  pub fn socket_types(self) -> (SocketType, SocketType) {
    match self {
      ProxyPattern::Queue => (SocketType::Router, SocketType::Dealer),
      ProxyPattern::Forwarder => (SocketType::Sub, SocketType::Pub),
      ProxyPattern::Streamer => (SocketType::Pull, SocketType::Push),
    }
  }

  /// Binds both legs and wraps them in a (not yet started) proxy.
  pub async fn create(self, ctx: &Context, frontend_url: &str, backend_url: &str) -> Result<Proxy, ZmqError> {
    let (front_type, back_type) = self.socket_types();
    let frontend = ctx.bind(front_type, frontend_url).await?;
    let backend = ctx.bind(back_type, backend_url).await?;
    if self == ProxyPattern::Forwarder {
      frontend.subscribe(b"")?;
    }
    tracing::debug!(pattern = ?self, %frontend_url, %backend_url, "Proxy sockets bound");
    Ok(Proxy::new(ctx, frontend, backend, None))
  }
}
