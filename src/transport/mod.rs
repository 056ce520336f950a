// src/transport/mod.rs

//! Endpoint handling for bind/connect: listeners, connecters and the reconnect policy.

pub(crate) mod endpoint;
pub(crate) mod inproc;
#[cfg(all(unix, feature = "ipc"))]
pub(crate) mod ipc;
pub(crate) mod socks;
pub(crate) mod tcp;

use crate::engine::{self, BoxedStream, EarlyPipe};
use crate::error::ZmqError;
use crate::socket::core::{EndpointRole, SocketCore};
use crate::socket::pipe::PeerInfo;
use endpoint::{parse_endpoint, Endpoint};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause after a failed accept (e.g. out of file descriptors) before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[async_trait]
pub(crate) trait Listener: Send + Sync + 'static {
  /// Waits for the next inbound stream; returns it with a printable peer address.
  async fn accept(&self) -> Result<(BoxedStream, String), ZmqError>;
}

#[async_trait]
pub(crate) trait Connector: Send + Sync + 'static {
  async fn connect(&self) -> Result<BoxedStream, ZmqError>;
}

/// Binds `uri` for `core` and returns the resolved endpoint.
pub(crate) async fn bind(core: &Arc<SocketCore>, uri: &str) -> Result<String, ZmqError> {
  let ctx = core.ensure_usable()?;
  let endpoint = parse_endpoint(uri)?;
  let token = core.token.child_token();

  let resolved = match endpoint {
    Endpoint::Inproc(name) => {
      let resolved = format!("inproc://{name}");
      inproc::bind(core, &ctx, &name, &resolved)?;
      core.register_endpoint(uri, &resolved, EndpointRole::Bound, token.clone());
      resolved
    }
    Endpoint::Tcp { host, port } => {
      let options = core.options();
      let uri_owned = uri.to_string();
      let listener = ctx
        .run_on_io(async move { tcp::TcpAcceptor::bind(&host, port, &options, &uri_owned).await })
        .await?;
      let resolved = listener.resolved().to_string();
      core.register_endpoint(uri, &resolved, EndpointRole::Bound, token.clone());
      ctx
        .runtime_handle()?
        .spawn(accept_loop(core.clone(), listener, resolved.clone(), token));
      resolved
    }
    #[cfg(all(unix, feature = "ipc"))]
    Endpoint::Ipc(path) => {
      let uri_owned = uri.to_string();
      let listener = ctx
        .run_on_io(async move { ipc::IpcAcceptor::bind(path, &uri_owned) })
        .await?;
      let resolved = listener.resolved().to_string();
      core.register_endpoint(uri, &resolved, EndpointRole::Bound, token.clone());
      ctx
        .runtime_handle()?
        .spawn(accept_loop(core.clone(), listener, resolved.clone(), token));
      resolved
    }
    #[cfg(not(all(unix, feature = "ipc")))]
    Endpoint::Ipc(_) => return Err(ZmqError::UnsupportedTransport(uri.to_string())),
  };
  tracing::info!(socket_handle = core.handle, endpoint = %resolved, "Bound");
  Ok(resolved)
}

/// Starts connecting `core` to `uri`. The connection itself is established in the
/// background and re-established after failures according to the reconnect options.
pub(crate) async fn connect(core: &Arc<SocketCore>, uri: &str) -> Result<String, ZmqError> {
  let ctx = core.ensure_usable()?;
  let endpoint = parse_endpoint(uri)?;
  let options = core.options();
  let token = core.token.child_token();

  #[cfg(not(all(unix, feature = "ipc")))]
  if let Endpoint::Ipc(_) = endpoint {
    return Err(ZmqError::UnsupportedTransport(uri.to_string()));
  }

  // Queue-while-disconnected pipe. Identity-routed sockets only get pipes for live peers.
  let raw = options.router_raw || core.socket_type.routes_by_identity();
  let early = if options.immediate || raw {
    None
  } else {
    let pipe_token = token.child_token();
    let (id, rx) = core.attach_pipe(uri, PeerInfo::default(), pipe_token.clone())?;
    Some(EarlyPipe {
      id,
      rx,
      token: pipe_token,
    })
  };

  core.register_endpoint(uri, uri, EndpointRole::Connected, token.clone());
  let started = match endpoint {
    Endpoint::Inproc(name) => inproc::connect(core, &ctx, &name, uri, token, early),
    Endpoint::Tcp { host, port } => {
      let connector = tcp::TcpConnector::new(host, port, &options, uri);
      ctx
        .runtime_handle()
        .map(|rt| drop(rt.spawn(connect_loop(core.clone(), connector, uri.to_string(), token, early))))
    }
    #[cfg(all(unix, feature = "ipc"))]
    Endpoint::Ipc(path) => {
      let connector = ipc::IpcConnector::new(path, uri);
      ctx
        .runtime_handle()
        .map(|rt| drop(rt.spawn(connect_loop(core.clone(), connector, uri.to_string(), token, early))))
    }
    #[cfg(not(all(unix, feature = "ipc")))]
    Endpoint::Ipc(_) => Err(ZmqError::UnsupportedTransport(uri.to_string())),
  };
  if let Err(e) = started {
    let _ = core.remove_endpoint(uri, EndpointRole::Connected);
    return Err(e);
  }
  tracing::info!(socket_handle = core.handle, endpoint = %uri, "Connecting");
  Ok(uri.to_string())
}

pub(crate) fn unbind(core: &SocketCore, uri: &str) -> Result<(), ZmqError> {
  let ctx = core.ensure_usable()?;
  // Release the name before the links drop, so re-armed connects do not find us again.
  if let Some(name) = uri.strip_prefix("inproc://") {
    ctx.unregister_inproc(name, core.handle);
  }
  let resolved = core.remove_endpoint(uri, EndpointRole::Bound)?;
  if let Some(name) = resolved.strip_prefix("inproc://") {
    ctx.unregister_inproc(name, core.handle);
  }
  Ok(())
}

pub(crate) fn disconnect(core: &SocketCore, uri: &str) -> Result<(), ZmqError> {
  core.ensure_usable()?;
  core.remove_endpoint(uri, EndpointRole::Connected).map(|_| ())
}

async fn accept_loop<L: Listener>(core: Arc<SocketCore>, listener: L, endpoint: String, token: CancellationToken) {
  loop {
    let accepted = tokio::select! {
      res = listener.accept() => res,
      _ = token.cancelled() => break,
    };
    match accepted {
      Ok((stream, peer)) => {
        tracing::debug!(socket_handle = core.handle, %endpoint, %peer, "Accepted connection");
        tokio::spawn(engine::run_connection(
          core.clone(),
          stream,
          endpoint.clone(),
          None,
          token.child_token(),
        ));
      }
      Err(e) => {
        tracing::warn!(socket_handle = core.handle, %endpoint, error = %e, "Accept failed");
        tokio::select! {
          _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
          _ = token.cancelled() => break,
        }
      }
    }
  }
  tracing::debug!(socket_handle = core.handle, %endpoint, "Listener stopped");
}

/// Next reconnect delay: doubles the previous one, capped by RECONNECT_IVL_MAX. A zero cap
/// keeps the interval constant.
pub(crate) fn next_backoff(current: Duration, base: Duration, max: Duration) -> Duration {
  if max.is_zero() {
    base
  } else {
    (current * 2).min(max.max(base))
  }
}

async fn connect_loop<C: Connector>(
  core: Arc<SocketCore>,
  connector: C,
  endpoint: String,
  token: CancellationToken,
  mut early: Option<EarlyPipe>,
) {
  let options = core.options();
  let mut delay = options.reconnect_ivl;

  loop {
    let attempt = tokio::select! {
      res = connector.connect() => res,
      _ = token.cancelled() => break,
    };
    match attempt {
      Ok(stream) => {
        tracing::debug!(socket_handle = core.handle, %endpoint, "Connected");
        delay = options.reconnect_ivl;
        early = engine::run_connection(core.clone(), stream, endpoint.clone(), early, token.child_token()).await;
        if early.as_ref().is_some_and(|pipe| pipe.token.is_cancelled()) {
          break;
        }
      }
      Err(e) => tracing::debug!(socket_handle = core.handle, %endpoint, error = %e, "Connect attempt failed"),
    }

    let (Some(wait), Some(base)) = (delay, options.reconnect_ivl) else {
      tracing::debug!(socket_handle = core.handle, %endpoint, "Reconnect disabled, giving up");
      break;
    };
    tokio::select! {
      _ = tokio::time::sleep(wait) => {}
      _ = token.cancelled() => break,
    }
    delay = Some(next_backoff(wait, base, options.reconnect_ivl_max));
  }

  if let Some(pipe) = early {
    core.detach_pipe(pipe.id);
  }
  tracing::debug!(socket_handle = core.handle, %endpoint, "Connecter stopped");
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backoff_doubles_up_to_cap() {
    let base = Duration::from_millis(100);
    let max = Duration::from_millis(350);
    let mut d = base;
    d = next_backoff(d, base, max);
    assert_eq!(d, Duration::from_millis(200));
    d = next_backoff(d, base, max);
    assert_eq!(d, max);
    assert_eq!(next_backoff(d, base, Duration::ZERO), base);
  }
}
