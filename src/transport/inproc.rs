// src/transport/inproc.rs

//! In-process transport. No bytes are serialized: each side's outbound pipe is drained by a
//! task that hands the frames straight to the other socket's inbound queue.

use crate::context::ContextInner;
use crate::engine::EarlyPipe;
use crate::error::ZmqError;
use crate::message::Frame;
use crate::socket::core::SocketCore;
use crate::socket::pipe::PeerInfo;

use async_channel::Receiver;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

/// A connect waiting for its name to be bound (or re-bound).
#[derive(Debug)]
pub(crate) struct PendingConnect {
  pub(crate) connector: Weak<SocketCore>,
  pub(crate) name: String,
  /// The URI as registered on the connecting socket.
  pub(crate) endpoint: String,
  /// The connecting socket's endpoint token; cancelled by disconnect or close.
  pub(crate) token: CancellationToken,
  pub(crate) early: Option<EarlyPipe>,
}

/// Claims `name` for `core` and links every connect that was waiting for it.
pub(crate) fn bind(core: &Arc<SocketCore>, ctx: &Arc<ContextInner>, name: &str, resolved: &str) -> Result<(), ZmqError> {
  let waiting = ctx.register_inproc(name, core)?;
  if !waiting.is_empty() {
    tracing::debug!(handle = core.handle, name, count = waiting.len(), "Linking deferred inproc connects");
  }
  for pending in waiting {
    link(ctx, core.clone(), resolved, pending);
  }
  Ok(())
}

/// Links to the binder of `name` right away, or parks the connect until it shows up.
pub(crate) fn connect(
  core: &Arc<SocketCore>,
  ctx: &Arc<ContextInner>,
  name: &str,
  uri: &str,
  token: CancellationToken,
  early: Option<EarlyPipe>,
) -> Result<(), ZmqError> {
  let pending = PendingConnect {
    connector: Arc::downgrade(core),
    name: name.to_string(),
    endpoint: uri.to_string(),
    token,
    early,
  };
  match ctx.lookup_or_defer_inproc(name, pending) {
    Some((binder, pending)) => link(ctx, binder, &format!("inproc://{name}"), pending),
    None => tracing::debug!(handle = core.handle, name, "Inproc name not bound yet, connect deferred"),
  }
  Ok(())
}

fn link(ctx: &Arc<ContextInner>, binder: Arc<SocketCore>, bound_endpoint: &str, pending: PendingConnect) {
  let Some(connector) = pending.connector.upgrade().filter(|c| !c.is_closed()) else {
    return;
  };
  if pending.token.is_cancelled() {
    return;
  }
  let Ok(rt) = ctx.runtime_handle() else {
    return;
  };

  if !connector.socket_type.is_compatible(binder.socket_type) {
    tracing::warn!(
      handle = connector.handle,
      name = %pending.name,
      local = %connector.socket_type,
      peer = %binder.socket_type,
      "Inproc peer has an incompatible socket type, dropping connect"
    );
    if let Some(early) = pending.early {
      connector.detach_pipe(early.id);
    }
    return;
  }

  let link_token = pending.token.child_token();
  let connector_view = PeerInfo {
    socket_type: Some(binder.socket_type),
    identity: binder.options().routing_id,
  };
  let binder_view = PeerInfo {
    socket_type: Some(connector.socket_type),
    identity: connector.options().routing_id,
  };

  let (connector_pipe, connector_rx, pipe_token) = match &pending.early {
    Some(early) => {
      connector.relink_pipe(early.id, connector_view);
      (early.id, early.rx.clone(), early.token.clone())
    }
    None => match connector.attach_pipe(&pending.endpoint, connector_view, link_token.clone()) {
      Ok((id, rx)) => (id, rx, link_token.clone()),
      Err(e) => {
        tracing::debug!(handle = connector.handle, error = %e, "Connector refused inproc pipe");
        return;
      }
    },
  };
  let (binder_pipe, binder_rx) = match binder.attach_pipe(bound_endpoint, binder_view, link_token.clone()) {
    Ok(attached) => attached,
    Err(e) => {
      tracing::debug!(handle = binder.handle, error = %e, "Binder refused inproc pipe");
      if pending.early.is_none() {
        connector.detach_pipe(connector_pipe);
      }
      return;
    }
  };
  tracing::debug!(
    connector = connector.handle,
    binder = binder.handle,
    name = %pending.name,
    "Inproc link established"
  );

  rt.spawn(async move {
    let watch = async {
      tokio::select! {
        _ = link_token.cancelled() => {}
        _ = pipe_token.cancelled() => {}
      }
      link_token.cancel();
    };
    tokio::join!(
      drive(connector_rx, &connector, &binder, binder_pipe, &link_token),
      drive(binder_rx, &binder, &connector, connector_pipe, &link_token),
      watch,
    );
    binder.detach_pipe(binder_pipe);

    let PendingConnect {
      name,
      endpoint,
      token,
      early,
      ..
    } = pending;
    let early = match early {
      Some(early) if early.token.is_cancelled() => {
        connector.detach_pipe(early.id);
        None
      }
      Some(early) => Some(early),
      None => {
        connector.detach_pipe(connector_pipe);
        None
      }
    };
    if token.is_cancelled() || connector.is_closed() {
      if let Some(early) = early {
        connector.detach_pipe(early.id);
      }
      return;
    }
    // The binder went away; wait for the name to be bound again.
    tracing::debug!(handle = connector.handle, %name, "Inproc peer gone, re-arming connect");
    match connector.context() {
      Ok(ctx) => {
        let _ = connect(&connector, &ctx, &name, &endpoint, token, early);
      }
      Err(_) => {
        if let Some(early) = early {
          connector.detach_pipe(early.id);
        }
      }
    }
  });
}

/// Moves messages from one socket's pipe into the other socket until either side stops.
async fn drive(
  rx: Receiver<Vec<Frame>>,
  from: &SocketCore,
  to: &SocketCore,
  to_pipe: usize,
  token: &CancellationToken,
) {
  loop {
    let frames = tokio::select! {
      msg = rx.recv() => match msg {
        Ok(frames) => frames,
        Err(_) => break,
      },
      _ = token.cancelled() => break,
    };
    from.notify_send_ready();
    let delivered = tokio::select! {
      res = to.ingress(to_pipe, frames, true) => res,
      _ = token.cancelled() => break,
    };
    if delivered.is_err() {
      break;
    }
  }
  token.cancel();
}
