// src/socket/patterns/router.rs

use crate::error::ZmqError;
use crate::message::multipart::normalize_more;
use crate::message::{Blob, Frame, FrameFlags};
use crate::socket::options::SocketOptions;
use crate::socket::patterns::{SendOutcome, SocketPattern};
use crate::socket::pipe::{PipeSend, PipeTable};
use crate::socket::types::SocketType;

/// ROUTER and STREAM: every pipe gets an identity; inbound messages are prefixed with it and
/// outbound messages are routed by their first frame.
#[derive(Debug)]
pub(crate) struct RouterPattern {
  socket_type: SocketType,
  next_id: u32,
}

impl RouterPattern {
  pub fn new(socket_type: SocketType) -> Self {
    Self {
      socket_type,
      next_id: rand::random(),
    }
  }

  /// Generated identities start with a zero byte, which user identities may not.
  fn generate_identity(&mut self, pipes: &PipeTable) -> Blob {
    loop {
      self.next_id = self.next_id.wrapping_add(1);
      let mut id = Vec::with_capacity(5);
      id.push(0u8);
      id.extend_from_slice(&self.next_id.to_be_bytes());
      if pipes.lookup_identity(&id).is_none() {
        return Blob::from(id);
      }
    }
  }
}

impl SocketPattern for RouterPattern {
  fn pipe_attached(&mut self, pipes: &mut PipeTable, pipe_id: usize, options: &SocketOptions) {
    let raw = self.socket_type == SocketType::Stream || options.router_raw;
    let announced = pipes
      .get(pipe_id)
      .and_then(|p| p.peer.identity.clone())
      .filter(|id| !id.is_empty() && !raw);

    let identity = match announced {
      Some(id) if pipes.lookup_identity(&id).is_none() => id,
      Some(id) if options.router_handover => {
        if let Some(previous) = pipes.unbind_identity(&id) {
          tracing::debug!(pipe_id, previous, identity = %id.display_lossy(), "Identity handed over");
          if let Some(old) = pipes.get(previous) {
            old.token.cancel();
          }
        }
        id
      }
      Some(id) => {
        tracing::debug!(pipe_id, identity = %id.display_lossy(), "Identity already in use, generating one");
        self.generate_identity(pipes)
      }
      None => self.generate_identity(pipes),
    };
    pipes.bind_identity(pipe_id, identity);
  }

  fn on_ingress(&mut self, pipes: &mut PipeTable, pipe_id: usize, mut frames: Vec<Frame>) -> Option<Vec<Frame>> {
    let identity = pipes.get(pipe_id).and_then(|p| p.routing_id.clone())?;
    frames.insert(0, Frame::new(identity.to_bytes()).with_flags(FrameFlags::MORE));
    Some(frames)
  }

  fn send(
    &mut self,
    pipes: &mut PipeTable,
    frames: Vec<Frame>,
    options: &SocketOptions,
  ) -> Result<SendOutcome, ZmqError> {
    if frames.len() < 2 {
      return Err(ZmqError::InvalidMessage(format!(
        "{} messages need an identity frame followed by at least one body frame",
        self.socket_type
      )));
    }
    let identity = frames[0].data();
    let mandatory = options.router_mandatory || self.socket_type == SocketType::Stream;

    let Some(pipe) = pipes.lookup_identity(identity).and_then(|id| pipes.get(id)) else {
      if mandatory {
        return Err(ZmqError::Unroutable(Blob::from(identity).display_lossy()));
      }
      tracing::trace!(identity = %Blob::from(identity).display_lossy(), "Dropping unroutable message");
      return Ok(SendOutcome::Sent);
    };

    let mut body: Vec<Frame> = frames[1..].to_vec();
    normalize_more(&mut body);
    match pipe.try_send(body) {
      PipeSend::Sent | PipeSend::Closed(_) => Ok(SendOutcome::Sent),
      PipeSend::Full(_) if mandatory => Ok(SendOutcome::Blocked(frames)),
      PipeSend::Full(_) => {
        tracing::trace!(pipe_id = pipe.id, "Peer at HWM, dropping message");
        Ok(SendOutcome::Sent)
      }
    }
  }

  fn writable(&self, _pipes: &PipeTable) -> bool {
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::socket::pipe::{pipe_channel, PeerInfo, PipeHandle};
  use tokio_util::sync::CancellationToken;

  fn attach(
    router: &mut RouterPattern,
    table: &mut PipeTable,
    id: usize,
    identity: Option<&'static [u8]>,
    options: &SocketOptions,
  ) -> async_channel::Receiver<Vec<Frame>> {
    let (tx, rx) = pipe_channel(1, false);
    let peer = PeerInfo {
      socket_type: Some(SocketType::Dealer),
      identity: identity.map(Blob::from_static),
    };
    table.insert(PipeHandle::new(id, "inproc://rt".into(), peer, tx, CancellationToken::new(), false));
    router.pipe_attached(table, id, options);
    rx
  }

  #[test]
  fn announced_identity_is_used_and_prefixed() {
    let opts = SocketOptions::default();
    let mut table = PipeTable::default();
    let mut router = RouterPattern::new(SocketType::Router);
    let rx = attach(&mut router, &mut table, 1, Some(&b"D1"[..]), &opts);
    let inbound = router.on_ingress(&mut table, 1, vec![Frame::from("hello")]).unwrap();
    assert_eq!(inbound[0].data(), b"D1");
    assert!(inbound[0].is_more());

    router
      .send(&mut table, vec![Frame::from("D1"), Frame::from("world")], &opts)
      .unwrap();
    let wire = rx.try_recv().unwrap();
    assert_eq!(wire.len(), 1);
    assert_eq!(wire[0].data(), b"world");
  }

  #[test]
  fn duplicate_identity_gets_generated_one_unless_handover() {
    let mut opts = SocketOptions::default();
    let mut table = PipeTable::default();
    let mut router = RouterPattern::new(SocketType::Router);
    let _a = attach(&mut router, &mut table, 1, Some(&b"same"[..]), &opts);
    let _b = attach(&mut router, &mut table, 2, Some(&b"same"[..]), &opts);
    let generated = table.get(2).and_then(|p| p.routing_id.clone()).unwrap();
    assert_eq!(generated.size(), 5);
    assert_eq!(generated[0], 0);

    opts.router_handover = true;
    let _c = attach(&mut router, &mut table, 3, Some(&b"same"[..]), &opts);
    assert_eq!(table.lookup_identity(b"same"), Some(3));
  }

  #[test]
  fn unknown_identity_is_dropped_or_unroutable() {
    let mut opts = SocketOptions::default();
    let mut table = PipeTable::default();
    let mut router = RouterPattern::new(SocketType::Router);
    let msg = || vec![Frame::from("ghost"), Frame::from("boo")];
    assert!(matches!(router.send(&mut table, msg(), &opts), Ok(SendOutcome::Sent)));
    opts.router_mandatory = true;
    assert!(matches!(router.send(&mut table, msg(), &opts), Err(ZmqError::Unroutable(_))));
  }

  #[test]
  fn mandatory_router_blocks_on_full_peer() {
    let mut opts = SocketOptions::default();
    opts.router_mandatory = true;
    let mut table = PipeTable::default();
    let mut router = RouterPattern::new(SocketType::Router);
    let _rx = attach(&mut router, &mut table, 1, Some(&b"W"[..]), &opts);
    let msg = || vec![Frame::from("W"), Frame::from("job")];
    assert!(matches!(router.send(&mut table, msg(), &opts), Ok(SendOutcome::Sent)));
    assert!(matches!(router.send(&mut table, msg(), &opts), Ok(SendOutcome::Blocked(_))));
  }
}
