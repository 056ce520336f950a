// src/socket/pipe.rs

use crate::message::{Blob, Frame};
use crate::socket::types::SocketType;
use async_channel::{Receiver, Sender, TrySendError};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// What the peer told us about itself during the handshake (or inproc attach).
#[derive(Debug, Clone, Default)]
pub(crate) struct PeerInfo {
  pub socket_type: Option<SocketType>,
  pub identity: Option<Blob>,
}

pub(crate) enum PipeSend {
  Sent,
  Full(Vec<Frame>),
  Closed(Vec<Frame>),
}

/// Creates the outbound channel of a pipe. `hwm == 0` is unbounded.
pub(crate) fn pipe_channel(hwm: usize, conflate: bool) -> (Sender<Vec<Frame>>, Receiver<Vec<Frame>>) {
  if conflate {
    async_channel::bounded(1)
  } else if hwm == 0 {
    async_channel::unbounded()
  } else {
    async_channel::bounded(hwm)
  }
}

/// The socket's end of one connection: an outbound queue drained by a transport task.
#[derive(Debug)]
pub(crate) struct PipeHandle {
  pub id: usize,
  pub endpoint: String,
  pub peer: PeerInfo,
  /// Identity ROUTER-like sockets use to address this pipe.
  pub routing_id: Option<Blob>,
  /// Cancelling tears the connection down (shared with the peer for inproc).
  pub token: CancellationToken,
  tx: Sender<Vec<Frame>>,
  conflate: bool,
}

impl PipeHandle {
  pub fn new(
    id: usize,
    endpoint: String,
    peer: PeerInfo,
    tx: Sender<Vec<Frame>>,
    token: CancellationToken,
    conflate: bool,
  ) -> Self {
    Self {
      id,
      endpoint,
      peer,
      routing_id: None,
      token,
      tx,
      conflate,
    }
  }

  pub fn try_send(&self, frames: Vec<Frame>) -> PipeSend {
    if self.conflate {
      return match self.tx.force_send(frames) {
        Ok(_) => PipeSend::Sent,
        Err(e) => PipeSend::Closed(e.into_inner()),
      };
    }
    match self.tx.try_send(frames) {
      Ok(()) => PipeSend::Sent,
      Err(TrySendError::Full(frames)) => PipeSend::Full(frames),
      Err(TrySendError::Closed(frames)) => PipeSend::Closed(frames),
    }
  }

  pub fn is_full(&self) -> bool {
    !self.conflate && self.tx.is_full()
  }

  pub fn queued(&self) -> usize {
    self.tx.len()
  }
}

/// All pipes of a socket plus the round-robin cursor and identity index.
#[derive(Debug, Default)]
pub(crate) struct PipeTable {
  pipes: Vec<PipeHandle>,
  cursor: usize,
  by_identity: HashMap<Blob, usize>,
}

impl PipeTable {
  pub fn insert(&mut self, pipe: PipeHandle) {
    self.pipes.push(pipe);
  }

  pub fn remove(&mut self, id: usize) -> Option<PipeHandle> {
    let pos = self.pipes.iter().position(|p| p.id == id)?;
    let pipe = self.pipes.remove(pos);
    if pos < self.cursor {
      self.cursor -= 1;
    }
    if let Some(rid) = &pipe.routing_id {
      if self.by_identity.get(rid) == Some(&id) {
        self.by_identity.remove(rid);
      }
    }
    Some(pipe)
  }

  pub fn get(&self, id: usize) -> Option<&PipeHandle> {
    self.pipes.iter().find(|p| p.id == id)
  }

  pub fn get_mut(&mut self, id: usize) -> Option<&mut PipeHandle> {
    self.pipes.iter_mut().find(|p| p.id == id)
  }

  pub fn iter(&self) -> impl Iterator<Item = &PipeHandle> {
    self.pipes.iter()
  }

  /// Sum of messages waiting in every outbound queue.
  pub fn total_queued(&self) -> usize {
    self.pipes.iter().map(PipeHandle::queued).sum()
  }

  /// Round-robin: hands the message to the next pipe with room. Gives the frames back when
  /// every pipe is full (or there are none).
  pub fn load_balance(&mut self, mut frames: Vec<Frame>) -> Result<usize, Vec<Frame>> {
    let n = self.pipes.len();
    for step in 0..n {
      let idx = (self.cursor + step) % n;
      match self.pipes[idx].try_send(frames) {
        PipeSend::Sent => {
          self.cursor = (idx + 1) % n;
          return Ok(self.pipes[idx].id);
        }
        PipeSend::Full(back) | PipeSend::Closed(back) => frames = back,
      }
    }
    Err(frames)
  }

  /// Sends a copy to every pipe accepted by `filter`, skipping full ones. Returns how many
  /// pipes took the message.
  pub fn fanout(&self, frames: &[Frame], mut filter: impl FnMut(&PipeHandle) -> bool) -> usize {
    let mut delivered = 0;
    for pipe in &self.pipes {
      if !filter(pipe) {
        continue;
      }
      match pipe.try_send(frames.to_vec()) {
        PipeSend::Sent => delivered += 1,
        PipeSend::Full(_) => tracing::trace!(pipe_id = pipe.id, "Pipe at HWM, message dropped"),
        PipeSend::Closed(_) => {}
      }
    }
    delivered
  }

  pub fn any_writable(&self) -> bool {
    self.pipes.iter().any(|p| !p.is_full())
  }

  /// Associates `identity` with `id` for routing.
  pub fn bind_identity(&mut self, id: usize, identity: Blob) {
    if let Some(pipe) = self.get_mut(id) {
      pipe.routing_id = Some(identity.clone());
      self.by_identity.insert(identity, id);
    }
  }

  /// Removes the identity mapping, leaving the pipe itself attached.
  pub fn unbind_identity(&mut self, identity: &Blob) -> Option<usize> {
    let id = self.by_identity.remove(identity)?;
    if let Some(pipe) = self.get_mut(id) {
      pipe.routing_id = None;
    }
    Some(id)
  }

  pub fn lookup_identity(&self, identity: &[u8]) -> Option<usize> {
    self.by_identity.get(identity).copied()
  }

  pub fn for_endpoint(&self, endpoint: &str) -> Vec<usize> {
    self.pipes.iter().filter(|p| p.endpoint == endpoint).map(|p| p.id).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pipe(table: &mut PipeTable, id: usize, hwm: usize) -> Receiver<Vec<Frame>> {
    let (tx, rx) = pipe_channel(hwm, false);
    table.insert(PipeHandle::new(
      id,
      "inproc://t".into(),
      PeerInfo::default(),
      tx,
      CancellationToken::new(),
      false,
    ));
    rx
  }

  #[test]
  fn round_robin_skips_full_pipes() {
    let mut table = PipeTable::default();
    let _a = pipe(&mut table, 1, 1);
    let _b = pipe(&mut table, 2, 1);
    assert_eq!(table.load_balance(vec![Frame::from("m1")]), Ok(1));
    assert_eq!(table.load_balance(vec![Frame::from("m2")]), Ok(2));
    assert!(table.load_balance(vec![Frame::from("m3")]).is_err());
    assert_eq!(table.total_queued(), 2);
  }

  #[test]
  fn identity_index_follows_removal() {
    let mut table = PipeTable::default();
    let _a = pipe(&mut table, 7, 10);
    table.bind_identity(7, Blob::from_static(b"peer"));
    assert_eq!(table.lookup_identity(b"peer"), Some(7));
    table.remove(7);
    assert_eq!(table.lookup_identity(b"peer"), None);
    assert_eq!(table.iter().count(), 0);
  }
}
