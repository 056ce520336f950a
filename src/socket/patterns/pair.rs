// src/socket/patterns/pair.rs

use crate::error::ZmqError;
use crate::message::Frame;
use crate::socket::options::SocketOptions;
use crate::socket::patterns::{SendOutcome, SocketPattern};
use crate::socket::pipe::{PipeSend, PipeTable};

/// PAIR: one peer at a time. Further connections are refused while a peer is attached.
#[derive(Debug, Default)]
pub(crate) struct PairPattern {
  peer: Option<usize>,
}

impl SocketPattern for PairPattern {
  fn pipe_attached(&mut self, pipes: &mut PipeTable, pipe_id: usize, _options: &SocketOptions) {
    match self.peer {
      None => self.peer = Some(pipe_id),
      Some(existing) => {
        tracing::debug!(pipe_id, existing, "PAIR already has a peer, refusing connection");
        if let Some(pipe) = pipes.get(pipe_id) {
          pipe.token.cancel();
        }
      }
    }
  }

  fn pipe_detached(&mut self, _pipes: &mut PipeTable, pipe_id: usize) {
    if self.peer == Some(pipe_id) {
      self.peer = None;
    }
  }

  fn on_ingress(&mut self, _pipes: &mut PipeTable, pipe_id: usize, frames: Vec<Frame>) -> Option<Vec<Frame>> {
    (self.peer == Some(pipe_id)).then_some(frames)
  }

  fn send(
    &mut self,
    pipes: &mut PipeTable,
    frames: Vec<Frame>,
    _options: &SocketOptions,
  ) -> Result<SendOutcome, ZmqError> {
    let Some(pipe) = self.peer.and_then(|id| pipes.get(id)) else {
      return Ok(SendOutcome::Blocked(frames));
    };
    match pipe.try_send(frames) {
      PipeSend::Sent => Ok(SendOutcome::Sent),
      PipeSend::Full(back) | PipeSend::Closed(back) => Ok(SendOutcome::Blocked(back)),
    }
  }

  fn writable(&self, pipes: &PipeTable) -> bool {
    self.peer.and_then(|id| pipes.get(id)).is_some_and(|p| !p.is_full())
  }
}
