// src/socket/patterns/pipeline.rs

use crate::error::ZmqError;
use crate::message::Frame;
use crate::socket::options::SocketOptions;
use crate::socket::patterns::{SendOutcome, SocketPattern};
use crate::socket::pipe::PipeTable;
use crate::socket::types::SocketType;

/// PUSH and DEALER: round-robin over pipes with room; waits when all are full.
///
/// DEALER also fair-queues incoming messages untouched; PUSH refuses to receive.
#[derive(Debug)]
pub(crate) struct LoadBalancePattern {
  socket_type: SocketType,
}

impl LoadBalancePattern {
  pub fn new(socket_type: SocketType) -> Self {
    Self { socket_type }
  }
}

impl SocketPattern for LoadBalancePattern {
  fn on_ingress(&mut self, _pipes: &mut PipeTable, pipe_id: usize, frames: Vec<Frame>) -> Option<Vec<Frame>> {
    if self.socket_type == SocketType::Push {
      tracing::trace!(pipe_id, "PUSH dropping unexpected inbound message");
      return None;
    }
    Some(frames)
  }

  fn send(
    &mut self,
    pipes: &mut PipeTable,
    frames: Vec<Frame>,
    _options: &SocketOptions,
  ) -> Result<SendOutcome, ZmqError> {
    match pipes.load_balance(frames) {
      Ok(_) => Ok(SendOutcome::Sent),
      Err(back) => Ok(SendOutcome::Blocked(back)),
    }
  }

  fn check_recv(&self) -> Result<(), ZmqError> {
    if self.socket_type == SocketType::Push {
      return Err(ZmqError::UnsupportedOperation("PUSH sockets cannot receive"));
    }
    Ok(())
  }
}

/// PULL: fair-queued receive only.
#[derive(Debug)]
pub(crate) struct PullPattern;

impl SocketPattern for PullPattern {
  fn send(
    &mut self,
    _pipes: &mut PipeTable,
    _frames: Vec<Frame>,
    _options: &SocketOptions,
  ) -> Result<SendOutcome, ZmqError> {
    Err(ZmqError::UnsupportedOperation("PULL sockets cannot send"))
  }

  fn check_send(&self) -> Result<(), ZmqError> {
    Err(ZmqError::UnsupportedOperation("PULL sockets cannot send"))
  }

  fn writable(&self, _pipes: &PipeTable) -> bool {
    false
  }
}
