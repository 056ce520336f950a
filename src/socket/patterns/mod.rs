// src/socket/patterns/mod.rs

//! Per-type routing behavior.
//!
//! A socket's core owns the pipes and the queues; the pattern decides where an outbound message
//! goes, what an inbound message looks like when it reaches the application, and which
//! send/receive sequences are legal. Pattern hooks run under the core's state lock and never
//! block.

pub mod fair_queue;
pub mod pair;
pub mod pipeline;
pub mod pubsub;
pub mod reqrep;
pub mod router;
pub mod trie;

pub(crate) use fair_queue::FairQueue;
pub(crate) use trie::SubscriptionSet;

use crate::error::ZmqError;
use crate::message::Frame;
use crate::socket::options::SocketOptions;
use crate::socket::pipe::PipeTable;
use crate::socket::types::SocketType;
use std::fmt;

/// A message waiting in the inbound queue, tagged with the pipe it arrived on.
#[derive(Debug)]
pub(crate) struct InboundMessage {
  pub pipe_id: usize,
  pub frames: Vec<Frame>,
  /// False when the connection dropped before the last frame arrived.
  pub complete: bool,
}

pub(crate) enum SendOutcome {
  Sent,
  /// No pipe could take the message right now; the frames are handed back untouched.
  Blocked(Vec<Frame>),
}

pub(crate) trait SocketPattern: Send + fmt::Debug {
  fn pipe_attached(&mut self, _pipes: &mut PipeTable, _pipe_id: usize, _options: &SocketOptions) {}

  /// A pipe that outlived its connection (queued while disconnected) now has a new peer.
  /// Whatever the old peer knew about this socket is gone.
  fn pipe_reconnected(&mut self, _pipes: &mut PipeTable, _pipe_id: usize, _options: &SocketOptions) {}

  fn pipe_detached(&mut self, _pipes: &mut PipeTable, _pipe_id: usize) {}

  /// Runs on the transport task for every message read from a pipe. Returning `None` consumes
  /// the message (e.g. a subscription request arriving at a PUB).
  fn on_ingress(&mut self, _pipes: &mut PipeTable, _pipe_id: usize, frames: Vec<Frame>) -> Option<Vec<Frame>> {
    Some(frames)
  }

  /// Routes an outbound message. `frames` already carry normalized MORE flags.
  fn send(
    &mut self,
    pipes: &mut PipeTable,
    frames: Vec<Frame>,
    options: &SocketOptions,
  ) -> Result<SendOutcome, ZmqError>;

  /// Checked before a receive starts.
  fn check_recv(&self) -> Result<(), ZmqError> {
    Ok(())
  }

  /// Checked before a send starts.
  fn check_send(&self) -> Result<(), ZmqError> {
    Ok(())
  }

  /// Filters messages as they leave the inbound queue. Must not change state.
  fn accepts(&self, _msg: &InboundMessage) -> bool {
    true
  }

  /// Hands a message to the application, applying envelope rules and state transitions.
  fn deliver(&mut self, msg: InboundMessage) -> Vec<Frame> {
    msg.frames
  }

  fn subscribe(&mut self, _pipes: &mut PipeTable, _topic: &[u8], _subscribe: bool) -> Result<(), ZmqError> {
    Err(ZmqError::UnsupportedOperation("subscriptions need a SUB or XSUB socket"))
  }

  /// Whether a send would currently succeed without waiting (`POLLOUT`).
  fn writable(&self, pipes: &PipeTable) -> bool {
    pipes.any_writable()
  }
}

pub(crate) fn create_pattern(socket_type: SocketType) -> Box<dyn SocketPattern> {
  match socket_type {
    SocketType::Pair => Box::new(pair::PairPattern::default()),
    SocketType::Pub => Box::new(pubsub::PubPattern::new(false)),
    SocketType::XPub => Box::new(pubsub::PubPattern::new(true)),
    SocketType::Sub => Box::new(pubsub::SubPattern::new(true)),
    SocketType::XSub => Box::new(pubsub::SubPattern::new(false)),
    SocketType::Req => Box::new(reqrep::ReqPattern::default()),
    SocketType::Rep => Box::new(reqrep::RepPattern::default()),
    SocketType::Dealer => Box::new(pipeline::LoadBalancePattern::new(SocketType::Dealer)),
    SocketType::Push => Box::new(pipeline::LoadBalancePattern::new(SocketType::Push)),
    SocketType::Pull => Box::new(pipeline::PullPattern),
    SocketType::Router => Box::new(router::RouterPattern::new(SocketType::Router)),
    SocketType::Stream => Box::new(router::RouterPattern::new(SocketType::Stream)),
  }
}
