// src/socket/patterns/pubsub.rs

use crate::error::ZmqError;
use crate::message::Frame;
use crate::socket::options::SocketOptions;
use crate::socket::patterns::trie::{parse_subscription_message, subscription_message};
use crate::socket::patterns::{SendOutcome, SocketPattern, SubscriptionSet};
use crate::socket::pipe::{PipeSend, PipeTable};
use std::collections::HashMap;

fn single_subscription(frames: &[Frame]) -> Option<(bool, &[u8])> {
  match frames {
    [only] => parse_subscription_message(only.data()),
    _ => None,
  }
}

/// PUB and XPUB: filter on the sending side using each subscriber's announced prefixes.
#[derive(Debug)]
pub(crate) struct PubPattern {
  xpub: bool,
  per_pipe: HashMap<usize, SubscriptionSet>,
  /// Number of pipes subscribed to each topic; XPUB only reports 0 <-> 1 transitions.
  totals: HashMap<Vec<u8>, usize>,
}

impl PubPattern {
  pub fn new(xpub: bool) -> Self {
    Self {
      xpub,
      per_pipe: HashMap::new(),
      totals: HashMap::new(),
    }
  }

  /// Applies a subscription change from `pipe_id`; true if the aggregate view changed.
  fn apply(&mut self, pipe_id: usize, subscribe: bool, topic: &[u8]) -> bool {
    let set = self.per_pipe.entry(pipe_id).or_default();
    let changed = if subscribe { set.subscribe(topic) } else { set.unsubscribe(topic) };
    if !changed {
      return false;
    }
    if subscribe {
      let count = self.totals.entry(topic.to_vec()).or_insert(0);
      *count += 1;
      *count == 1
    } else {
      match self.totals.get_mut(topic) {
        Some(count) if *count > 1 => {
          *count -= 1;
          false
        }
        Some(_) => {
          self.totals.remove(topic);
          true
        }
        None => false,
      }
    }
  }
}

impl SocketPattern for PubPattern {
  fn pipe_attached(&mut self, _pipes: &mut PipeTable, pipe_id: usize, _options: &SocketOptions) {
    self.per_pipe.insert(pipe_id, SubscriptionSet::new());
  }

  fn pipe_reconnected(&mut self, pipes: &mut PipeTable, pipe_id: usize, options: &SocketOptions) {
    self.pipe_detached(pipes, pipe_id);
    self.pipe_attached(pipes, pipe_id, options);
  }

  fn pipe_detached(&mut self, _pipes: &mut PipeTable, pipe_id: usize) {
    if let Some(set) = self.per_pipe.remove(&pipe_id) {
      for topic in set.topics() {
        if let Some(count) = self.totals.get_mut(&topic) {
          *count -= 1;
          if *count == 0 {
            self.totals.remove(&topic);
          }
        }
      }
    }
  }

  fn on_ingress(&mut self, _pipes: &mut PipeTable, pipe_id: usize, frames: Vec<Frame>) -> Option<Vec<Frame>> {
    match single_subscription(&frames) {
      Some((subscribe, topic)) => {
        let changed = self.apply(pipe_id, subscribe, topic);
        tracing::trace!(
          pipe_id,
          subscribe,
          topic = %String::from_utf8_lossy(topic),
          "Subscription update"
        );
        (self.xpub && changed).then_some(frames)
      }
      None if self.xpub => Some(frames),
      None => None,
    }
  }

  fn send(
    &mut self,
    pipes: &mut PipeTable,
    frames: Vec<Frame>,
    _options: &SocketOptions,
  ) -> Result<SendOutcome, ZmqError> {
    let topic = frames.first().map(Frame::data).unwrap_or_default();
    let per_pipe = &self.per_pipe;
    pipes.fanout(&frames, |pipe| per_pipe.get(&pipe.id).is_some_and(|s| s.matches(topic)));
    Ok(SendOutcome::Sent)
  }

  fn check_recv(&self) -> Result<(), ZmqError> {
    if self.xpub {
      Ok(())
    } else {
      Err(ZmqError::UnsupportedOperation("PUB sockets cannot receive"))
    }
  }

  fn writable(&self, _pipes: &PipeTable) -> bool {
    true
  }
}

/// SUB and XSUB.
///
/// SUB filters incoming messages against its own set and only changes subscriptions through
/// `subscribe`. XSUB passes everything through and lets the application send raw
/// subscription messages upstream.
#[derive(Debug)]
pub(crate) struct SubPattern {
  filter: bool,
  subscriptions: SubscriptionSet,
}

impl SubPattern {
  pub fn new(filter: bool) -> Self {
    Self {
      filter,
      subscriptions: SubscriptionSet::new(),
    }
  }

  fn broadcast(pipes: &PipeTable, frames: &[Frame]) {
    pipes.fanout(frames, |_| true);
  }
}

impl SocketPattern for SubPattern {
  fn pipe_attached(&mut self, pipes: &mut PipeTable, pipe_id: usize, _options: &SocketOptions) {
    let Some(pipe) = pipes.get(pipe_id) else { return };
    for topic in self.subscriptions.topics() {
      let frames = vec![Frame::from(subscription_message(true, &topic))];
      if !matches!(pipe.try_send(frames), PipeSend::Sent) {
        tracing::warn!(pipe_id, "Could not replay subscription to new peer (pipe full)");
      }
    }
  }

  fn pipe_reconnected(&mut self, pipes: &mut PipeTable, pipe_id: usize, options: &SocketOptions) {
    tracing::trace!(pipe_id, "Replaying subscriptions after reconnect");
    self.pipe_attached(pipes, pipe_id, options);
  }

  fn on_ingress(&mut self, _pipes: &mut PipeTable, _pipe_id: usize, frames: Vec<Frame>) -> Option<Vec<Frame>> {
    if !self.filter {
      return Some(frames);
    }
    let topic = frames.first().map(Frame::data).unwrap_or_default();
    self.subscriptions.matches(topic).then_some(frames)
  }

  fn send(
    &mut self,
    pipes: &mut PipeTable,
    frames: Vec<Frame>,
    _options: &SocketOptions,
  ) -> Result<SendOutcome, ZmqError> {
    self.check_send()?;
    if let Some((subscribe, topic)) = single_subscription(&frames) {
      if subscribe {
        self.subscriptions.subscribe(topic);
      } else {
        self.subscriptions.unsubscribe(topic);
      }
    }
    Self::broadcast(pipes, &frames);
    Ok(SendOutcome::Sent)
  }

  fn check_send(&self) -> Result<(), ZmqError> {
    if self.filter {
      Err(ZmqError::UnsupportedOperation("SUB sockets cannot send"))
    } else {
      Ok(())
    }
  }

  fn subscribe(&mut self, pipes: &mut PipeTable, topic: &[u8], subscribe: bool) -> Result<(), ZmqError> {
    let changed = if subscribe {
      self.subscriptions.subscribe(topic)
    } else {
      self.subscriptions.unsubscribe(topic)
    };
    if changed {
      Self::broadcast(pipes, &[Frame::from(subscription_message(subscribe, topic))]);
    }
    Ok(())
  }

  fn writable(&self, _pipes: &PipeTable) -> bool {
    !self.filter
  }
}
