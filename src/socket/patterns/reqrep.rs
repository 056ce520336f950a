// src/socket/patterns/reqrep.rs

use crate::error::ZmqError;
use crate::message::multipart::normalize_more;
use crate::message::Frame;
use crate::socket::options::SocketOptions;
use crate::socket::patterns::{InboundMessage, SendOutcome, SocketPattern};
use crate::socket::pipe::{PipeSend, PipeTable};

/// REQ: prepends the empty delimiter, load-balances the request and then accepts exactly one
/// reply, from the pipe the request went to.
#[derive(Debug, Default)]
pub(crate) struct ReqPattern {
  awaiting: Option<usize>,
}

impl SocketPattern for ReqPattern {
  fn send(
    &mut self,
    pipes: &mut PipeTable,
    frames: Vec<Frame>,
    _options: &SocketOptions,
  ) -> Result<SendOutcome, ZmqError> {
    self.check_send()?;
    let mut request = Vec::with_capacity(frames.len() + 1);
    request.push(Frame::empty());
    request.extend(frames.iter().cloned());
    normalize_more(&mut request);
    match pipes.load_balance(request) {
      Ok(pipe_id) => {
        self.awaiting = Some(pipe_id);
        Ok(SendOutcome::Sent)
      }
      Err(_) => Ok(SendOutcome::Blocked(frames)),
    }
  }

  fn check_send(&self) -> Result<(), ZmqError> {
    if self.awaiting.is_some() {
      return Err(ZmqError::InvalidState("REQ socket must receive a reply before sending again"));
    }
    Ok(())
  }

  fn check_recv(&self) -> Result<(), ZmqError> {
    if self.awaiting.is_none() {
      return Err(ZmqError::InvalidState("REQ socket must send a request before receiving"));
    }
    Ok(())
  }

  fn accepts(&self, msg: &InboundMessage) -> bool {
    let from_peer = self.awaiting == Some(msg.pipe_id);
    let delimited = msg.frames.first().is_some_and(Frame::is_empty);
    if !(from_peer && delimited) {
      tracing::trace!(pipe_id = msg.pipe_id, "REQ dropping unexpected reply");
    }
    from_peer && delimited
  }

  fn deliver(&mut self, msg: InboundMessage) -> Vec<Frame> {
    self.awaiting = None;
    msg.frames.into_iter().skip(1).collect()
  }
}

/// REP: remembers the envelope of the current request and routes the reply back with it.
#[derive(Debug, Default)]
pub(crate) struct RepPattern {
  pending: Option<(usize, Vec<Frame>)>,
}

impl SocketPattern for RepPattern {
  fn pipe_detached(&mut self, _pipes: &mut PipeTable, pipe_id: usize) {
    if self.pending.as_ref().is_some_and(|(id, _)| *id == pipe_id) {
      tracing::debug!(pipe_id, "Requester went away before the reply was sent");
    }
  }

  fn send(
    &mut self,
    pipes: &mut PipeTable,
    frames: Vec<Frame>,
    _options: &SocketOptions,
  ) -> Result<SendOutcome, ZmqError> {
    self.check_send()?;
    let Some((pipe_id, envelope)) = self.pending.take() else {
      return Err(ZmqError::InvalidState("REP socket must receive a request before replying"));
    };
    let Some(pipe) = pipes.get(pipe_id) else {
      // The requester is gone; the reply has nowhere to go.
      tracing::debug!(pipe_id, "Dropping reply for detached requester");
      return Ok(SendOutcome::Sent);
    };
    let mut reply = envelope.clone();
    reply.extend(frames.iter().cloned());
    normalize_more(&mut reply);
    match pipe.try_send(reply) {
      PipeSend::Sent | PipeSend::Closed(_) => Ok(SendOutcome::Sent),
      PipeSend::Full(_) => {
        self.pending = Some((pipe_id, envelope));
        Ok(SendOutcome::Blocked(frames))
      }
    }
  }

  fn check_send(&self) -> Result<(), ZmqError> {
    if self.pending.is_none() {
      return Err(ZmqError::InvalidState("REP socket must receive a request before replying"));
    }
    Ok(())
  }

  fn check_recv(&self) -> Result<(), ZmqError> {
    if self.pending.is_some() {
      return Err(ZmqError::InvalidState("REP socket must reply before receiving again"));
    }
    Ok(())
  }

  fn accepts(&self, msg: &InboundMessage) -> bool {
    let valid = msg.frames.iter().any(Frame::is_empty);
    if !valid {
      tracing::trace!(pipe_id = msg.pipe_id, "REP dropping request without envelope delimiter");
    }
    valid
  }

  fn deliver(&mut self, msg: InboundMessage) -> Vec<Frame> {
    let mut frames = msg.frames;
    let split = frames.iter().position(Frame::is_empty).map_or(0, |i| i + 1);
    let body = frames.split_off(split);
    self.pending = Some((msg.pipe_id, frames));
    body
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::socket::pipe::{pipe_channel, PeerInfo, PipeHandle};
  use tokio_util::sync::CancellationToken;

  fn attach(table: &mut PipeTable, id: usize) -> async_channel::Receiver<Vec<Frame>> {
    let (tx, rx) = pipe_channel(4, false);
    table.insert(PipeHandle::new(id, "inproc://r".into(), PeerInfo::default(), tx, CancellationToken::new(), false));
    rx
  }

  #[test]
  fn req_enforces_alternation() {
    let mut table = PipeTable::default();
    let rx = attach(&mut table, 3);
    let mut req = ReqPattern::default();
    assert!(req.check_recv().is_err());
    req.send(&mut table, vec![Frame::from("ping")], &SocketOptions::default()).unwrap();
    assert!(req.send(&mut table, vec![Frame::from("again")], &SocketOptions::default()).is_err());
    let wire = rx.try_recv().unwrap();
    assert!(wire[0].is_empty() && wire[0].is_more());
    assert_eq!(wire[1].data(), b"ping");

    let stale = InboundMessage { pipe_id: 9, frames: vec![Frame::empty(), Frame::from("x")], complete: true };
    assert!(!req.accepts(&stale));
    let reply = InboundMessage { pipe_id: 3, frames: vec![Frame::empty(), Frame::from("pong")], complete: true };
    assert!(req.accepts(&reply));
    let body = req.deliver(reply);
    assert_eq!(body.len(), 1);
    assert_eq!(body[0].data(), b"pong");
    assert!(req.check_send().is_ok());
  }

  #[test]
  fn rep_routes_reply_with_envelope() {
    let mut table = PipeTable::default();
    let rx = attach(&mut table, 5);
    let mut rep = RepPattern::default();
    assert!(rep.check_send().is_err());
    let request = InboundMessage {
      pipe_id: 5,
      frames: vec![Frame::from("client-id"), Frame::empty(), Frame::from("ping")],
      complete: true,
    };
    assert!(rep.accepts(&request));
    let body = rep.deliver(request);
    assert_eq!(body.len(), 1);
    assert!(rep.check_recv().is_err());
    rep.send(&mut table, vec![Frame::from("pong")], &SocketOptions::default()).unwrap();
    let wire = rx.try_recv().unwrap();
    let parts: Vec<&[u8]> = wire.iter().map(Frame::data).collect();
    assert_eq!(parts, vec![&b"client-id"[..], b"", b"pong"]);
    assert!(!wire[2].is_more());
  }
}
