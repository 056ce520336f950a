// src/engine/session.rs

//! ZMTP 3.0 session with the NULL mechanism.

use crate::engine::{BoxedStream, EarlyPipe};
use crate::error::{codes, ZmqError};
use crate::message::{Blob, Frame};
use crate::protocol::zmtp::greeting::NULL_MECHANISM;
use crate::protocol::zmtp::{ZmtpCodec, ZmtpCommand, ZmtpGreeting, GREETING_LENGTH};
use crate::socket::core::SocketCore;
use crate::socket::options::SocketOptions;
use crate::socket::pipe::PeerInfo;
use crate::socket::types::SocketType;

use async_channel::Receiver;
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

type Reader = FramedRead<ReadHalf<BoxedStream>, ZmtpCodec>;
type Writer = FramedWrite<WriteHalf<BoxedStream>, ZmtpCodec>;

pub(crate) async fn run(
  core: Arc<SocketCore>,
  stream: BoxedStream,
  endpoint: String,
  early: Option<EarlyPipe>,
  token: CancellationToken,
) -> Option<EarlyPipe> {
  let options = core.options();
  let (read_half, write_half) = tokio::io::split(stream);
  let mut reader = FramedRead::new(read_half, ZmtpCodec::with_max_frame_size(options.maxmsgsize));
  let mut writer = FramedWrite::new(write_half, ZmtpCodec::new());

  let exchange = handshake(core.socket_type, &options, &mut reader, &mut writer);
  let handshake_result = match options.handshake_ivl {
    Some(ivl) => tokio::select! {
      res = tokio::time::timeout(ivl, exchange) => res.unwrap_or_else(|_| Err(ZmqError::Timeout)),
      _ = token.cancelled() => return early,
    },
    None => tokio::select! {
      res = exchange => res,
      _ = token.cancelled() => return early,
    },
  };
  let peer = match handshake_result {
    Ok(peer) => peer,
    Err(e) => {
      tracing::warn!(socket_handle = core.handle, %endpoint, error = %e, "ZMTP handshake failed");
      return early;
    }
  };
  tracing::debug!(socket_handle = core.handle, %endpoint, peer_type = ?peer.socket_type, "ZMTP handshake complete");

  let (pipe_id, rx, pipe_token) = match &early {
    Some(lent) => {
      core.relink_pipe(lent.id, peer);
      (lent.id, lent.rx.clone(), lent.token.clone())
    }
    None => match core.attach_pipe(&endpoint, peer, token.clone()) {
      Ok((id, rx)) => (id, rx, token.clone()),
      Err(e) => {
        tracing::debug!(socket_handle = core.handle, %endpoint, error = %e, "Socket refused new pipe");
        return early;
      }
    },
  };

  let outcome = tokio::select! {
    res = read_loop(&core, pipe_id, &mut reader, options.maxmsgsize) => res,
    res = write_loop(&core, &rx, &mut writer) => res,
    _ = token.cancelled() => Ok(()),
    _ = pipe_token.cancelled() => Ok(()),
  };
  match outcome {
    Ok(()) => tracing::debug!(socket_handle = core.handle, pipe_id, %endpoint, "Session ended"),
    Err(e) => tracing::warn!(socket_handle = core.handle, pipe_id, %endpoint, error = %e, "Session dropped"),
  }

  if early.is_none() {
    core.detach_pipe(pipe_id);
  }
  token.cancel();
  early
}

/// Exchanges greetings and READY commands; returns what the peer announced.
async fn handshake<R, W>(
  socket_type: SocketType,
  options: &SocketOptions,
  reader: &mut FramedRead<R, ZmtpCodec>,
  writer: &mut FramedWrite<W, ZmtpCodec>,
) -> Result<PeerInfo, ZmqError>
where
  R: AsyncRead + Unpin,
  W: AsyncWrite + Unpin,
{
  let mut greeting = BytesMut::new();
  ZmtpGreeting::null(false).encode(&mut greeting);
  writer.get_mut().write_all(&greeting).await?;
  writer.get_mut().flush().await?;

  let mut raw = [0u8; GREETING_LENGTH];
  reader.get_mut().read_exact(&mut raw).await?;
  let peer_greeting = ZmtpGreeting::decode(&raw)?;
  if peer_greeting.mechanism_name() != NULL_MECHANISM {
    let _ = writer.send(ZmtpCommand::error("Security mechanism not supported")).await;
    return Err(ZmqError::ProtocolViolation(format!(
      "peer requested unsupported mechanism {}",
      peer_greeting.mechanism_name()
    )));
  }

  writer
    .send(ZmtpCommand::ready(socket_type.zmtp_name(), options.routing_id.as_deref()))
    .await?;

  let frame = reader.next().await.ok_or(ZmqError::ConnectionClosed)??;
  if !frame.is_command() {
    return Err(ZmqError::ProtocolViolation("expected READY, got a message frame".into()));
  }
  let props = match ZmtpCommand::parse(&frame)? {
    ZmtpCommand::Ready(props) => props,
    ZmtpCommand::Error(reason) => {
      return Err(ZmqError::ProtocolViolation(format!("peer rejected handshake: {reason}")));
    }
    other => return Err(ZmqError::ProtocolViolation(format!("expected READY, got {other:?}"))),
  };

  let peer_type = props
    .socket_type
    .as_deref()
    .and_then(|name| SocketType::from_zmtp_name(name.as_bytes()))
    .ok_or_else(|| ZmqError::ProtocolViolation("missing or unknown Socket-Type".into()))?;
  if !socket_type.is_compatible(peer_type) {
    let _ = writer.send(ZmtpCommand::error("Invalid socket type")).await;
    return Err(ZmqError::ProtocolViolation(format!("{socket_type} cannot talk to {peer_type}")));
  }

  Ok(PeerInfo {
    socket_type: Some(peer_type),
    identity: props.identity.map(Blob::from_bytes),
  })
}

/// Reassembles messages from frames and hands them to the socket.
async fn read_loop(core: &SocketCore, pipe_id: usize, reader: &mut Reader, maxmsgsize: i64) -> Result<(), ZmqError> {
  let mut pending: Vec<Frame> = Vec::new();
  let mut pending_bytes = 0usize;

  let result = loop {
    let frame = match reader.next().await {
      Some(Ok(frame)) => frame,
      Some(Err(e)) => break Err(e),
      None => break Ok(()),
    };
    if frame.is_command() {
      match ZmtpCommand::parse(&frame) {
        Ok(ZmtpCommand::Error(reason)) => {
          break Err(ZmqError::ProtocolViolation(format!("peer sent ERROR: {reason}")));
        }
        Ok(command) => tracing::trace!(pipe_id, ?command, "Ignoring ZMTP command"),
        Err(e) => break Err(e),
      }
      continue;
    }

    pending_bytes += frame.size();
    if maxmsgsize >= 0 && pending_bytes as i64 > maxmsgsize {
      break Err(ZmqError::engine(
        codes::EMSGSIZE,
        format!("inbound message exceeds MAXMSGSIZE {maxmsgsize}"),
      ));
    }
    let more = frame.is_more();
    pending.push(frame);
    if !more {
      pending_bytes = 0;
      core.ingress(pipe_id, std::mem::take(&mut pending), true).await?;
    }
  };

  if !pending.is_empty() {
    tracing::debug!(pipe_id, frames = pending.len(), "Connection lost mid-message");
    let _ = core.ingress(pipe_id, pending, false).await;
  }
  result
}

/// Drains the pipe onto the wire, batching whatever is already queued into one flush.
async fn write_loop(core: &SocketCore, rx: &Receiver<Vec<Frame>>, writer: &mut Writer) -> Result<(), ZmqError> {
  while let Ok(frames) = rx.recv().await {
    core.notify_send_ready();
    for frame in frames {
      writer.feed(frame).await?;
    }
    while let Ok(frames) = rx.try_recv() {
      core.notify_send_ready();
      for frame in frames {
        writer.feed(frame).await?;
      }
    }
    writer.flush().await?;
  }
  Ok(())
}
