// src/engine/stream_session.rs

//! Raw byte sessions for STREAM sockets and ROUTER_RAW routers: no greeting, no framing.
//! The application sees `[id, ""]` when a peer connects or goes away and `[id, bytes]` for
//! every chunk read; sending `[id, ""]` closes the connection.

use crate::engine::BoxedStream;
use crate::error::ZmqError;
use crate::message::Frame;
use crate::socket::core::SocketCore;
use crate::socket::pipe::PeerInfo;

use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

const READ_CHUNK: usize = 8192;

pub(crate) async fn run(core: Arc<SocketCore>, stream: BoxedStream, endpoint: String, token: CancellationToken) {
  let (mut reader, mut writer) = tokio::io::split(stream);
  let (pipe_id, rx) = match core.attach_pipe(&endpoint, PeerInfo::default(), token.clone()) {
    Ok(attached) => attached,
    Err(e) => {
      tracing::debug!(socket_handle = core.handle, %endpoint, error = %e, "Socket refused raw connection");
      return;
    }
  };

  if core.ingress(pipe_id, vec![Frame::empty()], true).await.is_err() {
    core.detach_pipe(pipe_id);
    return;
  }

  let read = async {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
      buf.reserve(READ_CHUNK);
      if reader.read_buf(&mut buf).await? == 0 {
        return Ok::<(), ZmqError>(());
      }
      core.ingress(pipe_id, vec![Frame::new(buf.split().freeze())], true).await?;
    }
  };

  let write = async {
    while let Ok(frames) = rx.recv().await {
      core.notify_send_ready();
      if frames.len() == 1 && frames[0].is_empty() {
        tracing::debug!(socket_handle = core.handle, pipe_id, "Closing raw connection on request");
        return Ok::<(), ZmqError>(());
      }
      for frame in &frames {
        writer.write_all(frame.data()).await?;
      }
      writer.flush().await?;
    }
    Ok(())
  };

  let outcome = tokio::select! {
    res = read => res,
    res = write => res,
    _ = token.cancelled() => Ok(()),
  };
  if let Err(e) = outcome {
    tracing::debug!(socket_handle = core.handle, pipe_id, %endpoint, error = %e, "Raw connection failed");
  }
  let _ = writer.shutdown().await;

  if !token.is_cancelled() {
    tokio::select! {
      _ = core.ingress(pipe_id, vec![Frame::empty()], true) => {}
      _ = core.token.cancelled() => {}
    }
  }
  core.detach_pipe(pipe_id);
  token.cancel();
}
