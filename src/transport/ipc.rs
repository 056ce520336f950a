// src/transport/ipc.rs

use crate::engine::BoxedStream;
use crate::error::ZmqError;
use crate::transport::{Connector, Listener};

use async_trait::async_trait;
use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};

fn wildcard_path() -> PathBuf {
  let suffix: u64 = rand::rng().random();
  std::env::temp_dir().join(format!("zsock-{suffix:016x}.ipc"))
}

pub(crate) struct IpcAcceptor {
  listener: UnixListener,
  path: PathBuf,
  resolved: String,
}

impl IpcAcceptor {
  /// Binds a Unix domain socket. `*` picks a fresh path in the temp directory; a stale
  /// socket file at the requested path is replaced.
  pub(crate) fn bind(path: PathBuf, uri: &str) -> Result<Self, ZmqError> {
    let path = if path == Path::new("*") { wildcard_path() } else { path };
    match std::fs::remove_file(&path) {
      Ok(()) => tracing::debug!(path = %path.display(), "Removed stale IPC socket file"),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(ZmqError::from_io_endpoint(e, uri)),
    }
    let listener = UnixListener::bind(&path).map_err(|e| ZmqError::from_io_endpoint(e, uri))?;
    let resolved = format!("ipc://{}", path.display());
    Ok(Self {
      listener,
      path,
      resolved,
    })
  }

  pub(crate) fn resolved(&self) -> &str {
    &self.resolved
  }
}

impl Drop for IpcAcceptor {
  fn drop(&mut self) {
    if let Err(e) = std::fs::remove_file(&self.path) {
      if e.kind() != std::io::ErrorKind::NotFound {
        tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove IPC socket file");
      }
    }
  }
}

#[async_trait]
impl Listener for IpcAcceptor {
  async fn accept(&self) -> Result<(BoxedStream, String), ZmqError> {
    let (stream, _) = self.listener.accept().await?;
    Ok((Box::new(stream), self.resolved.clone()))
  }
}

pub(crate) struct IpcConnector {
  path: PathBuf,
  uri: String,
}

impl IpcConnector {
  pub(crate) fn new(path: PathBuf, uri: &str) -> Self {
    Self {
      path,
      uri: uri.to_string(),
    }
  }
}

#[async_trait]
impl Connector for IpcConnector {
  async fn connect(&self) -> Result<BoxedStream, ZmqError> {
    let stream = UnixStream::connect(&self.path)
      .await
      .map_err(|e| ZmqError::from_io_endpoint(e, &self.uri))?;
    Ok(Box::new(stream))
  }
}
