// src/socket/mod.rs

mod accessors;
pub(crate) mod core;
pub mod options;
pub(crate) mod patterns;
pub(crate) mod pipe;
pub mod types;

pub use options::ToBytes;
pub use types::SocketType;

use crate::context::Context;
use crate::error::ZmqError;
use crate::message::{Frame, Message, SendFlags, Streamable, TypedMessage};
use crate::transport;
use self::core::SocketCore;

use std::fmt;
use std::sync::Arc;

struct SocketHandle {
  core: Arc<SocketCore>,
  // Keeps the context (and its I/O runtime) alive for as long as the socket is.
  ctx: Context,
}

impl Drop for SocketHandle {
  fn drop(&mut self) {
    self.core.close_detached();
  }
}

/// The public handle for a socket.
///
/// Handles are cloneable and can be shared across tasks; the socket closes when the last clone
/// is dropped (or on [`Socket::close`]). Blocking operations are `async` and suspend the caller;
/// `receive`, `receive_all` and `try_send` never wait.
#[derive(Clone)]
pub struct Socket {
  inner: Arc<SocketHandle>,
}

static_assertions::assert_impl_all!(Socket: Send, Sync, Clone);

impl Socket {
  pub(crate) fn from_core(core: Arc<SocketCore>, ctx: Context) -> Self {
    Self {
      inner: Arc::new(SocketHandle { core, ctx }),
    }
  }

  pub(crate) fn core(&self) -> &Arc<SocketCore> {
    &self.inner.core
  }

  /// The context this socket was created from.
  pub fn context(&self) -> &Context {
    &self.inner.ctx
  }

  pub fn socket_type(&self) -> SocketType {
    self.inner.core.socket_type
  }

  // --- Endpoints ---

  /// Starts listening on `endpoint` (`tcp://`, `ipc://` or `inproc://`). Wildcards such as
  /// `tcp://127.0.0.1:*` are resolved; the result is available through `last_endpoint()`.
  pub async fn bind(&self, endpoint: &str) -> Result<(), ZmqError> {
    transport::bind(self.core(), endpoint).await.map(|_| ())
  }

  /// Connects to `endpoint`. Returns once the connecter is running; the connection itself is
  /// established (and re-established) in the background.
  pub async fn connect(&self, endpoint: &str) -> Result<(), ZmqError> {
    transport::connect(self.core(), endpoint).await.map(|_| ())
  }

  /// Stops a listener started by `bind`, dropping the connections it accepted. Accepts the
  /// endpoint as given to `bind` or as resolved.
  pub async fn unbind(&self, endpoint: &str) -> Result<(), ZmqError> {
    transport::unbind(self.core(), endpoint)
  }

  /// Stops a connecter started by `connect`, dropping its connection and any queued messages.
  pub async fn disconnect(&self, endpoint: &str) -> Result<(), ZmqError> {
    transport::disconnect(self.core(), endpoint)
  }

  // --- Sending ---

  /// Sends one message (all frames or none). Returns the number of payload bytes queued.
  ///
  /// Waits for queue space up to SNDTIMEO: `-1` waits indefinitely, `0` fails at once with
  /// `WouldBlock`, anything else fails with `Timeout` once it runs out.
  pub async fn send(&self, msg: impl Into<Message>) -> Result<usize, ZmqError> {
    self.inner.core.send(msg.into(), SendFlags::empty()).await
  }

  /// `send` with explicit flags; `SendFlags::DONTWAIT` never waits.
  pub async fn send_with(&self, msg: impl Into<Message>, flags: SendFlags) -> Result<usize, ZmqError> {
    self.inner.core.send(msg.into(), flags).await
  }

  /// Non-blocking send for synchronous callers; `WouldBlock` when nothing can take the message.
  pub fn try_send(&self, msg: impl Into<Message>) -> Result<usize, ZmqError> {
    self.inner.core.try_send(msg.into())
  }

  pub async fn send_typed<T: Streamable>(&self, value: &T) -> Result<usize, ZmqError> {
    self.send(TypedMessage::new(value)).await
  }

  // --- Receiving ---

  /// Takes the next frame if one is ready. `Ok(None)` means nothing is queued; check
  /// `rcvmore()` (or the frame's MORE flag) to know whether the message continues.
  pub fn receive(&self) -> Result<Option<Frame>, ZmqError> {
    self.inner.core.receive_frame()
  }

  /// Takes the next whole message if one is ready. After frame-level `receive` calls it returns
  /// the rest of the current message. A message cut short by a lost connection is reported as
  /// `Incomplete`.
  pub fn receive_all(&self) -> Result<Option<Message>, ZmqError> {
    self.inner.core.receive_message()
  }

  /// Waits for a whole message, up to RCVTIMEO.
  pub async fn recv(&self) -> Result<Message, ZmqError> {
    self.inner.core.recv().await
  }

  /// Receives a typed envelope and unpacks it, failing with `BadType` on a tag mismatch.
  pub async fn recv_typed<T: Streamable>(&self) -> Result<T, ZmqError> {
    let typed = TypedMessage::try_from(self.recv().await?)?;
    typed.value::<T>()
  }

  /// Waits up to `timeout_ms` for something to receive. `0` checks without waiting and `-1`
  /// waits indefinitely.
  pub async fn poll(&self, timeout_ms: i64) -> Result<bool, ZmqError> {
    self.inner.core.poll(timeout_ms).await
  }

  // --- Subscriptions ---

  /// Adds a prefix to a SUB/XSUB socket's subscription set. Subscribing twice is harmless.
  pub fn subscribe(&self, topic: impl AsRef<[u8]>) -> Result<(), ZmqError> {
    self.inner.core.ensure_usable()?;
    self.inner.core.subscribe(topic.as_ref(), true)
  }

  /// Removes a prefix. Unknown prefixes are ignored.
  pub fn unsubscribe(&self, topic: impl AsRef<[u8]>) -> Result<(), ZmqError> {
    self.inner.core.ensure_usable()?;
    self.inner.core.subscribe(topic.as_ref(), false)
  }

  // --- Options ---

  /// Sets an option by its libzmq number, e.g. `set_option(options::SNDHWM, 10)`.
  pub fn set_option<T: ToBytes>(&self, option: i32, value: T) -> Result<(), ZmqError> {
    self.set_option_raw(option, &value.to_bytes())
  }

  pub fn set_option_raw(&self, option: i32, value: &[u8]) -> Result<(), ZmqError> {
    self.inner.core.set_option(option, value)
  }

  /// Reads an option in its raw form (native-endian integers, bytes for strings and blobs).
  pub fn get_option_raw(&self, option: i32) -> Result<Vec<u8>, ZmqError> {
    self.inner.core.get_option(option)
  }

  // --- Lifecycle ---

  /// Closes the socket. Queued outbound messages get up to LINGER to leave first (`0`, the
  /// default, discards them). Closing twice is a no-op.
  pub async fn close(&self) -> Result<(), ZmqError> {
    self.inner.core.close().await;
    Ok(())
  }

  pub fn is_closed(&self) -> bool {
    self.inner.core.is_closed()
  }
}

impl fmt::Debug for Socket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Socket")
      .field("handle", &self.inner.core.handle)
      .field("type", &self.inner.core.socket_type)
      .finish_non_exhaustive()
  }
}
