// src/socket/core.rs

//! The shared state behind every socket handle.
//!
//! `SocketCore` owns the pipe table, the socket-wide inbound queue and the per-type pattern.
//! Transport tasks talk to it through `attach_pipe`/`ingress`/`detach_pipe`; the public
//! `Socket` handle drives the application side (send, receive, poll, options).

use crate::context::ContextInner;
use crate::error::ZmqError;
use crate::message::multipart::normalize_more;
use crate::message::{Frame, Message, SendFlags};
use crate::socket::options::{self, SocketOptions, POLLIN, POLLOUT};
use crate::socket::patterns::{create_pattern, FairQueue, InboundMessage, SendOutcome, SocketPattern};
use crate::socket::pipe::{pipe_channel, PeerInfo, PipeHandle, PipeTable};
use crate::socket::types::SocketType;

use async_channel::Receiver;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndpointRole {
  Bound,
  Connected,
}

#[derive(Debug)]
pub(crate) struct EndpointEntry {
  /// The URI as the caller wrote it (may contain wildcards).
  pub requested: String,
  pub role: EndpointRole,
  /// Cancels the listener or connecter task behind this endpoint.
  pub token: CancellationToken,
}

#[derive(Debug)]
struct CoreState {
  pipes: PipeTable,
  pattern: Box<dyn SocketPattern>,
  /// Messages pulled off the inbound queue by `poll` but not yet handed to the caller.
  prefetched: VecDeque<InboundMessage>,
  /// Remaining frames of a message being read frame by frame.
  partial: VecDeque<Frame>,
  partial_truncated: bool,
  rcvmore: bool,
  /// Keyed by resolved endpoint.
  endpoints: HashMap<String, EndpointEntry>,
  last_endpoint: String,
}

#[derive(Debug)]
pub(crate) struct SocketCore {
  pub(crate) handle: usize,
  pub(crate) socket_type: SocketType,
  ctx: Weak<ContextInner>,
  options: RwLock<SocketOptions>,
  state: Mutex<CoreState>,
  inbound: OnceCell<FairQueue<InboundMessage>>,
  send_ready: Notify,
  pub(crate) token: CancellationToken,
  closed: AtomicBool,
}

impl SocketCore {
  pub(crate) fn new(handle: usize, socket_type: SocketType, ctx: &Arc<ContextInner>) -> Arc<Self> {
    Arc::new(Self {
      handle,
      socket_type,
      ctx: Arc::downgrade(ctx),
      options: RwLock::new(SocketOptions::default()),
      state: Mutex::new(CoreState {
        pipes: PipeTable::default(),
        pattern: create_pattern(socket_type),
        prefetched: VecDeque::new(),
        partial: VecDeque::new(),
        partial_truncated: false,
        rcvmore: false,
        endpoints: HashMap::new(),
        last_endpoint: String::new(),
      }),
      inbound: OnceCell::new(),
      send_ready: Notify::new(),
      token: ctx.shutdown_token().child_token(),
      closed: AtomicBool::new(false),
    })
  }

  // --- Lifecycle ---

  pub(crate) fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  /// The owning context, if it is still running.
  pub(crate) fn context(&self) -> Result<Arc<ContextInner>, ZmqError> {
    match self.ctx.upgrade() {
      Some(ctx) if ctx.is_open() => Ok(ctx),
      _ => Err(ZmqError::InvalidContext),
    }
  }

  /// Fails once the socket or its context has been closed.
  pub(crate) fn ensure_usable(&self) -> Result<Arc<ContextInner>, ZmqError> {
    if self.is_closed() {
      return Err(ZmqError::SocketClosed);
    }
    self.context()
  }

  fn closed_error(&self) -> ZmqError {
    if self.is_closed() {
      ZmqError::SocketClosed
    } else {
      ZmqError::InvalidContext
    }
  }

  /// Closes the socket immediately: listeners and connections are cancelled and queued
  /// messages are discarded. Idempotent.
  pub(crate) fn shutdown(&self) {
    if self.closed.swap(true, Ordering::AcqRel) {
      return;
    }
    tracing::debug!(handle = self.handle, socket_type = %self.socket_type, "Closing socket");
    self.token.cancel();

    let inproc_names: Vec<String> = {
      let mut state = self.state.lock();
      for pipe in state.pipes.iter() {
        pipe.token.cancel();
      }
      state.pipes = PipeTable::default();
      state.prefetched.clear();
      state.partial.clear();
      state.rcvmore = false;
      state
        .endpoints
        .drain()
        .filter(|(_, entry)| entry.role == EndpointRole::Bound)
        .filter_map(|(resolved, entry)| {
          entry.token.cancel();
          resolved.strip_prefix("inproc://").map(str::to_string)
        })
        .collect()
    };

    if let Some(queue) = self.inbound.get() {
      queue.close();
    }
    if let Some(ctx) = self.ctx.upgrade() {
      for name in inproc_names {
        ctx.unregister_inproc(&name, self.handle);
      }
      ctx.unregister_socket(self.handle);
    }
    self.send_ready.notify_waiters();
  }

  /// Waits until every outbound queue is empty, the linger period runs out or the socket is
  /// torn down. `None` waits without limit.
  pub(crate) async fn drain_outbound(&self, linger: Option<Duration>) {
    let deadline = linger.map(|l| Instant::now() + l);
    loop {
      let notified = self.send_ready.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      let queued = self.state.lock().pipes.total_queued();
      if queued == 0 {
        return;
      }
      tracing::trace!(handle = self.handle, queued, "Lingering on outbound messages");
      match deadline {
        Some(deadline) => tokio::select! {
          _ = &mut notified => {}
          _ = tokio::time::sleep_until(deadline) => return,
          _ = self.token.cancelled() => return,
        },
        None => tokio::select! {
          _ = &mut notified => {}
          _ = self.token.cancelled() => return,
        },
      }
    }
  }

  /// Closes the socket, first giving queued messages up to the linger period to leave.
  pub(crate) async fn close(&self) {
    if self.is_closed() {
      return;
    }
    let linger = self.options.read().linger;
    if linger != Some(Duration::ZERO) {
      self.drain_outbound(linger).await;
    }
    self.shutdown();
  }

  /// Close path used when the last handle is dropped: a zero linger closes inline, anything
  /// else lingers on a context task so that `Drop` never blocks.
  pub(crate) fn close_detached(self: &Arc<Self>) {
    if self.is_closed() {
      return;
    }
    let linger = self.options.read().linger;
    if linger == Some(Duration::ZERO) {
      self.shutdown();
      return;
    }
    match self.context().and_then(|ctx| ctx.runtime_handle()) {
      Ok(handle) => {
        let core = self.clone();
        handle.spawn(async move { core.close().await });
      }
      Err(_) => self.shutdown(),
    }
  }

  // --- Options ---

  pub(crate) fn options(&self) -> SocketOptions {
    self.options.read().clone()
  }

  pub(crate) fn set_option(&self, option: i32, value: &[u8]) -> Result<(), ZmqError> {
    self.ensure_usable()?;
    match option {
      options::SUBSCRIBE => self.subscribe(value, true),
      options::UNSUBSCRIBE => self.subscribe(value, false),
      _ => {
        self.options.write().set(self.socket_type, option, value)?;
        tracing::trace!(handle = self.handle, option, "Socket option set");
        Ok(())
      }
    }
  }

  pub(crate) fn get_option(&self, option: i32) -> Result<Vec<u8>, ZmqError> {
    self.ensure_usable()?;
    match option {
      options::TYPE => Ok(self.socket_type.as_raw().to_ne_bytes().to_vec()),
      options::RCVMORE => Ok((self.state.lock().rcvmore as i32).to_ne_bytes().to_vec()),
      options::EVENTS => Ok(self.events().to_ne_bytes().to_vec()),
      options::LAST_ENDPOINT => Ok(self.last_endpoint().into_bytes()),
      options::SUBSCRIBE | options::UNSUBSCRIBE => Err(ZmqError::InvalidOption(option)),
      _ => self.options.read().get(option),
    }
  }

  pub(crate) fn subscribe(&self, topic: &[u8], subscribe: bool) -> Result<(), ZmqError> {
    let mut state = self.state.lock();
    let state = &mut *state;
    state.pattern.subscribe(&mut state.pipes, topic, subscribe)
  }

  pub(crate) fn last_endpoint(&self) -> String {
    self.state.lock().last_endpoint.clone()
  }

  /// `POLLIN`/`POLLOUT` bits for the current state.
  pub(crate) fn events(&self) -> i32 {
    let mut events = 0;
    {
      let state = self.state.lock();
      if state.pattern.check_recv().is_ok() || !state.partial.is_empty() {
        let queued = self.inbound.get().is_some_and(|q| !q.is_empty());
        if !state.partial.is_empty() || !state.prefetched.is_empty() || queued {
          events |= POLLIN;
        }
      }
      if state.pattern.check_send().is_ok() && state.pattern.writable(&state.pipes) {
        events |= POLLOUT;
      }
    }
    events
  }

  // --- Pipes (transport side) ---

  /// The inbound queue, sized from RCVHWM and CONFLATE when the first pipe attaches.
  fn inbound(&self) -> &FairQueue<InboundMessage> {
    self.inbound.get_or_init(|| {
      let opts = self.options.read();
      FairQueue::new(opts.rcvhwm.max(0) as usize, opts.conflate)
    })
  }

  /// Registers a new connection and returns its id plus the outbound queue its driver drains.
  pub(crate) fn attach_pipe(
    &self,
    endpoint: &str,
    peer: PeerInfo,
    token: CancellationToken,
  ) -> Result<(usize, Receiver<Vec<Frame>>), ZmqError> {
    let ctx = self.ensure_usable()?;
    self.inbound();
    let pipe_id = ctx.next_handle();

    let opts = self.options.read();
    let (tx, rx) = pipe_channel(opts.sndhwm.max(0) as usize, opts.conflate);
    let peer_type = peer.socket_type;
    let pipe = PipeHandle::new(pipe_id, endpoint.to_string(), peer, tx, token, opts.conflate);
    {
      let mut state = self.state.lock();
      let state = &mut *state;
      state.pipes.insert(pipe);
      state.pattern.pipe_attached(&mut state.pipes, pipe_id, &opts);
    }
    drop(opts);

    tracing::debug!(handle = self.handle, pipe_id, endpoint, ?peer_type, "Pipe attached");
    self.send_ready.notify_waiters();
    Ok((pipe_id, rx))
  }

  /// Hands an early pipe to a freshly established connection: records what the new peer
  /// announced and lets the pattern resend per-connection state such as subscriptions.
  pub(crate) fn relink_pipe(&self, pipe_id: usize, peer: PeerInfo) {
    let opts = self.options.read();
    let mut state = self.state.lock();
    let state = &mut *state;
    let Some(pipe) = state.pipes.get_mut(pipe_id) else { return };
    pipe.peer = peer;
    state.pattern.pipe_reconnected(&mut state.pipes, pipe_id, &opts);
  }

  pub(crate) fn detach_pipe(&self, pipe_id: usize) {
    let removed = {
      let mut state = self.state.lock();
      let state = &mut *state;
      let removed = state.pipes.remove(pipe_id);
      if removed.is_some() {
        state.pattern.pipe_detached(&mut state.pipes, pipe_id);
      }
      removed
    };
    if let Some(pipe) = removed {
      tracing::debug!(handle = self.handle, pipe_id, endpoint = %pipe.endpoint, "Pipe detached");
    }
    self.send_ready.notify_waiters();
  }

  /// Wakes senders waiting for room; drivers call it after draining a message.
  pub(crate) fn notify_send_ready(&self) {
    self.send_ready.notify_waiters();
  }

  /// Hands a message read from `pipe_id` to the socket. Waits while the inbound queue is at
  /// its high-water mark, which in turn stops the driver from reading further.
  pub(crate) async fn ingress(&self, pipe_id: usize, frames: Vec<Frame>, complete: bool) -> Result<(), ZmqError> {
    let frames = {
      let mut state = self.state.lock();
      let state = &mut *state;
      match state.pattern.on_ingress(&mut state.pipes, pipe_id, frames) {
        Some(frames) => frames,
        None => return Ok(()),
      }
    };
    self
      .inbound()
      .push_item(InboundMessage {
        pipe_id,
        frames,
        complete,
      })
      .await
  }

  // --- Endpoints ---

  pub(crate) fn register_endpoint(&self, requested: &str, resolved: &str, role: EndpointRole, token: CancellationToken) {
    let mut state = self.state.lock();
    state.endpoints.insert(
      resolved.to_string(),
      EndpointEntry {
        requested: requested.to_string(),
        role,
        token,
      },
    );
    state.last_endpoint = resolved.to_string();
  }

  /// Forgets an endpoint (matched by resolved or requested URI), cancelling its task and every
  /// pipe that came through it. Returns the resolved URI.
  pub(crate) fn remove_endpoint(&self, uri: &str, role: EndpointRole) -> Result<String, ZmqError> {
    let mut state = self.state.lock();
    let key = state
      .endpoints
      .iter()
      .find(|(resolved, entry)| entry.role == role && (resolved.as_str() == uri || entry.requested == uri))
      .map(|(resolved, _)| resolved.clone())
      .ok_or_else(|| ZmqError::EndpointNotFound(uri.to_string()))?;
    if let Some(entry) = state.endpoints.remove(&key) {
      entry.token.cancel();
    }
    for pipe_id in state.pipes.for_endpoint(&key) {
      if let Some(pipe) = state.pipes.get(pipe_id) {
        pipe.token.cancel();
      }
    }
    tracing::debug!(handle = self.handle, endpoint = %key, ?role, "Endpoint removed");
    Ok(key)
  }

  // --- Sending ---

  fn prepare(msg: Message) -> Result<(Vec<Frame>, usize), ZmqError> {
    if msg.is_empty() {
      return Err(ZmqError::InvalidMessage("cannot send a message without frames".into()));
    }
    let bytes = msg.byte_len();
    let mut frames = msg.into_frames();
    normalize_more(&mut frames);
    Ok((frames, bytes))
  }

  /// One routing attempt. Gives the frames back when nothing could take them.
  fn try_route(&self, frames: Vec<Frame>) -> Result<Option<Vec<Frame>>, ZmqError> {
    let opts = self.options.read();
    let mut state = self.state.lock();
    let state = &mut *state;
    match state.pattern.send(&mut state.pipes, frames, &opts)? {
      SendOutcome::Sent => Ok(None),
      SendOutcome::Blocked(frames) => Ok(Some(frames)),
    }
  }

  fn check_send(&self) -> Result<(), ZmqError> {
    self.state.lock().pattern.check_send()
  }

  /// Sends a whole message, waiting for room up to SNDTIMEO unless `DONTWAIT` is given.
  /// Returns the number of payload bytes queued.
  pub(crate) async fn send(&self, msg: Message, flags: SendFlags) -> Result<usize, ZmqError> {
    self.ensure_usable()?;
    self.check_send()?;
    let (mut frames, bytes) = Self::prepare(msg)?;

    let timeout = if flags.contains(SendFlags::DONTWAIT) {
      Some(Duration::ZERO)
    } else {
      self.options.read().sndtimeo
    };
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
      let notified = self.send_ready.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      match self.try_route(frames)? {
        None => return Ok(bytes),
        Some(back) => frames = back,
      }

      match deadline {
        Some(_) if timeout == Some(Duration::ZERO) => return Err(ZmqError::WouldBlock),
        Some(deadline) => tokio::select! {
          _ = &mut notified => {}
          _ = tokio::time::sleep_until(deadline) => return Err(ZmqError::Timeout),
          _ = self.token.cancelled() => return Err(self.closed_error()),
        },
        None => tokio::select! {
          _ = &mut notified => {}
          _ = self.token.cancelled() => return Err(self.closed_error()),
        },
      }
      self.ensure_usable()?;
    }
  }

  /// Non-blocking send usable outside async code.
  pub(crate) fn try_send(&self, msg: Message) -> Result<usize, ZmqError> {
    self.ensure_usable()?;
    self.check_send()?;
    let (frames, bytes) = Self::prepare(msg)?;
    match self.try_route(frames)? {
      None => Ok(bytes),
      Some(_) => Err(ZmqError::WouldBlock),
    }
  }

  // --- Receiving ---

  /// Next acceptable message, prefetched ones first. Messages the pattern rejects are dropped.
  fn take_ready(&self, state: &mut CoreState) -> Option<InboundMessage> {
    while let Some(msg) = state.prefetched.pop_front() {
      if state.pattern.accepts(&msg) {
        return Some(msg);
      }
    }
    let queue = self.inbound.get()?;
    loop {
      match queue.try_pop_item() {
        Ok(Some(msg)) if state.pattern.accepts(&msg) => return Some(msg),
        Ok(Some(_)) => continue,
        Ok(None) | Err(_) => return None,
      }
    }
  }

  /// Frames of an accepted message as the application sees them, with MORE set on all but the
  /// last (all of them when the message was cut short).
  fn open_message(state: &mut CoreState, msg: InboundMessage) -> (Vec<Frame>, bool) {
    let truncated = !msg.complete;
    let mut frames = if truncated { msg.frames } else { state.pattern.deliver(msg) };
    if frames.is_empty() {
      frames.push(Frame::empty());
    }
    if truncated {
      frames.iter_mut().for_each(|f| f.set_more(true));
    } else {
      normalize_more(&mut frames);
    }
    (frames, truncated)
  }

  /// Reads one frame without waiting. `Ok(None)` when nothing is queued.
  pub(crate) fn receive_frame(&self) -> Result<Option<Frame>, ZmqError> {
    self.ensure_usable()?;
    let mut state = self.state.lock();

    if let Some(frame) = state.partial.pop_front() {
      state.rcvmore = frame.is_more();
      return Ok(Some(frame));
    }
    if state.rcvmore {
      // The previous frame promised more, but the connection dropped before it arrived.
      state.rcvmore = false;
      state.partial_truncated = false;
      return Err(ZmqError::Incomplete);
    }

    state.pattern.check_recv()?;
    let Some(msg) = self.take_ready(&mut state) else {
      return Ok(None);
    };
    let (frames, truncated) = Self::open_message(&mut state, msg);
    let mut frames: VecDeque<Frame> = frames.into();
    let first = frames.pop_front().unwrap_or_else(Frame::empty);
    state.rcvmore = first.is_more();
    state.partial = frames;
    state.partial_truncated = truncated;
    Ok(Some(first))
  }

  /// Reads a whole message without waiting. After a frame-level `receive_frame`, returns the
  /// rest of that message.
  pub(crate) fn receive_message(&self) -> Result<Option<Message>, ZmqError> {
    self.ensure_usable()?;
    let mut state = self.state.lock();

    if state.rcvmore {
      let rest: Vec<Frame> = state.partial.drain(..).collect();
      let truncated = std::mem::take(&mut state.partial_truncated);
      state.rcvmore = false;
      if truncated || rest.is_empty() {
        return Err(ZmqError::Incomplete);
      }
      return Ok(Some(Message::from_frames(rest)));
    }

    state.pattern.check_recv()?;
    let Some(msg) = self.take_ready(&mut state) else {
      return Ok(None);
    };
    let (frames, truncated) = Self::open_message(&mut state, msg);
    if truncated {
      tracing::debug!(handle = self.handle, frames = frames.len(), "Discarding truncated message");
      return Err(ZmqError::Incomplete);
    }
    Ok(Some(Message::from_frames(frames)))
  }

  /// Waits up to RCVTIMEO for a whole message.
  pub(crate) async fn recv(&self) -> Result<Message, ZmqError> {
    let timeout = self.options.read().rcvtimeo;
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
      if let Some(msg) = self.receive_message()? {
        return Ok(msg);
      }
      if timeout == Some(Duration::ZERO) {
        return Err(ZmqError::WouldBlock);
      }
      if !self.wait_readable(deadline).await? {
        return Err(ZmqError::Timeout);
      }
    }
  }

  /// Readiness check with an optional deadline (`None` waits forever). Messages pulled off the
  /// queue are parked in the prefetch buffer so a following receive sees them.
  pub(crate) async fn wait_readable(&self, deadline: Option<Instant>) -> Result<bool, ZmqError> {
    loop {
      self.ensure_usable()?;
      if self.readable_now() {
        return Ok(true);
      }
      let Some(queue) = self.inbound.get() else {
        // No pipe yet; `attach_pipe` wakes `send_ready` waiters once one exists.
        let attached = self.send_ready.notified();
        tokio::pin!(attached);
        attached.as_mut().enable();
        if self.inbound.get().is_some() {
          continue;
        }
        match deadline {
          Some(deadline) => tokio::select! {
            _ = attached => {},
            _ = tokio::time::sleep_until(deadline) => return Ok(false),
            _ = self.token.cancelled() => return Err(self.closed_error()),
          },
          None => tokio::select! {
            _ = attached => {},
            _ = self.token.cancelled() => return Err(self.closed_error()),
          },
        }
        continue;
      };
      let popped = match deadline {
        Some(deadline) => tokio::select! {
          item = queue.pop_item() => item?,
          _ = tokio::time::sleep_until(deadline) => return Ok(false),
          _ = self.token.cancelled() => return Err(self.closed_error()),
        },
        None => tokio::select! {
          item = queue.pop_item() => item?,
          _ = self.token.cancelled() => return Err(self.closed_error()),
        },
      };
      let Some(msg) = popped else {
        return Err(self.closed_error());
      };
      let mut state = self.state.lock();
      if state.pattern.accepts(&msg) {
        state.prefetched.push_back(msg);
        return Ok(true);
      }
    }
  }

  /// True when a receive would return something right now. Moves queued messages into the
  /// prefetch buffer, dropping the ones the pattern would reject.
  fn readable_now(&self) -> bool {
    let mut state = self.state.lock();
    if !state.partial.is_empty() || state.rcvmore {
      return true;
    }
    while let Some(front) = state.prefetched.front() {
      if state.pattern.accepts(front) {
        return true;
      }
      state.prefetched.pop_front();
    }
    if let Some(queue) = self.inbound.get() {
      while let Ok(Some(msg)) = queue.try_pop_item() {
        if state.pattern.accepts(&msg) {
          state.prefetched.push_back(msg);
          return true;
        }
      }
    }
    false
  }

  /// Waits up to `timeout_ms` (`-1` forever, `0` not at all) for a message.
  pub(crate) async fn poll(&self, timeout_ms: i64) -> Result<bool, ZmqError> {
    match timeout_ms {
      0 => {
        self.ensure_usable()?;
        Ok(self.readable_now())
      }
      ms if ms < 0 => self.wait_readable(None).await,
      ms => {
        let deadline = Instant::now() + Duration::from_millis(ms as u64);
        self.wait_readable(Some(deadline)).await
      }
    }
  }
}

impl Drop for SocketCore {
  fn drop(&mut self) {
    self.token.cancel();
  }
}
