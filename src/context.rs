// src/context.rs

use crate::error::ZmqError;
use crate::proxy;
use crate::socket::core::SocketCore;
use crate::socket::{Socket, SocketType};
use crate::transport::inproc::PendingConnect;

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::{Handle, Runtime};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_IO_THREADS: usize = 1;
pub const DEFAULT_MAX_SOCKETS: usize = 1023;

/// Context-wide tunables, fixed once the context exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
  pub io_threads: usize,
  pub max_sockets: usize,
}

impl Default for ContextConfig {
  fn default() -> Self {
    Self {
      io_threads: DEFAULT_IO_THREADS,
      max_sockets: DEFAULT_MAX_SOCKETS,
    }
  }
}

impl ContextConfig {
  pub fn io_threads(mut self, io_threads: usize) -> Self {
    self.io_threads = io_threads;
    self
  }

  pub fn max_sockets(mut self, max_sockets: usize) -> Self {
    self.max_sockets = max_sockets;
    self
  }
}

#[derive(Default)]
struct InprocRegistry {
  /// name -> (socket handle, binder)
  bound: HashMap<String, (usize, Weak<SocketCore>)>,
  /// Connects issued before the name was bound.
  pending: HashMap<String, Vec<PendingConnect>>,
}

/// State shared by every handle of one context.
pub(crate) struct ContextInner {
  config: ContextConfig,
  runtime: Mutex<Option<Runtime>>,
  handle: Handle,
  next_handle: AtomicUsize,
  sockets: RwLock<HashMap<usize, Weak<SocketCore>>>,
  inproc: Mutex<InprocRegistry>,
  closed: AtomicBool,
  shutdown_token: CancellationToken,
}

impl fmt::Debug for ContextInner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ContextInner")
      .field("config", &self.config)
      .field("closed", &self.closed.load(Ordering::Relaxed))
      .field("sockets", &self.sockets.read().len())
      .finish()
  }
}

impl ContextInner {
  fn new(config: ContextConfig) -> Result<Self, ZmqError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
      .worker_threads(config.io_threads.max(1))
      .thread_name("zsock-io")
      .enable_all()
      .build()?;
    let handle = runtime.handle().clone();
    Ok(Self {
      config,
      runtime: Mutex::new(Some(runtime)),
      handle,
      next_handle: AtomicUsize::new(1),
      sockets: RwLock::new(HashMap::new()),
      inproc: Mutex::new(InprocRegistry::default()),
      closed: AtomicBool::new(false),
      shutdown_token: CancellationToken::new(),
    })
  }

  pub(crate) fn next_handle(&self) -> usize {
    self.next_handle.fetch_add(1, Ordering::Relaxed)
  }

  pub(crate) fn is_open(&self) -> bool {
    !self.closed.load(Ordering::Acquire)
  }

  pub(crate) fn shutdown_token(&self) -> &CancellationToken {
    &self.shutdown_token
  }

  /// Handle of the I/O runtime, for spawning transport tasks.
  pub(crate) fn runtime_handle(&self) -> Result<Handle, ZmqError> {
    if !self.is_open() {
      return Err(ZmqError::InvalidContext);
    }
    Ok(self.handle.clone())
  }

  /// Runs `fut` on the I/O runtime and waits for its result, so that OS resources it creates
  /// are registered with that runtime rather than the caller's.
  pub(crate) async fn run_on_io<F, T>(&self, fut: F) -> Result<T, ZmqError>
  where
    F: Future<Output = Result<T, ZmqError>> + Send + 'static,
    T: Send + 'static,
  {
    self
      .runtime_handle()?
      .spawn(fut)
      .await
      .map_err(|e| ZmqError::Internal(format!("I/O task failed: {e}")))?
  }

  /// Creates and registers a socket core. Sockets made this way that are never wrapped in a
  /// `Socket` handle do not keep the context alive.
  pub(crate) fn create_core(self: &Arc<Self>, socket_type: SocketType) -> Result<Arc<SocketCore>, ZmqError> {
    if !self.is_open() {
      return Err(ZmqError::InvalidContext);
    }
    let core = SocketCore::new(self.next_handle(), socket_type, self);
    self.register_socket(&core)?;
    Ok(core)
  }

  fn register_socket(&self, core: &Arc<SocketCore>) -> Result<(), ZmqError> {
    let mut sockets = self.sockets.write();
    sockets.retain(|_, weak| weak.strong_count() > 0);
    if sockets.len() >= self.config.max_sockets {
      return Err(ZmqError::TooManySockets(self.config.max_sockets));
    }
    sockets.insert(core.handle, Arc::downgrade(core));
    tracing::debug!(socket_handle = core.handle, socket_type = %core.socket_type, "Socket registered");
    Ok(())
  }

  pub(crate) fn unregister_socket(&self, handle: usize) {
    if self.sockets.write().remove(&handle).is_some() {
      tracing::debug!(socket_handle = handle, "Socket unregistered");
    }
  }

  // --- Inproc registry ---

  /// Claims `name` for `core` and returns the connects that were waiting for it.
  pub(crate) fn register_inproc(&self, name: &str, core: &Arc<SocketCore>) -> Result<Vec<PendingConnect>, ZmqError> {
    let mut registry = self.inproc.lock();
    let taken = registry
      .bound
      .get(name)
      .and_then(|(_, weak)| weak.upgrade())
      .is_some_and(|binder| !binder.is_closed());
    if taken {
      return Err(ZmqError::AddrInUse(format!("inproc://{name}")));
    }
    registry
      .bound
      .insert(name.to_string(), (core.handle, Arc::downgrade(core)));
    Ok(registry.pending.remove(name).unwrap_or_default())
  }

  pub(crate) fn unregister_inproc(&self, name: &str, handle: usize) {
    let mut registry = self.inproc.lock();
    if registry.bound.get(name).is_some_and(|(owner, _)| *owner == handle) {
      registry.bound.remove(name);
      tracing::debug!(socket_handle = handle, name, "Inproc name released");
    }
  }

  /// Looks up the binder of `name`. When there is none yet the connect is parked until the
  /// name gets bound; otherwise it is handed back together with the binder.
  pub(crate) fn lookup_or_defer_inproc(
    &self,
    name: &str,
    pending: PendingConnect,
  ) -> Option<(Arc<SocketCore>, PendingConnect)> {
    let mut registry = self.inproc.lock();
    let binder = registry
      .bound
      .get(name)
      .and_then(|(_, weak)| weak.upgrade())
      .filter(|binder| !binder.is_closed());
    match binder {
      Some(binder) => Some((binder, pending)),
      None => {
        registry.pending.entry(name.to_string()).or_default().push(pending);
        None
      }
    }
  }

  fn close(&self) {
    if self.closed.swap(true, Ordering::AcqRel) {
      return;
    }
    tracing::info!("Closing context");
    self.shutdown_token.cancel();

    let sockets: Vec<Arc<SocketCore>> = self.sockets.read().values().filter_map(Weak::upgrade).collect();
    for core in sockets {
      core.shutdown();
    }
    self.sockets.write().clear();

    {
      let mut registry = self.inproc.lock();
      registry.bound.clear();
      registry.pending.clear();
    }

    if let Some(runtime) = self.runtime.lock().take() {
      runtime.shutdown_background();
    }
  }
}

impl Drop for ContextInner {
  fn drop(&mut self) {
    self.close();
  }
}

/// Owner of the I/O runtime and factory for sockets.
///
/// Cloning is cheap; all clones refer to the same context. Sockets keep their context alive,
/// and the context shuts down once it is closed explicitly or every handle (contexts and
/// sockets) is gone.
#[derive(Debug, Clone)]
pub struct Context {
  inner: Arc<ContextInner>,
}

impl Context {
  /// A context with one I/O thread and room for 1023 sockets.
  pub fn new() -> Result<Self, ZmqError> {
    Self::with_config(ContextConfig::default())
  }

  pub fn with_config(config: ContextConfig) -> Result<Self, ZmqError> {
    let inner = ContextInner::new(config)?;
    tracing::debug!(io_threads = config.io_threads, max_sockets = config.max_sockets, "Context created");
    Ok(Self { inner: Arc::new(inner) })
  }

  pub(crate) fn inner(&self) -> &Arc<ContextInner> {
    &self.inner
  }

  fn ensure_open(&self) -> Result<(), ZmqError> {
    if self.inner.is_open() {
      Ok(())
    } else {
      Err(ZmqError::InvalidContext)
    }
  }

  /// Creates an unconnected socket.
  pub fn socket(&self, socket_type: SocketType) -> Result<Socket, ZmqError> {
    let core = self.inner.create_core(socket_type)?;
    Ok(Socket::from_core(core, self.clone()))
  }

  /// Creates a socket and binds it. Linger is forced to zero so closing never waits.
  pub async fn bind(&self, socket_type: SocketType, endpoint: &str) -> Result<Socket, ZmqError> {
    let socket = self.socket(socket_type)?;
    socket.set_linger(0)?;
    socket.bind(endpoint).await?;
    Ok(socket)
  }

  /// Creates a socket and connects it. Linger is forced to zero so closing never waits.
  pub async fn connect(&self, socket_type: SocketType, endpoint: &str) -> Result<Socket, ZmqError> {
    let socket = self.socket(socket_type)?;
    socket.set_linger(0)?;
    socket.connect(endpoint).await?;
    Ok(socket)
  }

  /// Closes every socket and stops the I/O runtime. Calling it again does nothing.
  pub fn close(&self) {
    self.inner.close();
  }

  pub fn is_closed(&self) -> bool {
    !self.inner.is_open()
  }

  pub fn io_threads(&self) -> usize {
    self.inner.config.io_threads
  }

  pub fn max_sockets(&self) -> usize {
    self.inner.config.max_sockets
  }

  /// Number of sockets currently open in this context.
  pub fn socket_count(&self) -> usize {
    self.inner.sockets.read().values().filter(|w| w.strong_count() > 0).count()
  }

  /// Relays messages between `frontend` and `backend` (mirroring them to `capture`) until
  /// the context is closed or one of the sockets fails.
  pub async fn proxy(&self, frontend: &Socket, backend: &Socket, capture: Option<&Socket>) -> Result<(), ZmqError> {
    self.ensure_open()?;
    let legs = proxy::pump::ProxyLegs::new(frontend, backend, capture);
    let stats = Arc::new(proxy::ProxyStats::default());
    proxy::pump::run(legs, self.inner.shutdown_token().clone(), stats).await
  }

  /// Starts a relay on the I/O runtime and returns the caller's end of its control channel.
  /// Sending any message on the returned PAIR socket terminates the relay.
  pub async fn proxy_steerable(
    &self,
    frontend: &Socket,
    backend: &Socket,
    capture: Option<&Socket>,
  ) -> Result<Socket, ZmqError> {
    self.ensure_open()?;
    let legs = proxy::pump::ProxyLegs::new(frontend, backend, capture);
    let stats = Arc::new(proxy::ProxyStats::default());
    let steerable = proxy::pump::spawn_steerable(self, legs, stats).await?;
    Ok(steerable.control)
  }
}
