//! zsock - asynchronous ZeroMQ-style sockets in pure Rust on Tokio.
//!
//! A [`Context`] owns the I/O runtime and creates [`Socket`]s. Sockets exchange multipart
//! [`Message`]s over `tcp://`, `ipc://` and `inproc://` endpoints using the usual patterns
//! (PAIR, PUB/SUB, XPUB/XSUB, REQ/REP, DEALER/ROUTER, PUSH/PULL, STREAM). A [`Proxy`] relays
//! traffic between two sockets.

pub mod context;
pub(crate) mod engine;
pub mod error;
pub mod message;
pub(crate) mod protocol;
pub mod proxy;
pub mod security;
pub mod socket;
pub(crate) mod transport;

pub use context::{Context, ContextConfig};
pub use error::ZmqError;
pub use message::{Blob, Frame, FrameFlags, Message, SendFlags, Streamable, TypeTag, TypedMessage};
pub use proxy::{Proxy, ProxyPattern, ProxyState, ProxyStats, Traffic};
pub use socket::options;
pub use socket::{Socket, SocketType};

// --- Top-Level Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

pub fn version_major() -> i32 {
  VERSION_MAJOR
}

pub fn version_minor() -> i32 {
  VERSION_MINOR
}

pub fn version_patch() -> i32 {
  VERSION_PATCH
}

/// Creates a context with default settings.
pub fn context() -> Result<Context, ZmqError> {
  Context::new()
}
