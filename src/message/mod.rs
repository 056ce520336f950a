// src/message/mod.rs

pub mod blob;
pub mod flags;
pub mod frame;
pub mod multipart;
pub mod typed;

pub use blob::Blob;
pub use flags::{FrameFlags, SendFlags};
pub use frame::Frame;
pub use multipart::Message;
pub use typed::{Streamable, TypeTag, TypedMessage};
