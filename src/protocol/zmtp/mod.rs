// src/protocol/zmtp/mod.rs

//! ZMTP 3.0 framing: greeting, frame codec and the commands used by the NULL mechanism.

pub mod codec;
pub mod command;
pub mod greeting;

pub use codec::ZmtpCodec;
pub use command::ZmtpCommand;
pub use greeting::{ZmtpGreeting, GREETING_LENGTH};
