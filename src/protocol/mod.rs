// src/protocol/mod.rs

//! Wire protocols spoken by the stream transports.

pub mod zmtp;
