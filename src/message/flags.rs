// src/message/flags.rs

use bitflags::bitflags;

bitflags! {
    /// Flags carried by a [`Frame`](super::Frame).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u8 {
        /// More frames of the same message follow this one.
        const MORE = 0b01;
        /// Internal: the frame is a ZMTP command, never handed to applications.
        const COMMAND = 0b10;
    }
}

bitflags! {
    /// Flags accepted by [`Socket::send_with`](crate::Socket::send_with).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SendFlags: u8 {
        /// Fail with `WouldBlock` instead of waiting for queue space.
        const DONTWAIT = 0b01;
    }
}
