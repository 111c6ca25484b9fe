//! Socket I/O helpers.

pub mod framing;

pub use framing::{FrameTransport, MAX_MESSAGE_SIZE};
