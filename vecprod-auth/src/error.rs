//! Handshake error types.

/// Errors raised when the handshake state machine is driven out of order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum HandshakeError {
    /// A step was attempted from the wrong state.
    #[error("handshake step `{step}` not allowed in state {state}")]
    OutOfOrder {
        /// The attempted step.
        step: &'static str,
        /// The state the handshake was in.
        state: &'static str,
    },
}
