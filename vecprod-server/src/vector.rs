//! Vector product computation.
//!
//! A vector arrives as a `u32` element count followed by that many `u16`
//! elements. Only the running product is kept; elements are never
//! collected. Every declared element is consumed from the stream, even
//! when the result is already known, so the next vector header is read
//! from the right offset.

use tokio::io::AsyncRead;

use crate::error::{SessionError, Stage};
use crate::io::FrameTransport;

/// Largest element count accepted under [`VectorPolicy::Hardened`].
pub const MAX_VECTOR_LEN: u32 = 10_000;

/// Vector counts above this are clamped.
pub const MAX_VECTOR_COUNT: u32 = 1_000;

/// Size and overflow handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum VectorPolicy {
    /// Vectors longer than [`MAX_VECTOR_LEN`] produce `0`.
    #[default]
    Hardened,
    /// No length cap.
    Permissive,
}

impl VectorPolicy {
    /// Whether a vector of `declared` elements is refused.
    pub fn rejects(self, declared: u32) -> bool {
        match self {
            VectorPolicy::Hardened => declared > MAX_VECTOR_LEN,
            VectorPolicy::Permissive => false,
        }
    }
}

/// Result of one vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorOutcome {
    /// The exact product.
    Product(u32),
    /// The product exceeded `u32::MAX`.
    Saturated,
    /// The declared size was over the policy limit.
    Oversized { declared: u32 },
}

impl VectorOutcome {
    /// The value sent to the client.
    pub fn value(self) -> u32 {
        match self {
            VectorOutcome::Product(value) => value,
            VectorOutcome::Saturated => u32::MAX,
            VectorOutcome::Oversized { .. } => 0,
        }
    }
}

/// Overflow-clamped running product.
///
/// Saturation is sticky: once the next multiplication would leave the
/// `u32` range, later elements (including zero) no longer change the
/// outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductAccumulator {
    acc: u64,
    saturated: bool,
}

impl ProductAccumulator {
    /// Start from the empty product, `1`.
    pub fn new() -> Self {
        Self {
            acc: 1,
            saturated: false,
        }
    }

    /// Multiply in one element.
    pub fn push(&mut self, element: u16) {
        if self.saturated {
            return;
        }
        let element = u64::from(element);
        if element != 0 && self.acc > u64::from(u32::MAX) / element {
            self.saturated = true;
            return;
        }
        self.acc *= element;
    }

    /// Whether the result is already pinned at `u32::MAX`.
    pub fn is_saturated(&self) -> bool {
        self.saturated
    }

    /// Final outcome.
    pub fn finish(self) -> VectorOutcome {
        if self.saturated {
            return VectorOutcome::Saturated;
        }
        match u32::try_from(self.acc) {
            Ok(value) => VectorOutcome::Product(value),
            Err(_) => VectorOutcome::Saturated,
        }
    }
}

impl Default for ProductAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<u16> for ProductAccumulator {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        let mut acc = Self::new();
        for element in iter {
            acc.push(element);
        }
        acc
    }
}

/// Read one vector's elements and compute its product.
///
/// `index` only labels errors. Performs no writes; the caller sends
/// [`VectorOutcome::value`].
pub async fn process_vector<S: AsyncRead + Unpin>(
    transport: &mut FrameTransport<S>,
    index: u32,
    declared: u32,
    policy: VectorPolicy,
) -> Result<VectorOutcome, SessionError> {
    if policy.rejects(declared) {
        transport
            .discard(u64::from(declared) * 2)
            .await
            .map_err(SessionError::connection(Stage::Element {
                vector: index,
                element: 0,
            }))?;
        return Ok(VectorOutcome::Oversized { declared });
    }

    let mut product = ProductAccumulator::new();
    for element in 0..declared {
        if product.is_saturated() {
            let remaining = u64::from(declared - element) * 2;
            transport
                .discard(remaining)
                .await
                .map_err(SessionError::connection(Stage::Element {
                    vector: index,
                    element,
                }))?;
            break;
        }

        let value = transport
            .read_u16()
            .await
            .map_err(SessionError::connection(Stage::Element {
                vector: index,
                element,
            }))?;
        product.push(value);
    }

    Ok(product.finish())
}
