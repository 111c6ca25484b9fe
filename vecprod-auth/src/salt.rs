//! Per-connection salt generation.
//!
//! A salt is issued fresh for every login so a captured response hash
//! cannot be replayed against a later session.

use std::fmt;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Characters a salt is drawn from (`[0-9A-Za-z]`).
pub const SALT_CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Salt length in characters.
pub const SALT_LENGTH: usize = 16;

/// A 16-character alphanumeric salt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Salt(String);

impl Salt {
    /// Parse a salt, returning `None` unless it is exactly
    /// [`SALT_LENGTH`] characters from [`SALT_CHARSET`].
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        if value.len() != SALT_LENGTH {
            return None;
        }
        if !value.bytes().all(|b| SALT_CHARSET.contains(&b)) {
            return None;
        }
        Some(Self(value.to_string()))
    }

    /// The salt as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The salt as the bytes sent on the wire.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of fresh salts.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one source is shared by every
/// concurrently running session.
pub trait SaltSource: Send + Sync {
    /// Produce the next salt.
    fn next_salt(&self) -> Salt;
}

/// Salt source backed by a single generator seeded once at construction.
///
/// Not meant to be reused as a general purpose PRNG.
pub struct SeededSaltSource {
    rng: Mutex<StdRng>,
}

impl SeededSaltSource {
    /// Seed from the operating system's entropy source.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic source for tests and reproducible tooling.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl SaltSource for SeededSaltSource {
    fn next_salt(&self) -> Salt {
        // A panic while holding the lock cannot leave the generator in a
        // state that matters for salt quality.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let salt: String = (0..SALT_LENGTH)
            .map(|_| SALT_CHARSET[rng.gen_range(0..SALT_CHARSET.len())] as char)
            .collect();
        Salt(salt)
    }
}

impl fmt::Debug for SeededSaltSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeededSaltSource").finish_non_exhaustive()
    }
}
