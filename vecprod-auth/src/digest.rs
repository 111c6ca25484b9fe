//! Salted hash primitive.

use sha2::{Digest, Sha256};

/// Hash `salt ‖ secret` with SHA-256 and return the digest as uppercase hex.
///
/// Clients compute the same value over the salt they were issued; the
/// comparison on the server is case-sensitive.
pub fn salted_hash(salt: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode_upper(hasher.finalize())
}
