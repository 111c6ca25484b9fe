//! Salted challenge-response authentication for vecprod.
//!
//! This crate is intentionally IO-free:
//! - No filesystem operations
//! - No network calls
//! - No logging
//!
//! Dependencies are injected via traits:
//! - [`CredentialLookup`] - Username to secret resolution
//! - [`SaltSource`] - Fresh per-connection salts
//!
//! # Example
//!
//! ```
//! use vecprod_auth::{CredentialStore, Handshake, LoginReply, ResponseReply, SeededSaltSource};
//! use vecprod_auth::salted_hash;
//!
//! let store = CredentialStore::parse("alice:secret123\n");
//! let salts = SeededSaltSource::from_entropy();
//!
//! let mut handshake = Handshake::new();
//! let salt = match handshake.accept_login(b"alice", &store, &salts).unwrap() {
//!     LoginReply::Salt(salt) => salt,
//!     LoginReply::Reject(reason) => panic!("rejected: {reason}"),
//! };
//! handshake.salt_delivered().unwrap();
//!
//! let response = salted_hash(salt.as_str(), "secret123");
//! let reply = handshake.check_response(response.as_bytes()).unwrap();
//! assert_eq!(reply, ResponseReply::Accept);
//! ```

pub mod credentials;
pub mod digest;
pub mod error;
pub mod handshake;
pub mod salt;

pub use credentials::{Credential, CredentialLookup, CredentialStore};
pub use digest::salted_hash;
pub use error::HandshakeError;
pub use handshake::{
    AUTH_FAILED, AUTH_OK, Handshake, HandshakeState, LoginReply, RejectReason, ResponseReply,
    USER_NOT_FOUND,
};
pub use salt::{SALT_CHARSET, SALT_LENGTH, Salt, SaltSource, SeededSaltSource};
