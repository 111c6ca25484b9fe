//! Challenge-response handshake state machine.
//!
//! ```text
//! AwaitLogin --login--> SaltIssued --delivered--> AwaitResponse --response--> Authenticated
//!     |                                               |
//!     +--unknown user--> Rejected <--hash mismatch----+
//! ```
//!
//! The machine decides what to send but never sends it; the caller owns
//! the transport and reports back when the salt has been written.

use std::fmt;

use subtle::ConstantTimeEq;

use crate::credentials::CredentialLookup;
use crate::digest::salted_hash;
use crate::error::HandshakeError;
use crate::salt::{Salt, SaltSource};

/// Sent when the login names no known user.
pub const USER_NOT_FOUND: &[u8] = b"ERR_USER_NOT_FOUND";

/// Sent when the response hash does not match.
pub const AUTH_FAILED: &[u8] = b"ERR_AUTH_FAILED";

/// Sent when the response hash matches.
pub const AUTH_OK: &[u8] = b"OK";

/// Why a handshake was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The username is not in the credential store.
    UnknownUser,
    /// The client's hash did not match the expected one.
    HashMismatch,
}

impl RejectReason {
    /// The literal token sent to the client.
    #[must_use]
    pub fn token(self) -> &'static [u8] {
        match self {
            RejectReason::UnknownUser => USER_NOT_FOUND,
            RejectReason::HashMismatch => AUTH_FAILED,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UnknownUser => f.write_str("user not found"),
            RejectReason::HashMismatch => f.write_str("hash mismatch"),
        }
    }
}

/// Reply to a login message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginReply {
    /// Send this salt as the challenge.
    Salt(Salt),
    /// Send the rejection token and end the session.
    Reject(RejectReason),
}

/// Reply to a response message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseReply {
    /// Send [`AUTH_OK`].
    Accept,
    /// Send the rejection token and end the session.
    Reject(RejectReason),
}

impl ResponseReply {
    /// The literal token sent to the client.
    #[must_use]
    pub fn token(self) -> &'static [u8] {
        match self {
            ResponseReply::Accept => AUTH_OK,
            ResponseReply::Reject(reason) => reason.token(),
        }
    }
}

/// Handshake state.
#[derive(Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for the username.
    AwaitLogin,
    /// A salt was chosen but not yet delivered.
    SaltIssued { username: String, expected: String },
    /// Waiting for the client's hash.
    AwaitResponse { username: String, expected: String },
    /// Terminal: identity established.
    Authenticated { username: String },
    /// Terminal: session must end.
    Rejected {
        username: Option<String>,
        reason: RejectReason,
    },
}

impl HandshakeState {
    fn name(&self) -> &'static str {
        match self {
            HandshakeState::AwaitLogin => "AWAIT_LOGIN",
            HandshakeState::SaltIssued { .. } => "SALT_ISSUED",
            HandshakeState::AwaitResponse { .. } => "AWAIT_RESPONSE",
            HandshakeState::Authenticated { .. } => "AUTHENTICATED",
            HandshakeState::Rejected { .. } => "REJECTED",
        }
    }
}

// The expected hash must never reach logs.
impl fmt::Debug for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::SaltIssued { username, .. }
            | HandshakeState::AwaitResponse { username, .. }
            | HandshakeState::Authenticated { username } => f
                .debug_struct(self.name())
                .field("username", username)
                .finish_non_exhaustive(),
            HandshakeState::Rejected { username, reason } => f
                .debug_struct(self.name())
                .field("username", username)
                .field("reason", reason)
                .finish(),
            HandshakeState::AwaitLogin => f.write_str(self.name()),
        }
    }
}

/// One connection's handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    state: HandshakeState,
}

impl Handshake {
    /// Start in [`HandshakeState::AwaitLogin`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: HandshakeState::AwaitLogin,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Whether the handshake ended successfully.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, HandshakeState::Authenticated { .. })
    }

    /// The username once known (after a successful lookup).
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match &self.state {
            HandshakeState::AwaitLogin => None,
            HandshakeState::SaltIssued { username, .. }
            | HandshakeState::AwaitResponse { username, .. }
            | HandshakeState::Authenticated { username } => Some(username),
            HandshakeState::Rejected { username, .. } => username.as_deref(),
        }
    }

    /// Handle the login payload.
    ///
    /// The payload is the raw bytes received, with no terminator expected.
    /// Payloads that are not UTF-8 can never match a stored username.
    pub fn accept_login(
        &mut self,
        login: &[u8],
        lookup: &dyn CredentialLookup,
        salts: &dyn SaltSource,
    ) -> Result<LoginReply, HandshakeError> {
        self.expect(matches!(self.state, HandshakeState::AwaitLogin), "login")?;

        let found = std::str::from_utf8(login)
            .ok()
            .and_then(|name| lookup.find(name).map(|secret| (name, secret)));

        let Some((username, secret)) = found else {
            self.state = HandshakeState::Rejected {
                username: None,
                reason: RejectReason::UnknownUser,
            };
            return Ok(LoginReply::Reject(RejectReason::UnknownUser));
        };

        let salt = salts.next_salt();
        self.state = HandshakeState::SaltIssued {
            username: username.to_string(),
            expected: salted_hash(salt.as_str(), secret),
        };
        Ok(LoginReply::Salt(salt))
    }

    /// Record that the salt reached the transport.
    pub fn salt_delivered(&mut self) -> Result<(), HandshakeError> {
        match std::mem::replace(&mut self.state, HandshakeState::AwaitLogin) {
            HandshakeState::SaltIssued { username, expected } => {
                self.state = HandshakeState::AwaitResponse { username, expected };
                Ok(())
            }
            other => {
                let state = other.name();
                self.state = other;
                Err(HandshakeError::OutOfOrder {
                    step: "salt_delivered",
                    state,
                })
            }
        }
    }

    /// Compare the client's hash against the expected one.
    ///
    /// Byte-for-byte and case-sensitive, in constant time.
    pub fn check_response(&mut self, response: &[u8]) -> Result<ResponseReply, HandshakeError> {
        match std::mem::replace(&mut self.state, HandshakeState::AwaitLogin) {
            HandshakeState::AwaitResponse { username, expected } => {
                if bool::from(expected.as_bytes().ct_eq(response)) {
                    self.state = HandshakeState::Authenticated { username };
                    Ok(ResponseReply::Accept)
                } else {
                    self.state = HandshakeState::Rejected {
                        username: Some(username),
                        reason: RejectReason::HashMismatch,
                    };
                    Ok(ResponseReply::Reject(RejectReason::HashMismatch))
                }
            }
            other => {
                let state = other.name();
                self.state = other;
                Err(HandshakeError::OutOfOrder {
                    step: "response",
                    state,
                })
            }
        }
    }

    fn expect(&self, allowed: bool, step: &'static str) -> Result<(), HandshakeError> {
        if allowed {
            Ok(())
        } else {
            Err(HandshakeError::OutOfOrder {
                step,
                state: self.state.name(),
            })
        }
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}
