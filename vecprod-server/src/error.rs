//! Server error types.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use vecprod_auth::HandshakeError;

/// Protocol step a connection failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Accepting the client.
    Accept,
    /// Receiving the username.
    Login,
    /// Sending the salt or a login rejection.
    Challenge,
    /// Receiving the client's hash.
    Response,
    /// Sending `OK` or the rejection token.
    Verdict,
    /// Receiving the vector count.
    VectorCount,
    /// Receiving a vector's element count.
    VectorSize { vector: u32 },
    /// Receiving one element.
    Element { vector: u32, element: u32 },
    /// Sending a vector's product.
    VectorResult { vector: u32 },
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Accept => f.write_str("accept"),
            Stage::Login => f.write_str("recv (login)"),
            Stage::Challenge => f.write_str("send (challenge)"),
            Stage::Response => f.write_str("recv (response)"),
            Stage::Verdict => f.write_str("send (authentication result)"),
            Stage::VectorCount => f.write_str("recv (vector count)"),
            Stage::VectorSize { vector } => write!(f, "recv (size of vector {})", vector),
            Stage::Element { vector, element } => {
                write!(f, "recv (element {} of vector {})", element, vector)
            }
            Stage::VectorResult { vector } => write!(f, "send (result of vector {})", vector),
        }
    }
}

/// Errors that end a single session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Socket I/O failed or the peer went away.
    #[error("{stage} failed: {source}")]
    Connection {
        stage: Stage,
        #[source]
        source: io::Error,
    },

    /// The handshake machine was driven out of order.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),
}

impl SessionError {
    pub(crate) fn connection(stage: Stage) -> impl FnOnce(io::Error) -> Self {
        move |source| SessionError::Connection { stage, source }
    }
}

/// Errors that prevent the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Creating, configuring, binding or listening on the socket failed.
    #[error("socket {op} failed for {addr}: {source}")]
    SocketSetup {
        op: &'static str,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The credential store could not be read.
    #[error("failed to read credential store {}: {source}", .path.display())]
    CredentialStore {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_names_stage() {
        let err = SessionError::connection(Stage::Element {
            vector: 2,
            element: 5,
        })(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed"));

        assert_eq!(
            err.to_string(),
            "recv (element 5 of vector 2) failed: peer closed"
        );
    }

    #[test]
    fn test_socket_setup_message() {
        let err = ServerError::SocketSetup {
            op: "bind",
            addr: "127.0.0.1:9090".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        };
        assert_eq!(
            err.to_string(),
            "socket bind failed for 127.0.0.1:9090: address in use"
        );
    }
}
