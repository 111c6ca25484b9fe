//! Drives the authentication handshake over a connection.

use tokio::io::{AsyncRead, AsyncWrite};
use vecprod_auth::{
    CredentialLookup, Handshake, LoginReply, RejectReason, ResponseReply, SaltSource,
};

use crate::error::{SessionError, Stage};
use crate::io::FrameTransport;

/// How the handshake ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// `OK` was sent; vector processing may start.
    Authenticated { username: String },
    /// A rejection token was sent; the session must end.
    Rejected {
        username: Option<String>,
        reason: RejectReason,
    },
}

/// Run the login, challenge and response exchange.
///
/// Rejections are outcomes, not errors. Any I/O failure aborts the
/// handshake and is never retried.
pub async fn authenticate<S: AsyncRead + AsyncWrite + Unpin>(
    transport: &mut FrameTransport<S>,
    lookup: &dyn CredentialLookup,
    salts: &dyn SaltSource,
) -> Result<HandshakeOutcome, SessionError> {
    let mut handshake = Handshake::new();

    let login = transport
        .read_message()
        .await
        .map_err(SessionError::connection(Stage::Login))?;

    let salt = match handshake.accept_login(&login, lookup, salts)? {
        LoginReply::Salt(salt) => salt,
        LoginReply::Reject(reason) => {
            transport
                .write_all(reason.token())
                .await
                .map_err(SessionError::connection(Stage::Challenge))?;
            tracing::debug!(
                login = %String::from_utf8_lossy(&login),
                "login rejected: unknown user"
            );
            return Ok(HandshakeOutcome::Rejected {
                username: None,
                reason,
            });
        }
    };

    transport
        .write_all(salt.as_bytes())
        .await
        .map_err(SessionError::connection(Stage::Challenge))?;
    handshake.salt_delivered()?;

    let response = transport
        .read_message()
        .await
        .map_err(SessionError::connection(Stage::Response))?;

    let reply = handshake.check_response(&response)?;
    transport
        .write_all(reply.token())
        .await
        .map_err(SessionError::connection(Stage::Verdict))?;

    let username = handshake.username().unwrap_or_default().to_string();
    Ok(match reply {
        ResponseReply::Accept => HandshakeOutcome::Authenticated { username },
        ResponseReply::Reject(reason) => HandshakeOutcome::Rejected {
            username: Some(username),
            reason,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    use vecprod_auth::{CredentialStore, Salt, salted_hash};

    struct FixedSalt;

    impl SaltSource for FixedSalt {
        fn next_salt(&self) -> Salt {
            Salt::parse("0123456789abcdef").unwrap()
        }
    }

    fn store() -> CredentialStore {
        CredentialStore::parse("alice:secret123\n")
    }

    #[tokio::test]
    async fn test_successful_handshake() {
        let (mut client, server) = duplex(1024);
        let store = store();

        let server_task = tokio::spawn(async move {
            let mut transport = FrameTransport::new(server);
            authenticate(&mut transport, &store, &FixedSalt).await
        });

        client.write_all(b"alice").await.unwrap();
        let mut salt = [0u8; 16];
        client.read_exact(&mut salt).await.unwrap();
        assert_eq!(&salt, b"0123456789abcdef");

        let hash = salted_hash(std::str::from_utf8(&salt).unwrap(), "secret123");
        client.write_all(hash.as_bytes()).await.unwrap();

        let mut verdict = [0u8; 2];
        client.read_exact(&mut verdict).await.unwrap();
        assert_eq!(&verdict, b"OK");

        let outcome = server_task.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            HandshakeOutcome::Authenticated {
                username: "alice".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_user_gets_no_salt() {
        let (mut client, server) = duplex(1024);
        let store = store();

        let server_task = tokio::spawn(async move {
            let mut transport = FrameTransport::new(server);
            let outcome = authenticate(&mut transport, &store, &FixedSalt).await;
            drop(transport);
            outcome
        });

        client.write_all(b"mallory").await.unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"ERR_USER_NOT_FOUND");

        let outcome = server_task.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            HandshakeOutcome::Rejected {
                username: None,
                reason: RejectReason::UnknownUser
            }
        );
    }

    #[tokio::test]
    async fn test_wrong_hash_rejected() {
        let (mut client, server) = duplex(1024);
        let store = store();

        let server_task = tokio::spawn(async move {
            let mut transport = FrameTransport::new(server);
            let outcome = authenticate(&mut transport, &store, &FixedSalt).await;
            drop(transport);
            outcome
        });

        client.write_all(b"alice").await.unwrap();
        let mut salt = [0u8; 16];
        client.read_exact(&mut salt).await.unwrap();

        let hash = salted_hash(std::str::from_utf8(&salt).unwrap(), "guess");
        client.write_all(hash.as_bytes()).await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"ERR_AUTH_FAILED");

        let outcome = server_task.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            HandshakeOutcome::Rejected {
                username: Some("alice".to_string()),
                reason: RejectReason::HashMismatch
            }
        );
    }

    #[tokio::test]
    async fn test_disconnect_before_response_is_connection_error() {
        let (mut client, server) = duplex(1024);
        let store = store();

        let server_task = tokio::spawn(async move {
            let mut transport = FrameTransport::new(server);
            authenticate(&mut transport, &store, &FixedSalt).await
        });

        client.write_all(b"alice").await.unwrap();
        let mut salt = [0u8; 16];
        client.read_exact(&mut salt).await.unwrap();
        drop(client);

        let err = server_task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Connection {
                stage: Stage::Response,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_disconnect_before_login_is_connection_error() {
        let (client, server) = duplex(1024);
        drop(client);

        let mut transport = FrameTransport::new(server);
        let err = authenticate(&mut transport, &store(), &FixedSalt)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Connection {
                stage: Stage::Login,
                ..
            }
        ));
    }
}
