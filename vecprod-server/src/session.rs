//! Per-connection lifecycle: handshake, then vector rounds.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use vecprod_auth::{CredentialLookup, RejectReason, SaltSource};

use crate::error::{SessionError, Stage};
use crate::handshake::{HandshakeOutcome, authenticate};
use crate::io::FrameTransport;
use crate::journal::{ErrorLog, Journal, SessionRecord, SessionVerdict};
use crate::vector::{MAX_VECTOR_COUNT, VectorOutcome, VectorPolicy, process_vector};

/// Shared, read-only state handed to every session.
pub struct SessionContext {
    pub credentials: Arc<dyn CredentialLookup>,
    pub salts: Arc<dyn SaltSource>,
    pub policy: VectorPolicy,
    pub error_log: ErrorLog,
    pub journal: Journal,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("policy", &self.policy)
            .field("error_log", &self.error_log)
            .field("journal", &self.journal)
            .finish_non_exhaustive()
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Authenticated and every declared vector answered.
    Completed {
        username: String,
        results: Vec<u32>,
    },
    /// The handshake sent a rejection token.
    Rejected {
        username: Option<String>,
        reason: RejectReason,
    },
    /// An I/O failure or internal fault cut the session short.
    Aborted {
        username: Option<String>,
        results: Vec<u32>,
        error: SessionError,
    },
}

impl SessionOutcome {
    /// Whether the session counts as a success for the exit status.
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Completed { .. })
    }

    fn verdict(&self) -> SessionVerdict {
        match self {
            SessionOutcome::Completed { .. } => SessionVerdict::Completed,
            SessionOutcome::Rejected {
                reason: RejectReason::UnknownUser,
                ..
            } => SessionVerdict::UserNotFound,
            SessionOutcome::Rejected {
                reason: RejectReason::HashMismatch,
                ..
            } => SessionVerdict::AuthFailed,
            SessionOutcome::Aborted { .. } => SessionVerdict::Aborted,
        }
    }
}

/// Progress kept outside the fallible part so an abort can still report it.
#[derive(Debug, Default)]
struct Progress {
    username: Option<String>,
    results: Vec<u32>,
}

/// Serve one connection to completion.
///
/// Never fails: every fault becomes [`SessionOutcome::Aborted`], is
/// written to the error log, and the connection is closed.
pub async fn run_session<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    peer: SocketAddr,
    ctx: &SessionContext,
) -> SessionOutcome {
    let mut transport = FrameTransport::new(stream);
    let mut progress = Progress::default();

    let outcome = match drive(&mut transport, peer, ctx, &mut progress).await {
        Ok(outcome) => outcome,
        Err(error) => {
            tracing::warn!(peer = %peer, error = %error, "session aborted");
            ctx.error_log.record(format!("{}: {}", peer, error)).await;
            SessionOutcome::Aborted {
                username: progress.username.take(),
                results: std::mem::take(&mut progress.results),
                error,
            }
        }
    };

    if let Err(e) = transport.shutdown().await {
        tracing::debug!(peer = %peer, error = %e, "shutdown after session failed");
    }

    let (username, results) = match &outcome {
        SessionOutcome::Completed { username, results } => (Some(username.as_str()), &results[..]),
        SessionOutcome::Rejected { username, .. } => (username.as_deref(), &[][..]),
        SessionOutcome::Aborted {
            username, results, ..
        } => (username.as_deref(), &results[..]),
    };
    ctx.journal
        .record(&SessionRecord {
            peer,
            username,
            verdict: outcome.verdict(),
            results,
        })
        .await;

    outcome
}

async fn drive<S: AsyncRead + AsyncWrite + Unpin>(
    transport: &mut FrameTransport<S>,
    peer: SocketAddr,
    ctx: &SessionContext,
    progress: &mut Progress,
) -> Result<SessionOutcome, SessionError> {
    let username = match authenticate(transport, &*ctx.credentials, &*ctx.salts).await? {
        HandshakeOutcome::Authenticated { username } => username,
        HandshakeOutcome::Rejected { username, reason } => {
            tracing::info!(peer = %peer, user = ?username, %reason, "authentication rejected");
            let who = username.as_deref().unwrap_or("<unknown>");
            ctx.error_log
                .record(format!("{}: authentication failed for {}: {}", peer, who, reason))
                .await;
            return Ok(SessionOutcome::Rejected { username, reason });
        }
    };
    tracing::info!(peer = %peer, user = %username, "client authenticated");
    progress.username = Some(username.clone());

    let declared = transport
        .read_u32()
        .await
        .map_err(SessionError::connection(Stage::VectorCount))?;
    let count = if declared > MAX_VECTOR_COUNT {
        tracing::warn!(peer = %peer, declared, "vector count clamped");
        ctx.error_log
            .record(format!(
                "{}: vector count {} exceeds {}, clamped",
                peer, declared, MAX_VECTOR_COUNT
            ))
            .await;
        MAX_VECTOR_COUNT
    } else {
        declared
    };

    progress.results.reserve(count as usize);
    for index in 0..count {
        let size = transport
            .read_u32()
            .await
            .map_err(SessionError::connection(Stage::VectorSize { vector: index }))?;

        let outcome = process_vector(transport, index, size, ctx.policy).await?;
        match outcome {
            VectorOutcome::Oversized { declared } => {
                tracing::warn!(peer = %peer, vector = index, declared, "vector too long");
                ctx.error_log
                    .record(format!(
                        "{}: vector {} declares {} elements, rejected",
                        peer, index, declared
                    ))
                    .await;
            }
            VectorOutcome::Saturated => {
                tracing::debug!(peer = %peer, vector = index, "product clamped to u32::MAX");
            }
            VectorOutcome::Product(_) => {}
        }

        transport
            .write_u32(outcome.value())
            .await
            .map_err(SessionError::connection(Stage::VectorResult { vector: index }))?;
        progress.results.push(outcome.value());
    }

    tracing::info!(peer = %peer, user = %username, vectors = count, "session complete");
    Ok(SessionOutcome::Completed {
        username,
        results: std::mem::take(&mut progress.results),
    })
}
