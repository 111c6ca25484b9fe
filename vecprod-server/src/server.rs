//! Listening socket and accept loop.
//!
//! Each accepted connection runs as its own task with an independent
//! session; the only shared state is the read-only [`SessionContext`].

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinSet;

use crate::error::{ServerError, Stage};
use crate::session::{SessionContext, run_session};

/// Pending-connection queue length passed to `listen`.
pub const LISTEN_BACKLOG: u32 = 10;

/// Tally of served sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeReport {
    /// Connections accepted.
    pub accepted: u64,
    /// Sessions that did not complete successfully, plus a failed accept.
    pub failed: u64,
}

impl ServeReport {
    /// `0` when every served session completed, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 { 0 } else { 1 }
    }
}

/// Source of client connections.
pub trait Incoming: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next client.
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;
}

impl Incoming for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

impl<L: Incoming> Incoming for &mut L {
    type Stream = L::Stream;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send {
        (**self).accept()
    }
}

/// A bound, listening server.
pub struct Server {
    listener: TcpListener,
    ctx: Arc<SessionContext>,
}

impl Server {
    /// Create the socket, enable address reuse, bind and listen.
    ///
    /// Failing to set address reuse is logged, not fatal.
    pub async fn bind(addr: SocketAddr, ctx: Arc<SessionContext>) -> Result<Self, ServerError> {
        let setup = |op: &'static str| {
            move |source: io::Error| ServerError::SocketSetup { op, addr, source }
        };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(setup("create"))?;

        if let Err(e) = socket.set_reuseaddr(true) {
            tracing::warn!(addr = %addr, error = %e, "failed to set SO_REUSEADDR");
            ctx.error_log
                .record(format!("setsockopt SO_REUSEADDR on {}: {}", addr, e))
                .await;
        }

        socket.bind(addr).map_err(setup("bind"))?;
        let listener = socket.listen(LISTEN_BACKLOG).map_err(setup("listen"))?;

        Ok(Self { listener, ctx })
    }

    /// Address actually bound (resolves port `0`).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `limit` have been accepted (if given) or
    /// `shutdown` resolves, then wait for sessions still in flight.
    ///
    /// A failed accept closes the listener and counts as a failure.
    /// A shutdown signal also cancels in-flight sessions; dropping their
    /// tasks closes their sockets.
    pub async fn serve<F>(self, limit: Option<u64>, shutdown: F) -> ServeReport
    where
        F: Future<Output = ()>,
    {
        let Server { listener, ctx } = self;
        let addr = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        tracing::info!(addr = %addr, limit = ?limit, "server started");

        serve_connections(listener, ctx, limit, shutdown).await
    }
}

/// Accept loop shared by every [`Incoming`] source.
pub async fn serve_connections<L, F>(
    mut listener: L,
    ctx: Arc<SessionContext>,
    limit: Option<u64>,
    shutdown: F,
) -> ServeReport
where
    L: Incoming,
    F: Future<Output = ()>,
{
    let mut report = ServeReport::default();
    let mut sessions = JoinSet::new();
    tokio::pin!(shutdown);

    let mut cancelled = false;
    while limit.is_none_or(|max| report.accepted < max) {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    report.accepted += 1;
                    tracing::info!(peer = %peer, "client connected");
                    let ctx = ctx.clone();
                    sessions.spawn(async move { run_session(stream, peer, &ctx).await.is_success() });
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(error = %e, "TCP accept failed, closing listener");
                    ctx.error_log
                        .record(format!("{} failed: {}", Stage::Accept, e))
                        .await;
                    break;
                }
            },
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                tally(&mut report, joined);
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, stopping accept loop");
                cancelled = true;
                break;
            }
        }
    }

    // Release the port before waiting on stragglers.
    drop(listener);

    while !cancelled {
        tokio::select! {
            joined = sessions.join_next() => match joined {
                Some(joined) => tally(&mut report, joined),
                None => break,
            },
            _ = &mut shutdown => {
                tracing::info!(in_flight = sessions.len(), "shutdown signal received, cancelling sessions");
                cancelled = true;
            }
        }
    }

    sessions.abort_all();
    while let Some(joined) = sessions.join_next().await {
        tally(&mut report, joined);
    }

    tracing::info!(
        accepted = report.accepted,
        failed = report.failed,
        "server stopped"
    );
    report
}

fn tally(report: &mut ServeReport, joined: Result<bool, tokio::task::JoinError>) {
    match joined {
        Ok(true) => {}
        Ok(false) => report.failed += 1,
        Err(e) if e.is_cancelled() => {
            tracing::debug!("session cancelled by shutdown");
            report.failed += 1;
        }
        Err(e) => {
            tracing::error!(error = %e, "session task panicked");
            report.failed += 1;
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.listener.local_addr().ok())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{ErrorLog, Journal};
    use crate::vector::VectorPolicy;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};
    use tokio::io::DuplexStream;
    use vecprod_auth::{CredentialStore, SeededSaltSource};

    fn context(dir: &TempDir) -> Arc<SessionContext> {
        Arc::new(SessionContext {
            credentials: Arc::new(CredentialStore::parse("alice:secret123\n")),
            salts: Arc::new(SeededSaltSource::from_seed(3)),
            policy: VectorPolicy::Hardened,
            error_log: ErrorLog::new(dir.path().join("error.log")),
            journal: Journal::new(dir.path().join("sessions.log")),
        })
    }

    /// Listener whose every accept fails, like a process out of descriptors.
    struct ExhaustedListener {
        attempts: u32,
    }

    impl Incoming for ExhaustedListener {
        type Stream = DuplexStream;

        async fn accept(&mut self) -> io::Result<(DuplexStream, SocketAddr)> {
            self.attempts += 1;
            Err(io::Error::other("Too many open files"))
        }
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(ServeReport { accepted: 3, failed: 0 }.exit_code(), 0);
        assert_eq!(ServeReport { accepted: 3, failed: 1 }.exit_code(), 1);
        assert_eq!(ServeReport::default().exit_code(), 0);
    }

    #[tokio::test]
    async fn test_accept_failure_ends_one_shot_serve() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let mut listener = ExhaustedListener { attempts: 0 };

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            serve_connections(&mut listener, ctx.clone(), Some(1), std::future::pending()),
        )
        .await
        .expect("serve kept running after accept failed");

        assert_eq!(report, ServeReport { accepted: 0, failed: 1 });
        assert_eq!(report.exit_code(), 1);
        assert_eq!(listener.attempts, 1);

        let errors = std::fs::read_to_string(ctx.error_log.path()).unwrap();
        assert_eq!(errors.lines().count(), 1);
        assert!(errors.contains("ERROR: accept failed: Too many open files"));
    }

    #[tokio::test]
    async fn test_accept_failure_ends_unlimited_serve() {
        let dir = tempdir().unwrap();
        let mut listener = ExhaustedListener { attempts: 0 };

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            serve_connections(&mut listener, context(&dir), None, std::future::pending()),
        )
        .await
        .expect("serve kept running after accept failed");

        assert_eq!(report.exit_code(), 1);
        assert_eq!(listener.attempts, 1);
    }

    #[tokio::test]
    async fn test_bind_to_address_in_use_fails() {
        let dir = tempdir().unwrap();
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();

        let err = Server::bind(addr, context(&dir)).await.unwrap_err();
        match err {
            ServerError::SocketSetup { op, addr: failed, .. } => {
                assert_eq!(op, "bind");
                assert_eq!(failed, addr);
            }
            other => panic!("expected socket setup error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bind_port_zero_resolves_local_addr() {
        let dir = tempdir().unwrap();
        let server = Server::bind("127.0.0.1:0".parse().unwrap(), context(&dir))
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }
}
