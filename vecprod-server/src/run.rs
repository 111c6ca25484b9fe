//! Startup: credential loading, socket setup, serving.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use vecprod_auth::{CredentialStore, SeededSaltSource};

use crate::args::ServerConfig;
use crate::error::ServerError;
use crate::journal::{ErrorLog, Journal};
use crate::server::Server;
use crate::session::SessionContext;

/// Load the credential store once.
///
/// A store that cannot be read is logged and replaced by an empty one, so
/// every login is answered with "user not found" instead of failing.
pub async fn load_credentials(path: &Path, error_log: &ErrorLog) -> CredentialStore {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let store = CredentialStore::parse(&contents);
            if store.skipped_lines() > 0 {
                tracing::warn!(
                    path = %path.display(),
                    skipped = store.skipped_lines(),
                    "skipped malformed credential lines"
                );
            }
            tracing::info!(path = %path.display(), users = store.len(), "credential store loaded");
            store
        }
        Err(source) => {
            let err = ServerError::CredentialStore {
                path: path.to_path_buf(),
                source,
            };
            tracing::error!(error = %err, "continuing with empty credential store");
            error_log.record(&err).await;
            CredentialStore::default()
        }
    }
}

/// Build the shared session state from the configuration.
pub async fn build_context(config: &ServerConfig) -> SessionContext {
    let error_log = ErrorLog::new(&config.log_file);
    let credentials = load_credentials(&config.credentials, &error_log).await;

    SessionContext {
        credentials: Arc::new(credentials),
        salts: Arc::new(SeededSaltSource::from_entropy()),
        policy: config.policy,
        error_log,
        journal: Journal::new(&config.journal),
    }
}

/// Run the server.
///
/// Returns the exit code to use.
pub async fn run(config: ServerConfig) -> Result<i32> {
    let ctx = Arc::new(build_context(&config).await);
    let addr = config.bind_addr();

    let server = match Server::bind(addr, ctx.clone()).await {
        Ok(server) => server,
        Err(e) => {
            ctx.error_log.record(&e).await;
            return Err(e).context("failed to start listener");
        }
    };

    let report = server
        .serve(config.session_limit(), shutdown_signal())
        .await;
    Ok(report.exit_code())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received SIGINT (Ctrl+C), initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }
}
