//! vecprod server.
//!
//! A client logs in with a username, answers a salted SHA-256 challenge,
//! then streams integer vectors whose clamped products the server returns.
//!
//! Each connection:
//! - Runs the handshake from `vecprod-auth` over a [`FrameTransport`]
//! - Reads up to [`MAX_VECTOR_COUNT`] vectors and answers each with a `u32`
//! - Is written to the error log and session journal when it ends

pub mod args;
pub mod error;
pub mod handshake;
pub mod io;
pub mod journal;
pub mod run;
pub mod server;
pub mod session;
pub mod vector;

pub use args::ServerConfig;
pub use error::{ServerError, SessionError, Stage};
pub use io::FrameTransport;
pub use server::{Incoming, ServeReport, Server, serve_connections};
pub use session::{SessionContext, SessionOutcome, run_session};
pub use vector::{MAX_VECTOR_COUNT, MAX_VECTOR_LEN, VectorOutcome, VectorPolicy};
