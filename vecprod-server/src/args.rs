//! CLI argument parsing.

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::vector::VectorPolicy;

/// vecprod server - authenticates clients and returns vector products.
#[derive(Parser, Debug, Clone)]
#[command(name = "vecprod-server", version, arg_required_else_help = true)]
pub struct ServerConfig {
    /// Credential store (`username:secret` per line)
    #[arg(short = 'b', long = "base", value_name = "PATH")]
    pub credentials: PathBuf,

    /// Session journal file
    #[arg(short = 'j', long, value_name = "PATH")]
    pub journal: PathBuf,

    /// Error log file
    #[arg(short = 'l', long = "log", value_name = "PATH", default_value = "journal.txt")]
    pub log_file: PathBuf,

    /// Port to listen on
    #[arg(short = 'p', long)]
    pub port: u16,

    /// Address to bind
    #[arg(short = 'a', long, default_value = "127.0.0.1")]
    pub address: IpAddr,

    /// Connections to serve before exiting (0 = until terminated)
    #[arg(short = 'n', long, default_value = "1")]
    pub max_sessions: u64,

    /// Oversized-vector policy
    #[arg(long, value_enum, default_value_t = VectorPolicy::Hardened)]
    pub policy: VectorPolicy,
}

impl ServerConfig {
    /// Socket address to bind.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Session limit, `None` meaning unlimited.
    pub fn session_limit(&self) -> Option<u64> {
        (self.max_sessions > 0).then_some(self.max_sessions)
    }
}
