// Server module entry
// Listener setup, connection handling and the accept loop around the serve mux

pub mod connection;
pub mod listener;
pub mod signal;

// `loop` is a keyword, so the file is mounted under another name
#[path = "loop.rs"]
pub mod server_loop;

use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use crate::config::Config;
use crate::routing::ServeMux;

pub use listener::create_reusable_listener;
pub use server_loop::serve;

/// Server startup errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
    #[error("failed to install signal handlers: {0}")]
    Signal(std::io::Error),
}

/// State shared by the accept loop and every connection task
#[derive(Debug)]
pub struct ServerState {
    pub mux: ServeMux,
    pub access_log: bool,
    pub keep_alive: bool,
    /// Zero disables the connection timeout
    pub connection_timeout: Duration,
    pub active_connections: AtomicUsize,
}

impl ServerState {
    pub fn new(mux: ServeMux, config: &Config) -> Self {
        Self {
            mux,
            access_log: config.logging.access_log,
            keep_alive: config.performance.keep_alive,
            connection_timeout: Duration::from_secs(config.performance.connection_timeout),
            active_connections: AtomicUsize::new(0),
        }
    }
}
