// Reusable listener module
// Creates TCP listeners with address reuse for quick restarts

use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use super::ServerError;

/// Create a `TcpListener` with `SO_REUSEADDR` (and `SO_REUSEPORT` on unix).
///
/// Must be called from within a tokio runtime.
///
/// # Arguments
///
/// * `addr` - The socket address to bind to
/// * `backlog` - Maximum length of the pending connection queue
///
/// # Returns
///
/// * `Ok(TcpListener)` - Bound and listening
/// * `Err(ServerError::Bind)` - Socket creation, bind or listen failed
pub fn create_reusable_listener(addr: SocketAddr, backlog: i32) -> Result<TcpListener, ServerError> {
    bind(addr, backlog).map_err(|source| ServerError::Bind { addr, source })
}

fn bind(addr: SocketAddr, backlog: i32) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // Allows binding to a port in TIME_WAIT state
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    // Required before handing the socket to tokio
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}
