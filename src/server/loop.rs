// Server loop module
// Accepts connections until shutdown is requested

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use super::connection::accept_connection;
use super::ServerState;
use crate::logger;

/// Accept connections on `listener` and serve them until `shutdown` fires.
///
/// Connections still open at shutdown keep running on their own tasks.
///
/// # Arguments
///
/// * `listener` - Bound listener from [`super::create_reusable_listener`]
/// * `state` - Shared server state handed to every connection
/// * `shutdown` - Notified once to stop accepting
pub async fn serve(listener: TcpListener, state: Arc<ServerState>, shutdown: Arc<Notify>) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => accept_connection(stream, peer_addr, &state),
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }

            () = shutdown.notified() => {
                logger::log_shutdown(state.active_connections.load(Ordering::SeqCst));
                return;
            }
        }
    }
}
