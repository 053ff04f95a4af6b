// Connection handling module
// Serves one accepted TCP connection through the serve mux

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::ServerState;
use crate::logger;
use crate::rest::{boxed_body, ConnInfo};

/// Count the connection and serve it on its own task.
///
/// # Arguments
///
/// * `stream` - The accepted TCP stream
/// * `peer_addr` - The peer's socket address, exposed to handlers through [`ConnInfo`]
/// * `state` - Shared server state; its connection counter drops when the task ends
pub fn accept_connection(stream: tokio::net::TcpStream, peer_addr: SocketAddr, state: &Arc<ServerState>) {
    state.active_connections.fetch_add(1, Ordering::SeqCst);
    handle_connection(stream, peer_addr, Arc::clone(state));
}

/// Serve HTTP/1.1 on `stream` until the peer closes it or the
/// connection timeout fires
fn handle_connection(stream: tokio::net::TcpStream, peer_addr: SocketAddr, state: Arc<ServerState>) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);

        let mut builder = http1::Builder::new();
        builder.keep_alive(state.keep_alive);

        let service_state = Arc::clone(&state);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                let state = Arc::clone(&service_state);
                async move { Ok::<_, Infallible>(serve_request(req, peer_addr, &state).await) }
            }),
        );

        if state.connection_timeout.is_zero() {
            if let Err(err) = conn.await {
                logger::log_connection_error(&err);
            }
        } else {
            match tokio::time::timeout(state.connection_timeout, conn).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => logger::log_connection_error(&err),
                Err(_) => logger::log_warning(&format!(
                    "Connection from {peer_addr} timed out after {} seconds",
                    state.connection_timeout.as_secs()
                )),
            }
        }

        state.active_connections.fetch_sub(1, Ordering::SeqCst);
    });
}

/// Attach connection info, route the request and write the access line.
///
/// # Arguments
///
/// * `req` - The request as hyper read it
/// * `peer_addr` - The peer's socket address
/// * `state` - Shared server state holding the serve mux
async fn serve_request(
    req: Request<Incoming>,
    peer_addr: SocketAddr,
    state: &ServerState,
) -> Response<Full<Bytes>> {
    let mut req = req.map(boxed_body);
    req.extensions_mut().insert(ConnInfo {
        remote_addr: peer_addr.to_string(),
        // TLS terminates in front of this listener
        tls: false,
    });

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = state.mux.serve(req).await;

    if state.access_log {
        logger::log_access(&peer_addr, method.as_str(), &path, response.status().as_u16());
    }
    response
}
