//! restmux
//!
//! Resource-keyed JSON dispatch behind a path-prefix serve mux, with the
//! hyper server that hosts it.

pub mod config;
pub mod http;
pub mod logger;
pub mod rest;
pub mod routing;
pub mod server;

pub use rest::{Context, Dispatcher, Handler, HandlerError, HandlerFuture, Reply, RestError};
pub use routing::ServeMux;
