//! Routing module
//!
//! Path-prefix route table in front of the dispatchers.

pub mod mux;

pub use mux::{Endpoint, MuxError, ResponseFuture, ServeMux};
