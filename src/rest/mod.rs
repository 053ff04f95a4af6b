//! Resource-keyed request dispatch
//!
//! A [`Dispatcher`] owns a URL prefix and a table of resource handlers.
//! The first path segment after the prefix selects the handler; the
//! handler's [`Reply`] is written as JSON or raw bytes and structured
//! [`RestError`]s become a JSON error envelope.

mod context;
mod dispatcher;
mod error;
mod form;
mod reply;

use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty};
use hyper::body::{Body, Bytes};
use std::future::Future;
use std::pin::Pin;

pub use context::{split_host_port, ConnInfo, Context, JSON_RESOURCE_TYPE};
pub use dispatcher::Dispatcher;
pub use error::{BoxError, ContextError, FormError, HandlerError, RestError};
pub use form::{parse_form, FormValues};
pub use reply::{JsonPayload, Reply};

/// Request body type seen by the dispatcher and handlers
pub type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

/// What a handler returns
pub type HandlerResult = Result<Reply, HandlerError>;

/// Boxed handler future borrowing the request context
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>>;

/// Implementation of one resource
pub trait Handler: Send + Sync {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> HandlerFuture<'a>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> HandlerFuture<'a> {
        self(ctx)
    }
}

/// Box any bytes body into a [`RequestBody`]
pub fn boxed_body<B>(body: B) -> RequestBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

pub fn empty_body() -> RequestBody {
    boxed_body(Empty::<Bytes>::new())
}

/// Unicode case-insensitive string equality
pub fn str_case_equal(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}
