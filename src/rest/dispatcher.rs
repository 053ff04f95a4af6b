//! Resource registry and per-request dispatch

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::context::{Context, JSON_RESOURCE_TYPE};
use super::error::{HandlerError, RestError};
use super::form::parse_form;
use super::reply::Reply;
use super::{Handler, HandlerFuture, RequestBody};
use crate::http::{
    apply_cors_headers, build_content_response, build_empty_response, build_text_response,
    decode_path,
};
use crate::logger::{LogSink, ProcessLog};
use crate::routing::{Endpoint, ResponseFuture, ServeMux};

/// Registers resource handlers under a prefix and serves them.
///
/// The first registration installs the dispatch entry point into the
/// serve mux at the prefix; later registrations only touch the table.
pub struct Dispatcher {
    registry: Arc<Registry>,
    mux: ServeMux,
    installed: AtomicBool,
}

struct Registry {
    prefix: String,
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
    log: Arc<dyn LogSink>,
}

/// Entry point installed into the serve mux
struct DispatchEntry {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(prefix: impl Into<String>, mux: &ServeMux) -> Self {
        Self::with_log(prefix, mux, Arc::new(ProcessLog))
    }

    /// Create a dispatcher writing its warning and error lines to `log`
    pub fn with_log(prefix: impl Into<String>, mux: &ServeMux, log: Arc<dyn LogSink>) -> Self {
        Self {
            registry: Arc::new(Registry {
                prefix: prefix.into(),
                handlers: RwLock::new(HashMap::new()),
                log,
            }),
            mux: mux.clone(),
            installed: AtomicBool::new(false),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.registry.prefix
    }

    /// Register an async function or closure for `resource`
    pub fn handle_func<F>(&self, resource: impl Into<String>, handler: F)
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.handle(resource, handler);
    }

    /// Register `handler` for `resource`, replacing any earlier one
    pub fn handle<H>(&self, resource: impl Into<String>, handler: H)
    where
        H: Handler + 'static,
    {
        if !self.installed.swap(true, Ordering::AcqRel) {
            self.install();
        }
        self.registry
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resource.into(), Arc::new(handler));
    }

    /// Names of the registered resources, sorted
    pub fn resources(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registry
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Serve one request
    pub async fn dispatch(&self, req: Request<RequestBody>) -> Response<Full<Bytes>> {
        self.registry.dispatch(req).await
    }

    fn install(&self) {
        let entry = Arc::new(DispatchEntry {
            registry: Arc::clone(&self.registry),
        });
        if let Err(e) = self.mux.handle(self.registry.prefix.clone(), entry) {
            self.registry
                .log
                .error(&format!("Failed to install dispatcher: {e}"));
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("prefix", &self.registry.prefix)
            .field("resources", &self.resources())
            .finish_non_exhaustive()
    }
}

impl Endpoint for DispatchEntry {
    fn serve(&self, req: Request<RequestBody>) -> ResponseFuture {
        let registry = Arc::clone(&self.registry);
        Box::pin(async move { registry.dispatch(req).await })
    }
}

impl Registry {
    async fn dispatch(&self, req: Request<RequestBody>) -> Response<Full<Bytes>> {
        let mut response = self.respond(req).await;
        apply_cors_headers(&mut response);
        response
    }

    async fn respond(&self, req: Request<RequestBody>) -> Response<Full<Bytes>> {
        let path = match decode_path(req.uri().path()) {
            Ok(path) => path.into_owned(),
            Err(e) => return build_text_response(StatusCode::BAD_REQUEST, e.to_string()),
        };

        if req.method() == Method::OPTIONS {
            return build_empty_response(StatusCode::OK);
        }

        let paths = self.split_path(&path);
        let resource = paths.first().map_or("", String::as_str);
        let Some(handler) = self.lookup(resource) else {
            return build_text_response(
                StatusCode::NOT_FOUND,
                format!("No such resource '{resource}'"),
            );
        };

        let (parts, body) = req.into_parts();
        let (form, body) = match parse_form(&parts, body).await {
            Ok(parsed) => parsed,
            Err(e) => return build_text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        let mut ctx = Context::new(parts, path, body, form, paths, Arc::clone(&self.log));
        let outcome = handler.call(&mut ctx).await;
        ctx.drain_body().await;

        match outcome {
            Ok(reply) => encode_reply(&ctx, reply),
            Err(HandlerError::Rest(err)) => {
                ctx.log_warning(format_args!(
                    "{} {} restful error: {} {}",
                    ctx.method(),
                    ctx.uri(),
                    err.code,
                    err.reason
                ));
                encode_envelope(&err)
            }
            Err(HandlerError::Other(err)) => {
                ctx.log_warning(format_args!("{} {} error: {err}", ctx.method(), ctx.uri()));
                let status = ctx
                    .error_response_code()
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                build_text_response(status, err.to_string())
            }
        }
    }

    /// Segments of the path after the prefix; never empty
    fn split_path(&self, path: &str) -> Vec<String> {
        // the mux only routes paths under the prefix; anything else
        // resolves to the empty resource
        let suffix = path.get(self.prefix.len()..).unwrap_or("");
        suffix.split('/').map(str::to_string).collect()
    }

    fn lookup(&self, resource: &str) -> Option<Arc<dyn Handler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource)
            .cloned()
    }
}

fn encode_reply(ctx: &Context, reply: Reply) -> Response<Full<Bytes>> {
    let resource_type = ctx.resource_type();

    if resource_type == JSON_RESOURCE_TYPE {
        let encoded = match reply {
            Reply::Empty => Ok(b"{}".to_vec()),
            // raw bytes travel as a base64 string
            Reply::Bytes(data) => serde_json::to_vec(&STANDARD.encode(&data)),
            Reply::Json(payload) => payload.to_json(),
        };
        return match encoded {
            Ok(data) => build_content_response(resource_type, Bytes::from(data)),
            Err(e) => build_text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
    }

    match reply {
        Reply::Bytes(data) => build_content_response(resource_type, data),
        other => {
            ctx.log_error(format_args!(
                "Resource is not byte array. ({} reply for {resource_type})",
                other.kind()
            ));
            build_text_response(StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

/// Structured errors are always JSON, whatever resource type was set
fn encode_envelope(err: &RestError) -> Response<Full<Bytes>> {
    match serde_json::to_vec(err) {
        Ok(data) => build_content_response(JSON_RESOURCE_TYPE, Bytes::from(data)),
        Err(e) => build_text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
