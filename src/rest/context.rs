//! Per-request context handed to resource handlers

use http_body_util::BodyExt;
use hyper::http::request::Parts;
use hyper::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

use super::error::ContextError;
use super::form::FormValues;
use super::{empty_body, RequestBody};
use crate::logger::LogSink;

/// Response type handlers get unless they choose another one
pub const JSON_RESOURCE_TYPE: &str = "application/json";

/// Connection facts the server attaches to every request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnInfo {
    /// Peer address in `host:port` form
    pub remote_addr: String,
    /// Whether the connection is encrypted
    pub tls: bool,
}

/// Request facade for one request/response cycle.
///
/// Gives handlers read access to the request and lets them shape the
/// response: the resource type decides how the reply is encoded and the
/// error response code replaces 500 for opaque errors.
pub struct Context {
    parts: Parts,
    path: String,
    body: RequestBody,
    form: FormValues,
    paths: Vec<String>,
    resource_type: String,
    error_code: Option<StatusCode>,
    log: Arc<dyn LogSink>,
}

impl Context {
    pub(crate) fn new(
        parts: Parts,
        path: String,
        body: RequestBody,
        form: FormValues,
        paths: Vec<String>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            parts,
            path,
            body,
            form,
            paths,
            resource_type: JSON_RESOURCE_TYPE.to_string(),
            error_code: None,
            log,
        }
    }

    pub fn log_warning(&self, args: fmt::Arguments<'_>) {
        self.log.warning(&args.to_string());
    }

    pub fn log_error(&self, args: fmt::Arguments<'_>) {
        self.log.error(&args.to_string());
    }

    /// Host part of the peer address
    pub fn client_address(&self) -> Result<String, ContextError> {
        let remote = self
            .parts
            .extensions
            .get::<ConnInfo>()
            .map_or("", |info| info.remote_addr.as_str());
        split_host_port(remote).map(|(host, _)| host.to_string())
    }

    pub const fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Percent-decoded request path without the query string
    pub fn uri(&self) -> &str {
        &self.path
    }

    /// Request host from the URI authority or the `Host` header
    pub fn host(&self) -> &str {
        if let Some(authority) = self.parts.uri.authority() {
            return authority.as_str();
        }
        self.parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    pub fn is_tls(&self) -> bool {
        self.parts
            .extensions
            .get::<ConnInfo>()
            .is_some_and(|info| info.tls)
    }

    /// Path segment `i` after the prefix; segment 0 is the resource name
    pub fn path(&self, i: usize) -> &str {
        self.paths.get(i).map_or("", String::as_str)
    }

    /// Submitted form or query value, or `preset` when absent or empty
    pub fn form_value<'a>(&'a self, name: &str, preset: &'a str) -> &'a str {
        match self.form.get(name) {
            Some(value) if !value.is_empty() => value,
            _ => preset,
        }
    }

    pub const fn form(&self) -> &FormValues {
        &self.form
    }

    /// Decode the first JSON value of the request body
    pub async fn parse_json<T>(&mut self) -> Result<T, ContextError>
    where
        T: DeserializeOwned,
    {
        let body = std::mem::replace(&mut self.body, empty_body());
        let data = body
            .collect()
            .await
            .map_err(ContextError::Body)?
            .to_bytes();
        let mut values = serde_json::Deserializer::from_slice(&data).into_iter::<T>();
        match values.next() {
            Some(value) => Ok(value?),
            None => Err(ContextError::EmptyBody),
        }
    }

    /// Set the response `Content-Type`; anything but JSON needs a bytes reply
    pub fn set_resource_type(&mut self, resource_type: impl Into<String>) {
        self.resource_type = resource_type.into();
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Status code for opaque errors; structured errors ignore it
    pub fn set_error_response_code(&mut self, code: StatusCode) {
        self.error_code = Some(code);
    }

    pub const fn error_response_code(&self) -> Option<StatusCode> {
        self.error_code
    }

    /// Read and discard whatever the handler left of the body, one
    /// frame at a time
    pub(crate) async fn drain_body(&mut self) {
        let mut body = std::mem::replace(&mut self.body, empty_body());
        while let Some(frame) = body.frame().await {
            if let Err(e) = frame {
                self.log.warning(&format!(
                    "{} {} failed to drain request body: {e}",
                    self.parts.method, self.path
                ));
                break;
            }
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.parts.method)
            .field("path", &self.path)
            .field("paths", &self.paths)
            .field("resource_type", &self.resource_type)
            .field("error_code", &self.error_code)
            .finish_non_exhaustive()
    }
}

/// Split `host:port`, `[v6]:port` or `[v6%zone]:port`
pub fn split_host_port(addr: &str) -> Result<(&str, &str), ContextError> {
    let fail = |reason| ContextError::Address {
        addr: addr.to_string(),
        reason,
    };

    let Some(colon) = addr.rfind(':') else {
        return Err(fail("missing port in address"));
    };

    let (host, after_host) = if let Some(rest) = addr.strip_prefix('[') {
        let Some(close) = rest.find(']') else {
            return Err(fail("missing ']' in address"));
        };
        // offsets below are into `addr`
        let end = close + 1;
        if end + 1 == addr.len() {
            return Err(fail("missing port in address"));
        }
        if end + 1 != colon {
            return Err(if addr.as_bytes()[end + 1] == b':' {
                fail("too many colons in address")
            } else {
                fail("missing port in address")
            });
        }
        (&rest[..close], 1)
    } else {
        let host = &addr[..colon];
        if host.contains(':') {
            return Err(fail("too many colons in address"));
        }
        (host, 0)
    };

    if addr[after_host..].contains('[') {
        return Err(fail("unexpected '[' in address"));
    }
    let bracket_end = if after_host == 0 { 0 } else { colon };
    if addr[bracket_end..].contains(']') {
        return Err(fail("unexpected ']' in address"));
    }
    Ok((host, &addr[colon + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemoryLog;
    use crate::rest::boxed_body;
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::Request;
    use serde::Deserialize;

    fn context_for(req: Request<&'static str>, paths: &[&str]) -> (Context, Arc<MemoryLog>) {
        let log = Arc::new(MemoryLog::default());
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_string();
        let ctx = Context::new(
            parts,
            path,
            boxed_body(Full::new(Bytes::from(body))),
            FormValues::default(),
            paths.iter().map(ToString::to_string).collect(),
            log.clone(),
        );
        (ctx, log)
    }

    #[test]
    fn test_path_segments() {
        let (ctx, _) = context_for(
            Request::get("/api/users/7/posts").body("").unwrap(),
            &["users", "7", "posts"],
        );
        assert_eq!(ctx.path(0), "users");
        assert_eq!(ctx.path(2), "posts");
        assert_eq!(ctx.path(3), "");
        assert_eq!(ctx.path(usize::MAX), "");
    }

    #[test]
    fn test_accessors() {
        let (ctx, _) = context_for(
            Request::put("/api/users?x=1")
                .header("host", "example.org:8080")
                .body("")
                .unwrap(),
            &["users"],
        );
        assert_eq!(ctx.method(), Method::PUT);
        assert_eq!(ctx.uri(), "/api/users");
        assert_eq!(ctx.host(), "example.org:8080");
        assert!(!ctx.is_tls());
        assert_eq!(ctx.resource_type(), JSON_RESOURCE_TYPE);
        assert_eq!(ctx.error_response_code(), None);
    }

    #[test]
    fn test_host_prefers_authority() {
        let (ctx, _) = context_for(
            Request::get("http://proxy.local/api/users")
                .header("host", "other")
                .body("")
                .unwrap(),
            &["users"],
        );
        assert_eq!(ctx.host(), "proxy.local");
    }

    #[test]
    fn test_client_address_from_conn_info() {
        let mut req = Request::get("/api/x").body("").unwrap();
        req.extensions_mut().insert(ConnInfo {
            remote_addr: "[::1]:51234".to_string(),
            tls: true,
        });
        let (ctx, _) = context_for(req, &["x"]);
        assert_eq!(ctx.client_address().unwrap(), "::1");
        assert!(ctx.is_tls());
    }

    #[test]
    fn test_client_address_without_conn_info() {
        let (ctx, _) = context_for(Request::get("/api/x").body("").unwrap(), &["x"]);
        let err = ctx.client_address().unwrap_err();
        assert!(err.to_string().contains("missing port in address"));
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("10.0.0.1:80").unwrap(), ("10.0.0.1", "80"));
        assert_eq!(split_host_port("localhost:").unwrap(), ("localhost", ""));
        assert_eq!(split_host_port("[fe80::1%eth0]:443").unwrap(), ("fe80::1%eth0", "443"));
        assert_eq!(split_host_port(":8080").unwrap(), ("", "8080"));

        let reason = |addr| match split_host_port(addr) {
            Err(ContextError::Address { reason, .. }) => reason,
            other => panic!("expected address error, got {other:?}"),
        };
        assert_eq!(reason("10.0.0.1"), "missing port in address");
        assert_eq!(reason("::1:80"), "too many colons in address");
        assert_eq!(reason("[::1"), "missing ']' in address");
        assert_eq!(reason("[::1]"), "missing port in address");
        assert_eq!(reason("[::1]:80:90"), "too many colons in address");
        assert_eq!(reason("a]b:80"), "unexpected ']' in address");
        assert_eq!(reason("[a[b]:80"), "unexpected '[' in address");
    }

    #[test]
    fn test_form_value_preset() {
        let log = Arc::new(MemoryLog::default());
        let (parts, _) = Request::get("/api/x").body(()).unwrap().into_parts();
        let form: FormValues = [("name", "ann"), ("empty", "")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let ctx = Context::new(
            parts,
            "/api/x".to_string(),
            empty_body(),
            form,
            vec!["x".into()],
            log,
        );
        assert_eq!(ctx.form_value("name", "nobody"), "ann");
        assert_eq!(ctx.form_value("empty", "nobody"), "nobody");
        assert_eq!(ctx.form_value("missing", "nobody"), "nobody");
        assert_eq!(ctx.form_value("missing", ""), "");
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        name: String,
        age: u32,
    }

    #[tokio::test]
    async fn test_parse_json() {
        let (mut ctx, _) = context_for(
            Request::post("/api/users")
                .body(r#"{"name":"ann","age":31} trailing"#)
                .unwrap(),
            &["users"],
        );
        let user: User = ctx.parse_json().await.unwrap();
        assert_eq!(
            user,
            User {
                name: "ann".to_string(),
                age: 31
            }
        );
    }

    #[tokio::test]
    async fn test_parse_json_errors() {
        let (mut ctx, _) = context_for(
            Request::post("/api/users").body(r#"{"name":"#).unwrap(),
            &["users"],
        );
        let err = ctx.parse_json::<User>().await.unwrap_err();
        assert!(matches!(err, ContextError::Json(_)));

        let (mut ctx, _) = context_for(Request::post("/api/users").body("").unwrap(), &["users"]);
        let err = ctx.parse_json::<User>().await.unwrap_err();
        assert!(matches!(err, ContextError::EmptyBody));
    }

    #[test]
    fn test_response_settings_last_write_wins() {
        let (mut ctx, log) = context_for(Request::get("/api/x").body("").unwrap(), &["x"]);
        ctx.set_resource_type("text/plain");
        ctx.set_resource_type("text/csv");
        ctx.set_error_response_code(StatusCode::BAD_REQUEST);
        ctx.set_error_response_code(StatusCode::IM_A_TEAPOT);
        assert_eq!(ctx.resource_type(), "text/csv");
        assert_eq!(ctx.error_response_code(), Some(StatusCode::IM_A_TEAPOT));

        ctx.log_warning(format_args!("slow {}", 3));
        ctx.log_error(format_args!("broken"));
        assert_eq!(log.warnings(), vec!["slow 3".to_string()]);
        assert_eq!(log.errors(), vec!["broken".to_string()]);
    }

    /// Yields one data frame, then fails on every later poll
    struct ResetBody {
        sent: bool,
    }

    impl hyper::body::Body for ResetBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Result<hyper::body::Frame<Bytes>, std::io::Error>>> {
            if self.sent {
                return std::task::Poll::Ready(Some(Err(std::io::Error::other("connection reset"))));
            }
            self.sent = true;
            std::task::Poll::Ready(Some(Ok(hyper::body::Frame::data(Bytes::from_static(b"part")))))
        }
    }

    #[tokio::test]
    async fn test_drain_stops_at_first_body_error() {
        let log = Arc::new(MemoryLog::default());
        let (parts, ()) = Request::post("/api/up%6Coad").body(()).unwrap().into_parts();
        let mut ctx = Context::new(
            parts,
            "/api/upload".to_string(),
            boxed_body(ResetBody { sent: false }),
            FormValues::default(),
            vec!["upload".into()],
            log.clone(),
        );

        ctx.drain_body().await;
        assert_eq!(
            log.warnings(),
            vec!["POST /api/upload failed to drain request body: connection reset".to_string()]
        );
        assert_eq!(ctx.uri(), "/api/upload");
    }
}
