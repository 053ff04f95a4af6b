//! Serve mux
//!
//! Maps path patterns to endpoints. A pattern ending in `/` names a
//! subtree and matches every path below it; any other pattern matches
//! one path exactly. The longest matching pattern wins.
//!
//! Matching uses the percent-decoded path. A path that is not in
//! canonical form (`//`, `.` or `..` segments) is redirected to its
//! cleaned form first.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use crate::http::{
    build_redirect_response, build_text_response, clean_path, decode_path, encode_path,
};
use crate::rest::RequestBody;

/// Future of a routed response
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response<Full<Bytes>>> + Send>>;

/// Anything the mux can route a request to
pub trait Endpoint: Send + Sync {
    fn serve(&self, req: Request<RequestBody>) -> ResponseFuture;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MuxError {
    #[error("invalid pattern '{0}': must start with '/'")]
    InvalidPattern(String),
    #[error("multiple registrations for {0}")]
    Duplicate(String),
}

/// Shared route table; clones see the same routes
#[derive(Clone, Default)]
pub struct ServeMux {
    routes: Arc<RwLock<Vec<Route>>>,
}

struct Route {
    pattern: String,
    endpoint: Arc<dyn Endpoint>,
}

impl ServeMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `endpoint` at `pattern`
    pub fn handle(
        &self,
        pattern: impl Into<String>,
        endpoint: Arc<dyn Endpoint>,
    ) -> Result<(), MuxError> {
        let pattern = pattern.into();
        if !pattern.starts_with('/') {
            return Err(MuxError::InvalidPattern(pattern));
        }

        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        if routes.iter().any(|r| r.pattern == pattern) {
            return Err(MuxError::Duplicate(pattern));
        }
        routes.push(Route { pattern, endpoint });
        // longest first, so the first match is the most specific
        routes.sort_by(|a, b| b.pattern.len().cmp(&a.pattern.len()));
        Ok(())
    }

    /// Registered patterns, sorted
    pub fn patterns(&self) -> Vec<String> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let mut patterns: Vec<String> = routes.iter().map(|r| r.pattern.clone()).collect();
        patterns.sort();
        patterns
    }

    /// Endpoint for `path`, if any pattern matches
    pub fn route(&self, path: &str) -> Option<Arc<dyn Endpoint>> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes
            .iter()
            .find(|r| matches(&r.pattern, path))
            .map(|r| Arc::clone(&r.endpoint))
    }

    /// Whether `path` is a subtree root registered with a trailing slash
    fn redirects_to_subtree(&self, path: &str) -> bool {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes.iter().any(|r| {
            r.pattern.len() == path.len() + 1
                && r.pattern.starts_with(path)
                && r.pattern.ends_with('/')
        })
    }

    /// Route and serve one request
    pub async fn serve(&self, req: Request<RequestBody>) -> Response<Full<Bytes>> {
        let path = match decode_path(req.uri().path()) {
            Ok(path) => path.into_owned(),
            Err(e) => return build_text_response(StatusCode::BAD_REQUEST, e.to_string()),
        };
        // asterisk-form targets (`OPTIONS *`) name no resource
        if !path.starts_with('/') {
            return build_text_response(StatusCode::BAD_REQUEST, "400 Bad Request");
        }

        if req.method() != Method::CONNECT {
            let cleaned = clean_path(&path);
            if cleaned != path {
                return build_redirect_response(&redirect_target(&cleaned, req.uri().query()));
            }
        }

        if let Some(endpoint) = self.route(&path) {
            return endpoint.serve(req).await;
        }

        if self.redirects_to_subtree(&path) {
            let subtree = format!("{path}/");
            return build_redirect_response(&redirect_target(&subtree, req.uri().query()));
        }

        build_text_response(StatusCode::NOT_FOUND, "404 page not found")
    }
}

impl std::fmt::Debug for ServeMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServeMux")
            .field("patterns", &self.patterns())
            .finish()
    }
}

/// Encoded `path` with the original query appended
fn redirect_target(path: &str, query: Option<&str>) -> String {
    let encoded = encode_path(path);
    match query {
        Some(query) => format!("{encoded}?{query}"),
        None => encoded,
    }
}

fn matches(pattern: &str, path: &str) -> bool {
    if pattern.ends_with('/') {
        path.starts_with(pattern)
    } else {
        path == pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::boxed_body;
    use http_body_util::BodyExt;
    use hyper::header;

    struct Fixed(&'static str);

    impl Endpoint for Fixed {
        fn serve(&self, _req: Request<RequestBody>) -> ResponseFuture {
            let body = self.0;
            Box::pin(async move { build_text_response(StatusCode::OK, body) })
        }
    }

    fn get(uri: &str) -> Request<RequestBody> {
        Request::get(uri)
            .body(boxed_body(Full::new(Bytes::new())))
            .unwrap()
    }

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_match_path() {
        assert!(matches("/api/", "/api/"));
        assert!(matches("/api/", "/api/users/7"));
        assert!(!matches("/api/", "/api"));
        assert!(!matches("/api/", "/apix/users"));
        assert!(matches("/health", "/health"));
        assert!(!matches("/health", "/health/deep"));
    }

    #[tokio::test]
    async fn test_longest_pattern_wins() {
        let mux = ServeMux::new();
        mux.handle("/", Arc::new(Fixed("root"))).unwrap();
        mux.handle("/api/", Arc::new(Fixed("api"))).unwrap();
        mux.handle("/api/admin/", Arc::new(Fixed("admin"))).unwrap();

        assert_eq!(body_text(mux.serve(get("/api/users")).await).await, "api");
        assert_eq!(body_text(mux.serve(get("/api/admin/x")).await).await, "admin");
        assert_eq!(body_text(mux.serve(get("/index.html")).await).await, "root");
    }

    #[tokio::test]
    async fn test_not_found() {
        let mux = ServeMux::new();
        mux.handle("/api/", Arc::new(Fixed("api"))).unwrap();
        let response = mux.serve(get("/other")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "404 page not found");
    }

    #[tokio::test]
    async fn test_subtree_root_redirects() {
        let mux = ServeMux::new();
        mux.handle("/api/", Arc::new(Fixed("api"))).unwrap();
        let response = mux.serve(get("/api?x=1")).await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "/api/?x=1");
    }

    #[test]
    fn test_registration_errors() {
        let mux = ServeMux::new();
        mux.handle("/api/", Arc::new(Fixed("api"))).unwrap();
        assert_eq!(
            mux.handle("/api/", Arc::new(Fixed("again"))),
            Err(MuxError::Duplicate("/api/".to_string()))
        );
        assert_eq!(
            mux.handle("api/", Arc::new(Fixed("bad"))),
            Err(MuxError::InvalidPattern("api/".to_string()))
        );
        assert_eq!(mux.patterns(), vec!["/api/".to_string()]);
    }

    #[test]
    fn test_clones_share_routes() {
        let mux = ServeMux::new();
        let clone = mux.clone();
        clone.handle("/x", Arc::new(Fixed("x"))).unwrap();
        assert!(mux.route("/x").is_some());
        assert!(mux.route("/y").is_none());
    }

    #[tokio::test]
    async fn test_unclean_paths_redirect() {
        let mux = ServeMux::new();
        mux.handle("/api/", Arc::new(Fixed("api"))).unwrap();

        for (uri, location) in [
            ("/api//users", "/api/users"),
            ("/api/x/../users", "/api/users"),
            ("/api/./users/?page=2", "/api/users/?page=2"),
            ("/api/../../etc", "/etc"),
            ("/api//J%C3%BCrgen", "/api/J%C3%BCrgen"),
        ] {
            let response = mux.serve(get(uri)).await;
            assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY, "{uri}");
            assert_eq!(response.headers()[header::LOCATION], location, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_routes_on_decoded_path() {
        let mux = ServeMux::new();
        mux.handle("/api/", Arc::new(Fixed("api"))).unwrap();
        mux.handle("/health", Arc::new(Fixed("health"))).unwrap();

        assert_eq!(body_text(mux.serve(get("/%61pi/users")).await).await, "api");
        assert_eq!(body_text(mux.serve(get("/heal%74h")).await).await, "health");

        let response = mux.serve(get("/api/%zz")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, r#"invalid URL escape "%zz""#);
    }
}
