//! Query string and url-encoded body parsing

use http_body_util::BodyExt;
use hyper::http::request::Parts;
use hyper::{header, Method};

use super::error::FormError;
use super::RequestBody;
use crate::http::{find_invalid_escape, InvalidEscape};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Ordered form values; body values precede query values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValues {
    pairs: Vec<(String, String)>,
}

impl FormValues {
    /// First value submitted under `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All values submitted under `name`, in submission order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromIterator<(String, String)> for FormValues {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// Parse the query string and, when the request carries one, the
/// url-encoded body.
///
/// Returns the body to hand on to the handler; it is empty when the
/// form parser consumed it.
pub async fn parse_form(
    parts: &Parts,
    body: RequestBody,
) -> Result<(FormValues, RequestBody), FormError> {
    let mut pairs = Vec::new();
    let mut body = body;

    if has_form_body(parts) {
        let collected = body
            .collect()
            .await
            .map_err(FormError::Body)?
            .to_bytes();
        let text = String::from_utf8_lossy(&collected);
        pairs.extend(decode_pairs(&text)?);
        body = super::empty_body();
    }

    if let Some(query) = parts.uri.query() {
        pairs.extend(decode_pairs(query)?);
    }

    Ok((FormValues { pairs }, body))
}

/// Only POST, PUT and PATCH bodies declared as url-encoded are form bodies
fn has_form_body(parts: &Parts) -> bool {
    if !matches!(parts.method, Method::POST | Method::PUT | Method::PATCH) {
        return false;
    }
    parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_URLENCODED))
}

fn decode_pairs(raw: &str) -> Result<Vec<(String, String)>, FormError> {
    validate(raw)?;
    Ok(serde_urlencoded::from_str(raw)?)
}

/// Reject `;` separators and malformed percent escapes
fn validate(raw: &str) -> Result<(), FormError> {
    if raw.contains(';') {
        return Err(FormError::Semicolon);
    }
    match find_invalid_escape(raw) {
        Some(InvalidEscape(escape)) => Err(FormError::InvalidEscape(escape)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::boxed_body;
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::Request;

    fn split(req: Request<&'static str>) -> (Parts, RequestBody) {
        let (parts, body) = req.into_parts();
        (parts, boxed_body(Full::new(Bytes::from(body))))
    }

    #[tokio::test]
    async fn test_query_values() {
        let (parts, body) = split(
            Request::get("/api/users?name=ann&tag=a&tag=b&empty=")
                .body("")
                .unwrap(),
        );
        let (form, _) = parse_form(&parts, body).await.unwrap();
        assert_eq!(form.get("name"), Some("ann"));
        assert_eq!(form.get("tag"), Some("a"));
        assert_eq!(form.get_all("tag").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(form.get("empty"), Some(""));
        assert_eq!(form.get("missing"), None);
    }

    #[tokio::test]
    async fn test_body_values_come_first() {
        let (parts, body) = split(
            Request::post("/api/users?name=query&page=2")
                .header("content-type", "application/x-www-form-urlencoded; charset=utf-8")
                .body("name=body+value&city=K%C3%B6ln")
                .unwrap(),
        );
        let (form, rest) = parse_form(&parts, body).await.unwrap();
        assert_eq!(form.get("name"), Some("body value"));
        assert_eq!(form.get("city"), Some("Köln"));
        assert_eq!(form.get("page"), Some("2"));
        assert_eq!(form.len(), 4);

        let remaining = rest.collect().await.unwrap().to_bytes();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_json_body_is_left_alone() {
        let (parts, body) = split(
            Request::post("/api/users")
                .header("content-type", "application/json")
                .body(r#"{"name":"ann"}"#)
                .unwrap(),
        );
        let (form, rest) = parse_form(&parts, body).await.unwrap();
        assert!(form.is_empty());
        let remaining = rest.collect().await.unwrap().to_bytes();
        assert_eq!(remaining.as_ref(), br#"{"name":"ann"}"#);
    }

    #[tokio::test]
    async fn test_get_body_is_not_a_form() {
        let (parts, body) = split(
            Request::get("/api/users")
                .header("content-type", "application/x-www-form-urlencoded")
                .body("name=ann")
                .unwrap(),
        );
        let (form, _) = parse_form(&parts, body).await.unwrap();
        assert_eq!(form.get("name"), None);
    }

    #[tokio::test]
    async fn test_invalid_escape() {
        let (parts, body) = split(Request::get("/api/users?name=%zz").body("").unwrap());
        let err = parse_form(&parts, body).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid URL escape \"%zz\"");

        let (parts, body) = split(Request::get("/api/users?name=%4").body("").unwrap());
        let err = parse_form(&parts, body).await.unwrap_err();
        assert!(matches!(err, FormError::InvalidEscape(ref s) if s == "%4"));
    }

    #[tokio::test]
    async fn test_semicolon_separator() {
        let (parts, body) = split(Request::get("/api/users?a=1;b=2").body("").unwrap());
        let err = parse_form(&parts, body).await.unwrap_err();
        assert!(matches!(err, FormError::Semicolon));
    }
}
