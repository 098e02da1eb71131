//! The boundary with the authoritative server.
//!
//! A `Request` describes one call against the server's REST API (`/expenses`, `/categories`, ...)
//! and a `Transport` carries it. `HttpTransport` talks to the real server over HTTP; `TestServer`
//! is an in-memory stand-in for the server.

mod http;
mod test_server;

use crate::model::{Collection, ExpenseFilter};
use crate::Config;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use url::{form_urlencoded, Url};

pub use http::HttpTransport;
pub use test_server::{Failure, TestServer};

/// The environment variable that, when non-empty, makes the program use `Mode::Test`.
pub const TEST_MODE_ENV: &str = "MEZGEB_IN_TEST_MODE";

/// Whether the program talks to the real server or to a seeded in-memory `TestServer`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Live,
    Test,
}

impl Mode {
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(v) if !v.is_empty() => Mode::Test,
            _ => Mode::Live,
        }
    }
}

/// Creates the `Transport` for `mode`.
pub fn transport(config: &Config, mode: Mode) -> anyhow::Result<Arc<dyn Transport>> {
    Ok(match mode {
        Mode::Live => Arc::new(HttpTransport::new(
            config.api_url(),
            config.token().map(str::to_string),
            config.request_timeout(),
        )?),
        Mode::Test => Arc::new(TestServer::seeded()),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn is_read(&self) -> bool {
        matches!(self, Method::Get)
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// A logical resource path on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A whole collection, e.g. `/expenses?categoryId=c1`. The filter only applies to expenses.
    Collection {
        collection: Collection,
        filter: ExpenseFilter,
    },
    /// One record of a collection, e.g. `/expenses/e1`.
    Item { collection: Collection, id: String },
    /// Anything this client does not cache, e.g. `/auth/me`.
    Other(String),
}

impl Endpoint {
    pub fn collection(collection: Collection) -> Self {
        Endpoint::Collection {
            collection,
            filter: ExpenseFilter::default(),
        }
    }

    pub fn expenses(filter: ExpenseFilter) -> Self {
        Endpoint::Collection {
            collection: Collection::Expenses,
            filter,
        }
    }

    pub fn item(collection: Collection, id: impl Into<String>) -> Self {
        Endpoint::Item {
            collection,
            id: id.into(),
        }
    }

    /// The cached collection this endpoint addresses, if any.
    pub fn target(&self) -> Option<Collection> {
        match self {
            Endpoint::Collection { collection, .. } | Endpoint::Item { collection, .. } => {
                Some(*collection)
            }
            Endpoint::Other(_) => None,
        }
    }

    /// The path without the query string.
    pub fn path(&self) -> String {
        match self {
            Endpoint::Collection { collection, .. } => collection.path().to_string(),
            Endpoint::Item { collection, id } => {
                format!("{}/{}", collection.path(), encode_segment(id))
            }
            Endpoint::Other(path) => path.clone(),
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Endpoint::Collection {
                collection: Collection::Expenses,
                filter,
            } => filter.query_pairs(),
            _ => Vec::new(),
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let pairs = self.query_pairs();
        if pairs.is_empty() {
            return f.write_str(&self.path());
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        write!(f, "{}?{query}", self.path())
    }
}

impl FromStr for Endpoint {
    type Err = anyhow::Error;

    /// Parses paths such as `/expenses`, `/expenses?search=taxi` or `/categories/c1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, query) = match s.split_once('?') {
            Some((path, query)) => (path, query),
            None => (s, ""),
        };
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let collection = match segments.first() {
            Some(&"expenses") => Collection::Expenses,
            Some(&"categories") => Collection::Categories,
            _ => return Ok(Endpoint::Other(s.to_string())),
        };
        match segments.as_slice() {
            [_] => {
                let mut filter = ExpenseFilter::default();
                if collection == Collection::Expenses {
                    let pairs: BTreeMap<String, String> = form_urlencoded::parse(query.as_bytes())
                        .into_owned()
                        .filter(|(_, v)| !v.is_empty())
                        .collect();
                    if !pairs.is_empty() {
                        filter = serde_json::from_value(serde_json::to_value(pairs)?)?;
                    }
                }
                Ok(Endpoint::Collection { collection, filter })
            }
            [_, id] => {
                // A `+` in a path is literal, unlike in a query string.
                let id = id.replace('+', "%2B");
                let id = form_urlencoded::parse(format!("id={id}").as_bytes())
                    .next()
                    .map(|(_, v)| v.into_owned())
                    .unwrap_or_default();
                Ok(Endpoint::Item { collection, id })
            }
            _ => Ok(Endpoint::Other(s.to_string())),
        }
    }
}

/// One call against the server: what to do, where, and with which body and extra headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    endpoint: Endpoint,
    body: Option<Value>,
    headers: BTreeMap<String, String>,
}

impl Request {
    pub fn new(method: Method, endpoint: Endpoint, body: Option<Value>) -> Self {
        Self {
            method,
            endpoint,
            body,
            headers: BTreeMap::new(),
        }
    }

    pub fn get(endpoint: Endpoint) -> Self {
        Self::new(Method::Get, endpoint, None)
    }

    pub fn post(endpoint: Endpoint, body: Value) -> Self {
        Self::new(Method::Post, endpoint, Some(body))
    }

    pub fn patch(endpoint: Endpoint, body: Value) -> Self {
        Self::new(Method::Patch, endpoint, Some(body))
    }

    pub fn delete(endpoint: Endpoint) -> Self {
        Self::new(Method::Delete, endpoint, None)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.endpoint)
    }
}

/// What came back from the server. `body` is `None` for 204 No Content and for bodies that are
/// empty or not JSON on an error status.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Option<Value>,
}

impl Response {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `error` field of an error body.
    pub fn error_message(&self) -> Option<String> {
        self.body
            .as_ref()
            .and_then(|b| b.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// How a request failed to produce a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The connection could not be established (refused, DNS failure, no route).
    Connect,
    /// The request or the response did not complete in time.
    Timeout,
    /// The connection dropped while the response was being read.
    Interrupted,
    /// A success response arrived but its body is not JSON.
    Decode,
    /// Anything else, e.g. an invalid URL.
    Other,
}

/// A failure to obtain a usable response. Classify it with
/// `connectivity::is_connectivity_failure`.
pub struct TransportError {
    kind: TransportErrorKind,
    source: anyhow::Error,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, source: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }
}

impl Debug for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransportError({:?}): {:?}", self.kind, self.source)
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.source)
    }
}

impl std::error::Error for TransportError {}

/// Carries a `Request` to the server.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response, TransportError>;
}

/// Percent-encodes `segment` as one path segment: `a b/c` becomes `a%20b%2Fc`.
fn encode_segment(segment: &str) -> String {
    let Ok(mut url) = Url::parse("http://localhost/") else {
        return segment.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(segment);
    }
    url.path().trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Amount;
    use serde_json::json;

    #[test]
    fn test_endpoint_display() {
        assert_eq!(
            Endpoint::collection(Collection::Categories).to_string(),
            "/categories"
        );
        assert_eq!(
            Endpoint::item(Collection::Expenses, "e1").to_string(),
            "/expenses/e1"
        );
        let filter = ExpenseFilter {
            search: Some("tea & coffee".to_string()),
            amount_min: Some(Amount::from(5)),
            ..ExpenseFilter::default()
        };
        assert_eq!(
            Endpoint::expenses(filter).to_string(),
            "/expenses?search=tea+%26+coffee&amountMin=5"
        );
    }

    #[test]
    fn test_item_path_encodes_the_id_as_a_segment() {
        let e = Endpoint::item(Collection::Expenses, "a b+c/d");
        assert_eq!(e.path(), "/expenses/a%20b+c%2Fd");
        assert_eq!(e.to_string(), "/expenses/a%20b+c%2Fd");
    }

    #[test]
    fn test_endpoint_parse() {
        let e: Endpoint = "/expenses?categoryId=c1&search=".parse().unwrap();
        assert_eq!(e, Endpoint::expenses(ExpenseFilter::category("c1")));

        let e: Endpoint = "/categories/c9".parse().unwrap();
        assert_eq!(e, Endpoint::item(Collection::Categories, "c9"));

        let e: Endpoint = "/expenses/a%20b+c%2Fd".parse().unwrap();
        assert_eq!(e, Endpoint::item(Collection::Expenses, "a b+c/d"));

        let e: Endpoint = "/auth/me".parse().unwrap();
        assert_eq!(e, Endpoint::Other("/auth/me".to_string()));
        assert_eq!(e.target(), None);
    }

    #[test]
    fn test_response_error_message() {
        let r = Response::new(400, Some(json!({"error": "Amount is required"})));
        assert!(!r.is_success());
        assert_eq!(r.error_message().as_deref(), Some("Amount is required"));
        assert_eq!(Response::new(204, None).error_message(), None);
        assert!(Response::new(204, None).is_success());
    }
}
