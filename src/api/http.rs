//! The `Transport` used against a real server: JSON over HTTP with reqwest.

use crate::api::{Method, Request, Response, Transport, TransportError, TransportErrorKind};
use anyhow::Context;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// Sends requests to the server rooted at `base_url`, e.g. `http://localhost:5000/api`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpTransport {
    /// - `base_url`: the API root; endpoint paths are appended to it
    /// - `token`: sent as `Authorization: Bearer <token>` when present
    /// - `timeout`: applies to each request as a whole
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API URL '{base_url}'"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Unable to build the HTTP client")?;
        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, request: &Request) -> Result<Url, TransportError> {
        let joined = format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            request.endpoint().path()
        );
        let mut url = Url::parse(&joined)
            .with_context(|| format!("Unable to build a URL for {request}"))
            .map_err(|e| TransportError::new(TransportErrorKind::Other, e))?;
        let pairs = request.endpoint().query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let url = self.url(request)?;
        let method = match request.method() {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };
        debug!("{} {url}", request.method());

        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(classify)?;
        trace!("{request} answered {status} with {} bytes", bytes.len());

        if status == 204 || bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Response::new(status, None));
        }
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(body) => Ok(Response::new(status, Some(body))),
            // Error pages from proxies are often HTML; the status alone is enough there.
            Err(_) if !(200..300).contains(&status) => Ok(Response::new(status, None)),
            Err(e) => Err(TransportError::new(
                TransportErrorKind::Decode,
                anyhow::Error::new(e).context(format!("The response to {request} is not JSON")),
            )),
        }
    }
}

/// Sorts a reqwest failure into connectivity problems and everything else.
fn classify(e: reqwest::Error) -> TransportError {
    let kind = if e.is_timeout() {
        TransportErrorKind::Timeout
    } else if e.is_connect() {
        TransportErrorKind::Connect
    } else if e.is_body() || e.is_request() {
        TransportErrorKind::Interrupted
    } else if e.is_decode() {
        TransportErrorKind::Decode
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Endpoint;
    use crate::model::{Collection, ExpenseFilter};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer, token: Option<&str>) -> HttpTransport {
        HttpTransport::new(
            &format!("{}/api", server.uri()),
            token.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_with_filter_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/expenses"))
            .and(query_param("categoryId", "c1"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"_id": "e1"}])))
            .expect(1)
            .mount(&server)
            .await;

        let response = transport(&server, Some("secret"))
            .send(&Request::get(Endpoint::expenses(ExpenseFilter::category("c1"))))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, Some(json!([{"_id": "e1"}])));
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/categories"))
            .and(body_json(json!({"name": "Food"})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"_id": "c1", "name": "Food"})),
            )
            .mount(&server)
            .await;

        let response = transport(&server, None)
            .send(&Request::post(
                Endpoint::collection(Collection::Categories),
                json!({"name": "Food"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.body.unwrap()["_id"], "c1");
    }

    #[tokio::test]
    async fn test_no_content_and_error_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/expenses/e1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/expenses/e2"))
            .respond_with(ResponseTemplate::new(404).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;
        let transport = transport(&server, None);

        let deleted = transport
            .send(&Request::delete(Endpoint::item(Collection::Expenses, "e1")))
            .await
            .unwrap();
        assert_eq!(deleted, Response::new(204, None));

        let missing = transport
            .send(&Request::delete(Endpoint::item(Collection::Expenses, "e2")))
            .await
            .unwrap();
        assert_eq!(missing, Response::new(404, None));
    }

    #[test]
    fn test_item_id_is_a_single_path_segment() {
        let t = HttpTransport::new("http://localhost:5000/api/", None, Duration::from_secs(1))
            .unwrap();
        let request = Request::delete(Endpoint::item(Collection::Categories, "a b+c/d"));
        assert_eq!(
            t.url(&request).unwrap().as_str(),
            "http://localhost:5000/api/categories/a%20b+c%2Fd"
        );
    }

    #[tokio::test]
    async fn test_garbled_success_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/categories"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;
        let err = transport(&server, None)
            .send(&Request::get(Endpoint::collection(Collection::Categories)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_connect_error() {
        // Bind then drop a listener to get a local port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = HttpTransport::new(
            &format!("http://127.0.0.1:{port}/api"),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = transport
            .send(&Request::get(Endpoint::collection(Collection::Expenses)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Connect);
    }
}
