//! In-process HTTP mock server for client tests.
//!
//! Routes are matched on method and path; every request is recorded so
//! tests can assert on what a client actually sent.
//!
//! ```ignore
//! let server = MockServer::builder()
//!     .json("GET", "/collections", fixtures::stac::collections(&["cmip6"], None))
//!     .start()
//!     .await;
//! let url = server.url("/collections");
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// `Host` header, used to build absolute links back to the server.
    pub host: Option<String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Body parsed as JSON, `Value::Null` when it is not JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }

    /// Absolute URL for `path` on the server that received this request.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.host.as_deref().unwrap_or("127.0.0.1"), path)
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Value of a query string parameter, percent-decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == name).then(|| percent_decode(v))
        })
    }
}

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json".to_string(),
            body: value.to_string().into_bytes(),
            delay: None,
        }
    }

    pub fn bytes(body: Vec<u8>, content_type: &str) -> Self {
        Self {
            status: 200,
            content_type: content_type.to_string(),
            body,
            delay: None,
        }
    }

    pub fn status(status: u16, text: &str) -> Self {
        Self {
            status,
            content_type: "text/plain".to_string(),
            body: text.as_bytes().to_vec(),
            delay: None,
        }
    }

    /// Hold the response back, to exercise client timeouts.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Handler = Arc<dyn Fn(&RecordedRequest) -> MockResponse + Send + Sync>;

struct Route {
    method: String,
    path: String,
    handler: Handler,
}

#[derive(Clone)]
struct MockState {
    routes: Arc<Vec<Route>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Builder for [`MockServer`].
#[derive(Default)]
pub struct MockServerBuilder {
    routes: Vec<Route>,
}

impl MockServerBuilder {
    /// Answer `method path` with a fixed JSON body.
    pub fn json(self, method: &str, path: &str, value: serde_json::Value) -> Self {
        let response = MockResponse::json(value);
        self.respond(method, path, move |_| response.clone())
    }

    /// Answer `method path` with a fixed response.
    pub fn response(self, method: &str, path: &str, response: MockResponse) -> Self {
        self.respond(method, path, move |_| response.clone())
    }

    /// Answer `method path` by calling `handler` for each request.
    pub fn respond<F>(mut self, method: &str, path: &str, handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        self.routes.push(Route {
            method: method.to_uppercase(),
            path: path.to_string(),
            handler: Arc::new(handler),
        });
        self
    }

    /// Bind to an ephemeral localhost port and start serving.
    pub async fn start(self) -> MockServer {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            routes: Arc::new(self.routes),
            requests: requests.clone(),
        };
        let app = Router::new().fallback(dispatch).with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Mock server has no local address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        MockServer { addr, requests }
    }
}

/// A running mock server. It stops with the test runtime.
pub struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::default()
    }

    /// Base URL, e.g. `http://127.0.0.1:40123`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL for a path on this server.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// All requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log poisoned").clone()
    }

    /// Requests received for a path.
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn dispatch(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = RecordedRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        host: headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string),
        body: body.to_vec(),
    };
    state
        .requests
        .lock()
        .expect("request log poisoned")
        .push(request.clone());

    let route = state
        .routes
        .iter()
        .find(|r| r.method == request.method && r.path == request.path);
    let Some(route) = route else {
        let message = format!("no mock route for {} {}", request.method, request.path);
        return (StatusCode::NOT_FOUND, message).into_response();
    };

    let response = (route.handler)(&request);
    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }

    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, response.content_type)], response.body).into_response()
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_param_decoding() {
        let req = RecordedRequest {
            method: "GET".into(),
            path: "/sign".into(),
            query: Some("href=https%3A%2F%2Fa.blob%2Fx.tif&other=1+2".into()),
            host: Some("127.0.0.1:8080".into()),
            body: Vec::new(),
        };
        assert_eq!(req.query_param("href").as_deref(), Some("https://a.blob/x.tif"));
        assert_eq!(req.query_param("other").as_deref(), Some("1 2"));
        assert_eq!(req.query_param("missing"), None);
        assert_eq!(req.url("/next"), "http://127.0.0.1:8080/next");
    }

    #[tokio::test]
    async fn test_routes_and_recording() {
        let server = MockServer::builder()
            .json("GET", "/collections", json!({"collections": []}))
            .respond("POST", "/search", |req| MockResponse::json(req.json()))
            .start()
            .await;

        let client = reqwest::Client::new();
        let body: serde_json::Value = client
            .post(server.url("/search"))
            .json(&json!({"limit": 5}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["limit"], 5);

        let missing = client.get(server.url("/nope")).send().await.unwrap();
        assert_eq!(missing.status().as_u16(), 404);

        assert_eq!(server.requests().len(), 2);
        assert_eq!(server.requests_to("/search")[0].method, "POST");
    }
}
