//! HTTP mocking utilities using wiremock.

use serde::Serialize;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// HTTP mock server wrapper with convenience methods
pub struct TestHttpServer {
    server: MockServer,
}

impl TestHttpServer {
    /// Start a new mock server
    pub async fn start() -> Self {
        crate::init();
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Get URL for a specific path
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    /// Access the underlying MockServer
    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// Register a GET endpoint that returns JSON
    pub async fn get_json<T: Serialize>(&self, endpoint: &str, response: &T) {
        MockBuilder::get(endpoint)
            .respond_json(200, response)
            .mount(self)
            .await;
    }

    /// Register an endpoint that always answers with `status`, for any method
    pub async fn status(&self, endpoint: &str, status: u16) {
        Mock::given(path(endpoint))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Register a sequence of responses, served in order, each once
    pub async fn sequence(&self, endpoint: &str, responses: Vec<ResponseTemplate>) {
        for (i, response) in responses.into_iter().enumerate() {
            Mock::given(path(endpoint))
                .respond_with(response)
                .up_to_n_times(1)
                .with_priority(100 - i as u8)
                .mount(&self.server)
                .await;
        }
    }

    /// Assert how many requests reached `endpoint`
    pub async fn verify_received(&self, endpoint: &str, times: u64) {
        let count = self.requests_to(endpoint).await.len() as u64;
        assert_eq!(
            count, times,
            "Expected {} requests to {}, got {}",
            times, endpoint, count
        );
    }

    /// Get all received requests
    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Requests received for one path, in arrival order
    pub async fn requests_to(&self, endpoint: &str) -> Vec<Request> {
        self.received_requests()
            .await
            .into_iter()
            .filter(|r| r.url.path() == endpoint)
            .collect()
    }

    /// Clear all mocks and recorded requests
    pub async fn reset(&self) {
        self.server.reset().await;
    }
}

/// Value of a header on a recorded request
pub fn header_value(request: &Request, name: &str) -> Option<String> {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Builder for mocks matching method, path, headers and body
pub struct MockBuilder {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body_matcher: Option<serde_json::Value>,
    expected_calls: Option<u64>,
}

impl MockBuilder {
    fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: Vec::new(),
            body_matcher: None,
            expected_calls: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new("GET", path)
    }

    pub fn post(path: &str) -> Self {
        Self::new("POST", path)
    }

    pub fn put(path: &str) -> Self {
        Self::new("PUT", path)
    }

    pub fn patch(path: &str) -> Self {
        Self::new("PATCH", path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new("DELETE", path)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_json_body<T: Serialize>(mut self, body: &T) -> Self {
        self.body_matcher = serde_json::to_value(body).ok();
        self
    }

    /// Fail verification on drop unless exactly `n` requests matched
    pub fn expect(mut self, n: u64) -> Self {
        self.expected_calls = Some(n);
        self
    }

    pub fn respond_with(self, response: ResponseTemplate) -> MockSetup {
        MockSetup {
            builder: self,
            response,
        }
    }

    pub fn respond_json<T: Serialize>(self, status: u16, body: &T) -> MockSetup {
        self.respond_with(ResponseTemplate::new(status).set_body_json(body))
    }
}

pub struct MockSetup {
    builder: MockBuilder,
    response: ResponseTemplate,
}

impl MockSetup {
    pub async fn mount(self, server: &TestHttpServer) {
        let mut mock =
            Mock::given(method(self.builder.method.as_str())).and(path(self.builder.path.as_str()));

        for (name, value) in &self.builder.headers {
            mock = mock.and(header(name.as_str(), value.as_str()));
        }

        if let Some(body) = &self.builder.body_matcher {
            mock = mock.and(body_json(body));
        }

        let mut mock = mock.respond_with(self.response);
        if let Some(n) = self.builder.expected_calls {
            mock = mock.expect(n);
        }

        mock.mount(server.inner()).await;
    }
}

/// Common response templates
pub mod responses {
    use super::*;

    pub fn ok() -> ResponseTemplate {
        ResponseTemplate::new(200)
    }

    pub fn created() -> ResponseTemplate {
        ResponseTemplate::new(201)
    }

    pub fn no_content() -> ResponseTemplate {
        ResponseTemplate::new(204)
    }

    pub fn json<T: Serialize>(status: u16, body: &T) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_json(body)
    }

    /// Error response whose body carries its own `message`
    pub fn with_message(status: u16, message: &str) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_json(serde_json::json!({ "message": message }))
    }

    /// 200 whose body reports a backend-level failure
    pub fn logical_failure(message: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({ "success": false, "message": message }))
    }

    /// Empty response carrying the given headers; repeated names are all sent
    pub fn with_headers(status: u16, headers: &[(&str, &str)]) -> ResponseTemplate {
        headers
            .iter()
            .fold(ResponseTemplate::new(status), |template, (name, value)| {
                template.append_header(*name, *value)
            })
    }

    pub fn server_error() -> ResponseTemplate {
        ResponseTemplate::new(500)
    }

    pub fn bad_gateway() -> ResponseTemplate {
        ResponseTemplate::new(502)
    }

    pub fn service_unavailable() -> ResponseTemplate {
        ResponseTemplate::new(503)
    }

    pub fn delayed(delay: Duration) -> ResponseTemplate {
        ResponseTemplate::new(200).set_delay(delay)
    }
}
