use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use rentline_core::{Transport, TransportBody, TransportError, TransportRequest, TransportResponse};
use rentline_domain::{ApiError, FormPart, Method};
use reqwest::multipart::{Form, Part};
use reqwest::Client as ReqwestClient;
use tracing::debug;

/// reqwest-backed [`Transport`].
///
/// Performs exactly one exchange per call. Retries, status classification and
/// auth handling live in the API client above it.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    timeout: Duration,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, ApiError> {
        Self::builder().build()
    }

    fn lower_method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let timeout = request.timeout.unwrap_or(self.timeout);
        let method = Self::lower_method(request.method);

        let mut builder = self.client.request(method.clone(), &request.url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            TransportBody::Empty => builder,
            TransportBody::Bytes(data) => builder.body(data),
            TransportBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        };

        debug!(%method, url = %request.url, "sending HTTP request");

        let response = builder.send().await.map_err(|err| map_reqwest_error(&err, timeout))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|err| map_reqwest_error(&err, timeout))?;

        debug!(%method, url = %request.url, status, "received HTTP response");

        Ok(TransportResponse { status, headers, body: body.to_vec() })
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: BTreeMap<String, String>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: Some(concat!("rentline/", env!("CARGO_PKG_VERSION")).to_string()),
            default_headers: BTreeMap::new(),
        }
    }
}

impl HttpClientBuilder {
    /// Timeout applied when a request does not carry its own.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Result<HttpClient, ApiError> {
        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &self.default_headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::Config(format!("Invalid header name {name}: {e}")))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| ApiError::Config(format!("Invalid header value: {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = ReqwestClient::builder().default_headers(headers).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        let client = builder
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(HttpClient { client, timeout: self.timeout })
    }
}

fn build_form(parts: Vec<FormPart>) -> Result<Form, TransportError> {
    parts.into_iter().try_fold(Form::new(), |form, part| match part {
        FormPart::Text { name, value } => Ok(form.text(name, value)),
        FormPart::File { name, filename, content_type, data } => {
            let mut file = Part::bytes(data).file_name(filename);
            if let Some(content_type) = content_type {
                file = file
                    .mime_str(&content_type)
                    .map_err(|e| TransportError::Request(format!("invalid part type: {e}")))?;
            }
            Ok(form.part(name, file))
        }
    })
}

fn map_reqwest_error(err: &reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout(timeout);
    }
    if err.is_connect() {
        return TransportError::Connect(err.to_string());
    }
    TransportError::Request(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_with_defaults() -> HttpClient {
        HttpClient::builder().timeout(Duration::from_secs(5)).build().expect("http client")
    }

    #[tokio::test]
    async fn returns_successful_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cities/"))
            .and(header("accept", "application/json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string(r#"[{"id":1}]"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut request = TransportRequest::new(Method::Get, format!("{}/cities/", server.uri()));
        request.headers.insert("accept".into(), "application/json".into());

        let response = client_with_defaults().send(request).await.expect("response");
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(response.body, br#"[{"id":1}]"#.to_vec());
    }

    #[tokio::test]
    async fn non_success_status_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let request = TransportRequest::new(Method::Delete, format!("{}/leases/9/", server.uri()));
        let response = client_with_defaults().send(request).await.expect("response");
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn multipart_body_sets_boundary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let mut request = TransportRequest::new(Method::Post, format!("{}/uploads/", server.uri()));
        request.body = TransportBody::Multipart(vec![
            FormPart::text("property", "12"),
            FormPart::file("image", "front.jpg", vec![0xff, 0xd8, 0xff]),
        ]);

        let response = client_with_defaults().send(request).await.expect("response");
        assert_eq!(response.status, 201);

        let received = server.received_requests().await.unwrap();
        let content_type = received[0].headers.get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
    }

    #[tokio::test]
    async fn per_request_timeout_is_enforced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let mut request = TransportRequest::new(Method::Get, server.uri());
        request.timeout = Some(Duration::from_millis(50));

        let result = client_with_defaults().send(request).await;
        assert_eq!(result, Err(TransportError::Timeout(Duration::from_millis(50))));
    }

    #[tokio::test]
    async fn connection_refused_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // release the port so that requests fail with ECONNREFUSED

        let request = TransportRequest::new(Method::Get, format!("http://{}", addr));
        match client_with_defaults().send(request).await {
            Err(TransportError::Connect(_)) => {}
            other => panic!("expected connect error, got {:?}", other),
        }
    }
}
