use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt, stream};
use serde::de::DeserializeOwned;

use crate::error::HttpError;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// The body of a response, streamed chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, HttpError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// A request body. Chunked uploads hold each chunk in memory, so `Bytes`
/// is enough; there is no unreplayable streaming variant, which is what
/// makes retrying safe.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    Empty,
    Json(serde_json::Value),
    Bytes(Bytes),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Empty => 0,
            Payload::Json(value) => value.to_string().len(),
            Payload::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

/// A request against either the main API or a storage endpoint.
///
/// `url` holds a path relative to the transport's base, or an absolute URL
/// when dispatched through [`Transport::send_absolute`].
///
/// [`Transport::send_absolute`]: crate::Transport::send_absolute
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub payload: Payload,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            payload: Payload::Empty,
        }
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }
}

/// A response: status, headers (names lowercased), and a body stream.
pub struct Response {
    pub status: u16,
    headers: HashMap<String, String>,
    body: ByteStream,
}

impl Response {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: ByteStream) -> Self {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        Self {
            status,
            headers,
            body,
        }
    }

    /// Build a response whose whole body is already in memory.
    pub fn of_bytes(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self::new(
            status,
            headers,
            Box::pin(stream::iter([Ok::<_, HttpError>(body)])),
        )
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| &**v)
    }

    pub fn into_body(self) -> ByteStream {
        self.body
    }

    /// Drain the body into one buffer.
    pub async fn bytes(mut self) -> Result<Bytes, HttpError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Drain the body and decode it as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Asynchronous HTTP client abstraction.
///
/// Object safe so transports can hold `Arc<dyn HttpClient>`; tests swap in
/// mock implementations that record requests and script responses.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response, HttpError>;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;

    /// Production HTTP client implementation using `reqwest`.
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        pub fn new() -> Result<Self, HttpError> {
            let client = reqwest::Client::builder()
                .build()
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl HttpClient for ReqwestClient {
        async fn execute(&self, request: Request) -> Result<Response, HttpError> {
            let method = match request.method {
                Method::Get => reqwest::Method::GET,
                Method::Head => reqwest::Method::HEAD,
                Method::Post => reqwest::Method::POST,
                Method::Put => reqwest::Method::PUT,
                Method::Patch => reqwest::Method::PATCH,
                Method::Delete => reqwest::Method::DELETE,
            };
            let mut builder = self.client.request(method, &request.url);
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder = match request.payload {
                Payload::Empty => builder,
                Payload::Json(value) => builder.json(&value),
                Payload::Bytes(bytes) => builder
                    .header("Content-Type", "application/octet-stream")
                    .body(bytes),
            };

            let response = builder
                .send()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| HttpError::Transport(e.to_string())));
            Ok(Response::new(status, headers, Box::pin(body)))
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn response_headers_are_case_insensitive() {
        let response = Response::of_bytes(
            200,
            vec![("Upload-ID".to_string(), "up-123".to_string())],
            Bytes::new(),
        );
        assert_eq!(response.header("upload-id"), Some("up-123"));
        assert_eq!(response.header("Upload-ID"), Some("up-123"));
        assert_eq!(response.header("digest"), None);
    }

    #[tokio::test]
    async fn response_bytes_concatenates_chunks() {
        let body: ByteStream = Box::pin(stream::iter([
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]));
        let response = Response::new(200, Vec::new(), body);
        assert_eq!(&response.bytes().await.unwrap()[..], b"hello world");
    }

    #[tokio::test]
    async fn response_json_decodes() {
        let response = Response::of_bytes(200, Vec::new(), Bytes::from_static(b"{\"id\": \"x\"}"));
        let value: serde_json::Value = response.json().await.unwrap();
        assert_eq!(value["id"], "x");
    }
}
