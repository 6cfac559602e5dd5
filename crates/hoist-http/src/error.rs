use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    /// The server answered with a non-2xx status. The message, if any, is
    /// whatever the response body's `message` field carried.
    #[error("HTTP {code}: {}", message.as_deref().unwrap_or("request failed"))]
    Status { code: u16, message: Option<String> },

    /// The request never produced a response (DNS, connect, TLS, or a
    /// broken body stream).
    #[error("transport error: {0}")]
    Transport(String),

    /// A transient failure survived every retry attempt.
    #[error("giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<HttpError>,
    },

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl HttpError {
    /// The HTTP status behind this error, looking through retry wrapping.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { code, .. } => Some(*code),
            HttpError::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }
}
