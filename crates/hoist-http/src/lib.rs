//! Resilient HTTP transport for the Hoist client.
//!
//! # Architecture
//!
//! - [`HttpClient`] - minimal object-safe client trait; production code
//!   uses [`ReqwestClient`], tests substitute mocks
//! - [`Transport`] - adds bearer auth, base-url joining, status-to-error
//!   surfacing, and automatic retry with exponential backoff on a fixed
//!   set of transient server error codes
//!
//! The transfer engines and service wrappers built on top assume the
//! transport retries transient failures and do not carry retry loops of
//! their own.

mod client;
mod error;
mod transport;

pub use client::{BoxStream, ByteStream, HttpClient, Method, Payload, Request, Response};
pub use error::HttpError;
pub use transport::{RetryPolicy, TRANSIENT_STATUS, Transport, retry_delay};

#[cfg(feature = "reqwest")]
pub use client::ReqwestClient;
