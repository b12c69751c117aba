//! Resilient HTTP request layer
//!
//! This module provides:
//! - `RequestError` — classified request failures (permanent vs transient)
//! - `HttpTransport` — injected request primitive (reqwest in production,
//!   deterministic fakes in tests)
//! - `ResilientClient` — one-shot request executor with bounded retry and
//!   capped exponential backoff

mod client;
mod error;
mod transport;

pub use client::{Method, RequestDescriptor, ResilientClient, Response, RetryPolicy};
pub use error::RequestError;
pub use transport::{HttpTransport, RawResponse, ReqwestTransport, TransportFailure};
