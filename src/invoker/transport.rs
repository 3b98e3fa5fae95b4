//! HTTP transport
//!
//! The invoker talks to the device through the [`Transport`] trait so retry
//! and classification logic can be exercised without a network.

use async_trait::async_trait;
use serde_json::Value;
use std::error::Error as _;
use std::io;
use std::time::Duration;

use super::call::Method;
use crate::common::{Error, Result};

/// Status and raw body of a response
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Request failures below the HTTP layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    Connection(String),
    Other(String),
}

/// Sends one request and returns whatever came back
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> std::result::Result<RawResponse, TransportError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("device-conformance/", env!("CARGO_PKG_VERSION")))
            // Fresh connection per request; the device drops idle sockets
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }
}

fn classify_reqwest(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() || peer_dropped(e) {
        TransportError::Connection(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

/// Whether the error chain bottoms out in the device dropping an established
/// connection (reset, abort, or close mid-exchange)
fn peer_dropped(e: &reqwest::Error) -> bool {
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<io::Error>() {
            if matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        // hyper closes an exchange the peer abandoned without an io source
        if err.to_string().contains("connection closed before message completed") {
            return true;
        }
        source = err.source();
    }
    false
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> std::result::Result<RawResponse, TransportError> {
        let request = match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
        };
        let request = match body {
            Some(body) => request.json(body),
            None => request,
        };

        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest(&e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify_reqwest(&e))?;

        Ok(RawResponse { status, body })
    }
}
