//! Retrying endpoint invoker
//!
//! Issues one [`EndpointCall`] against the device and turns whatever happens
//! into exactly one [`Outcome`]. Devices that are busy actuating heaters or
//! switching WiFi modes drop requests now and then, so every failure below
//! the contract level is retried with a fixed per-class backoff before it is
//! reported.

mod call;
mod transport;

pub use call::{EndpointCall, Method, DEFAULT_ATTEMPTS, DEFAULT_TIMEOUT};
pub use transport::{HttpTransport, RawResponse, Transport, TransportError};

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::assertions::missing_fields;
use crate::common::{snippet, Error, Result};
use crate::ledger::{FailureKind, Outcome};

/// Versioned API prefix served by the firmware
pub const API_PREFIX: &str = "/api/v1";

/// Maximum characters of a raw response quoted in a failure message
pub const SNIPPET_LEN: usize = 100;

/// Backoff between attempts
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// One backoff unit; timeouts wait two units, everything else one
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_millis(unit_ms: u64) -> Self {
        Self {
            unit: Duration::from_millis(unit_ms),
        }
    }

    pub fn backoff(&self, failure: &FailureKind) -> Duration {
        match failure {
            FailureKind::Timeout => self.unit * 2,
            _ => self.unit,
        }
    }
}

/// Transient per-call retry bookkeeping
#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
    last_failure: Option<FailureKind>,
}

/// Turn a transport result into a decoded body or a failure class
pub fn classify(result: std::result::Result<RawResponse, TransportError>) -> std::result::Result<(u16, Value), FailureKind> {
    match result {
        Ok(raw) => classify_response(raw),
        Err(TransportError::Timeout) => Err(FailureKind::Timeout),
        Err(TransportError::Connection(_)) => Err(FailureKind::Connection),
        Err(TransportError::Other(detail)) => Err(FailureKind::Other { detail }),
    }
}

/// Only 200 and 201 with a JSON body count as success
pub fn classify_response(raw: RawResponse) -> std::result::Result<(u16, Value), FailureKind> {
    if raw.status != 200 && raw.status != 201 {
        return Err(FailureKind::BadStatus {
            code: raw.status,
            snippet: snippet(raw.body.trim(), SNIPPET_LEN),
        });
    }
    serde_json::from_str(&raw.body)
        .map(|value| (raw.status, value))
        .map_err(|_| FailureKind::MalformedBody {
            snippet: snippet(raw.body.trim(), SNIPPET_LEN),
        })
}

/// Build the API base URL from a device address
///
/// Accepts a bare host (`192.168.4.1`), `host:port`, or a full
/// `http://` URL.
pub fn api_base(address: &str) -> Result<String> {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::invalid_address(address, "address is empty"));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    let url = reqwest::Url::parse(&with_scheme)
        .map_err(|e| Error::invalid_address(address, &e.to_string()))?;
    if url.host_str().is_none() {
        return Err(Error::invalid_address(address, "no host"));
    }
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::invalid_address(address, "scheme must be http or https"));
    }
    Ok(format!("{}{}", with_scheme, API_PREFIX))
}

/// Executes endpoint calls with retries
#[derive(Clone)]
pub struct Invoker {
    transport: Arc<dyn Transport>,
    base_url: String,
    policy: RetryPolicy,
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("base_url", &self.base_url)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Invoker {
    pub fn new(address: &str, transport: Arc<dyn Transport>, policy: RetryPolicy) -> Result<Self> {
        Ok(Self {
            transport,
            base_url: api_base(address)?,
            policy,
        })
    }

    /// Invoker over HTTP
    pub fn http(address: &str, policy: RetryPolicy) -> Result<Self> {
        Self::new(address, Arc::new(HttpTransport::new()?), policy)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run the call to completion and return its single outcome
    ///
    /// Sends between 1 and `max_attempts` requests. Field validation runs
    /// once, on the first successful response, and is never retried.
    pub async fn invoke(&self, call: &EndpointCall) -> Outcome {
        let url = format!("{}{}", self.base_url, call.path);
        let body = call.wire_body();
        let max_attempts = call.max_attempts.max(1);
        let mut state = RetryState::default();

        loop {
            state.attempt += 1;
            tracing::debug!(
                name = %call.name,
                method = %call.method,
                url = %url,
                attempt = state.attempt,
                "Sending request"
            );

            let result = self
                .transport
                .send(call.method, &url, body.as_ref(), call.timeout)
                .await;

            match classify(result) {
                Ok((status, payload)) => {
                    return self.validate(call, status, payload, state.attempt);
                }
                Err(failure) => {
                    let delay = self.policy.backoff(&failure);
                    if state.attempt >= max_attempts {
                        state.last_failure = Some(failure);
                        break;
                    }
                    tracing::warn!(
                        name = %call.name,
                        attempt = state.attempt,
                        failure = %failure,
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, retrying"
                    );
                    state.last_failure = Some(failure);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let failure = state.last_failure.unwrap_or(FailureKind::Other {
            detail: "no attempt completed".to_string(),
        });
        tracing::warn!(
            name = %call.name,
            attempts = state.attempt,
            failure = %failure,
            "Retries exhausted"
        );
        exhausted(call, failure, state.attempt)
    }

    fn validate(&self, call: &EndpointCall, status: u16, payload: Value, attempt: u32) -> Outcome {
        let missing = missing_fields(&payload, &call.required_fields);
        if !missing.is_empty() {
            return Outcome::contract_fail(&call.name, format!("Missing fields: {}", missing.join(", ")))
                .with_payload(payload);
        }
        let message = if attempt > 1 {
            format!("HTTP {} (attempt {})", status, attempt)
        } else {
            format!("HTTP {}", status)
        };
        Outcome::pass(&call.name, message).with_payload(payload)
    }
}

fn exhausted(call: &EndpointCall, failure: FailureKind, attempts: u32) -> Outcome {
    let outcome = Outcome::failed(&call.name, failure);
    if attempts > 1 {
        let message = format!("{} (after {} attempts)", outcome.message(), attempts);
        outcome.with_message(message)
    } else {
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Status;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed sequence of responses and counts requests
    struct Scripted {
        replies: Mutex<VecDeque<std::result::Result<RawResponse, TransportError>>>,
        sent: Mutex<Vec<(Method, String, Option<Value>)>>,
    }

    impl Scripted {
        fn new(replies: Vec<std::result::Result<RawResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl Transport for Scripted {
        async fn send(
            &self,
            method: Method,
            url: &str,
            body: Option<&Value>,
            _timeout: Duration,
        ) -> std::result::Result<RawResponse, TransportError> {
            self.sent
                .lock()
                .unwrap()
                .push((method, url.to_string(), body.cloned()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Other("script exhausted".to_string())))
        }
    }

    fn ok(body: &str) -> std::result::Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    fn status(code: u16, body: &str) -> std::result::Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status: code,
            body: body.to_string(),
        })
    }

    fn invoker(transport: Arc<Scripted>) -> Invoker {
        Invoker::new("192.168.4.1", transport, RetryPolicy::default()).unwrap()
    }

    #[test]
    fn test_api_base_forms() {
        assert_eq!(api_base("192.168.4.1").unwrap(), "http://192.168.4.1/api/v1");
        assert_eq!(api_base("10.0.0.2:8080/").unwrap(), "http://10.0.0.2:8080/api/v1");
        assert_eq!(api_base("http://device.local").unwrap(), "http://device.local/api/v1");
        assert!(api_base("  ").is_err());
        assert!(api_base("ftp://device.local").is_err());
    }

    #[test]
    fn test_classify_response() {
        assert!(classify_response(RawResponse { status: 201, body: "{}".into() }).is_ok());
        assert!(matches!(
            classify_response(RawResponse { status: 204, body: String::new() }),
            Err(FailureKind::BadStatus { code: 204, .. })
        ));
        assert!(matches!(
            classify_response(RawResponse { status: 200, body: "<html>".into() }),
            Err(FailureKind::MalformedBody { .. })
        ));
    }

    #[test]
    fn test_bad_status_snippet_is_truncated() {
        let long = "x".repeat(500);
        match classify_response(RawResponse { status: 500, body: long }) {
            Err(FailureKind::BadStatus { snippet, .. }) => assert_eq!(snippet.len(), SNIPPET_LEN),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_sends_once() {
        let transport = Scripted::new(vec![ok(r#"{"id":"d1","type":"DUMMY"}"#)]);
        let call = EndpointCall::get("Get Device Info", "/device/info")
            .expect(&["id", "type"])
            .attempts(3);

        let outcome = invoker(transport.clone()).invoke(&call).await;

        assert_eq!(outcome.status(), Status::Pass);
        assert_eq!(outcome.message(), "HTTP 200");
        assert_eq!(transport.sent(), 1);
        assert_eq!(outcome.payload().unwrap()["id"], "d1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry_is_not_exhausted() {
        let transport = Scripted::new(vec![
            Err(TransportError::Timeout),
            ok(r#"{"success":true}"#),
        ]);
        let call = EndpointCall::post("Start Device", "/device/start")
            .expect(&["success"])
            .attempts(3);

        let started = tokio::time::Instant::now();
        let outcome = invoker(transport.clone()).invoke(&call).await;

        assert_eq!(outcome.status(), Status::Pass);
        assert!(!outcome.message().contains("after"));
        assert_eq!(transport.sent(), 2);
        // timeout class waits two units
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_bad_status_reports_final_code() {
        let transport = Scripted::new(vec![status(503, "busy"), status(500, "heater fault")]);
        let call = EndpointCall::get("Get Device Status", "/device/status").attempts(2);

        let outcome = invoker(transport.clone()).invoke(&call).await;

        assert_eq!(outcome.status(), Status::Fail);
        assert!(outcome.message().contains("500"), "{}", outcome.message());
        assert!(outcome.message().contains("heater fault"));
        assert!(outcome.message().contains("after 2 attempts"));
        assert_eq!(transport.sent(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_bounded_by_max() {
        let transport = Scripted::new(vec![
            Err(TransportError::Connection("reset".into())),
            Err(TransportError::Connection("reset".into())),
            Err(TransportError::Connection("reset".into())),
            ok("{}"),
        ]);
        let call = EndpointCall::get("Get WiFi Status", "/wifi/status").attempts(3);

        let outcome = invoker(transport.clone()).invoke(&call).await;

        assert_eq!(transport.sent(), 3);
        assert_eq!(outcome.failure(), Some(&FailureKind::Connection));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_fields_not_retried() {
        let transport = Scripted::new(vec![ok(r#"{"a":1}"#), ok(r#"{"a":1,"b":2,"c":3}"#)]);
        let call = EndpointCall::get("Fields", "/x").expect(&["a", "b", "c"]).attempts(2);

        let outcome = invoker(transport.clone()).invoke(&call).await;

        assert_eq!(outcome.status(), Status::Fail);
        assert_eq!(outcome.message(), "Missing fields: b, c");
        assert_eq!(transport.sent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_body_retried_then_reported() {
        let transport = Scripted::new(vec![ok("not json"), ok("still not json")]);
        let call = EndpointCall::get("Get Configuration", "/config");

        let outcome = invoker(transport.clone()).invoke(&call).await;

        assert!(matches!(outcome.failure(), Some(FailureKind::MalformedBody { .. })));
        assert!(outcome.message().contains("still not json"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_shape() {
        let transport = Scripted::new(vec![ok(r#"{"success":true}"#)]);
        let call = EndpointCall::put("Set Setpoint", "/device/setpoint")
            .body(json!({"zone": 0, "temperature": 37.0}));

        invoker(transport.clone()).invoke(&call).await;

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].0, Method::Put);
        assert_eq!(sent[0].1, "http://192.168.4.1/api/v1/device/setpoint");
        assert_eq!(sent[0].2, Some(json!({"zone": 0, "temperature": 37.0})));
    }
}
