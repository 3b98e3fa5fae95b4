//! Endpoint call descriptions

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// HTTP methods used by the device contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
        }
    }
}

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of attempts
pub const DEFAULT_ATTEMPTS: u32 = 2;

/// One contract expectation against one endpoint
///
/// Built fresh at each call site; `path` is relative to the API base
/// (`/device/status`, not `/api/v1/device/status`).
#[derive(Debug, Clone)]
pub struct EndpointCall {
    /// Check name recorded in the outcome
    pub name: String,
    pub method: Method,
    pub path: String,
    /// Request body; POST and PUT send `{}` when absent
    pub body: Option<Value>,
    /// Top-level fields a successful response must carry
    pub required_fields: Vec<String>,
    pub timeout: Duration,
    /// Always at least 1
    pub max_attempts: u32,
}

impl EndpointCall {
    pub fn new(name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            body: None,
            required_fields: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_ATTEMPTS,
        }
    }

    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Get, path)
    }

    pub fn post(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Post, path)
    }

    pub fn put(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Put, path)
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn expect<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.required_fields = fields.iter().map(|f| f.as_ref().to_string()).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Body actually sent on the wire
    pub fn wire_body(&self) -> Option<Value> {
        match self.method {
            Method::Get => None,
            Method::Post | Method::Put => Some(
                self.body
                    .clone()
                    .unwrap_or_else(|| Value::Object(Default::default())),
            ),
        }
    }
}
