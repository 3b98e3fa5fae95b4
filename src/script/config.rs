//! Scenario script types
//!
//! Defines the data structures for deserializing YAML scenario scripts.

use serde::Deserialize;
use serde_json::Value;

use crate::families::DeviceFamily;
use crate::invoker::Method;

/// A complete hand-authored scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct Script {
    /// Name of the scenario
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    /// Device defaults; command-line flags take precedence
    #[serde(default)]
    pub device: ScriptDevice,
    /// Steps executed in order
    pub steps: Vec<ScriptStep>,
}

/// Device the script was written for
#[derive(Deserialize, Debug, Default)]
pub struct ScriptDevice {
    pub address: Option<String>,
    pub family: Option<DeviceFamily>,
}

/// A single step in the scenario
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Start a new report section
    Section { title: String },
    /// Issue one request and record its outcome
    Request {
        name: String,
        method: Method,
        path: String,
        body: Option<Value>,
        /// Top-level fields the response must carry
        #[serde(default)]
        expect_fields: Vec<String>,
        /// Attempts (default from configuration)
        attempts: Option<u32>,
        /// Per-request timeout in seconds
        timeout: Option<u64>,
        /// Unsupported responses are recorded as skipped
        #[serde(default)]
        optional: bool,
    },
    /// Wait before the next step
    Settle { ms: u64 },
    /// Query a state endpoint and match its `state` field
    ExpectState {
        name: String,
        #[serde(default = "default_status_path")]
        path: String,
        tokens: Vec<String>,
    },
    /// Query an endpoint and compare a numeric field
    ExpectNumber {
        name: String,
        #[serde(default = "default_status_path")]
        path: String,
        /// Dotted field path; the first one present is used
        fields: Vec<String>,
        equals: f64,
        /// Absolute tolerance (default from configuration)
        tolerance: Option<f64>,
    },
    /// Query an endpoint and require a numeric field inside [min, max]
    ExpectRange {
        name: String,
        #[serde(default = "default_status_path")]
        path: String,
        fields: Vec<String>,
        min: f64,
        max: f64,
        /// Absence is informational rather than a failure
        #[serde(default)]
        optional: bool,
    },
}

fn default_status_path() -> String {
    "/device/status".to_string()
}

impl ScriptStep {
    /// Reject steps that could never produce a meaningful outcome
    pub fn validate(&self, index: usize) -> Result<(), String> {
        let fail = |msg: &str| Err(format!("step {}: {}", index + 1, msg));
        match self {
            ScriptStep::Request { path, .. }
            | ScriptStep::ExpectState { path, .. }
            | ScriptStep::ExpectNumber { path, .. }
            | ScriptStep::ExpectRange { path, .. }
                if !path.starts_with('/') =>
            {
                fail("path must start with '/'")
            }
            ScriptStep::ExpectState { tokens, .. } if tokens.is_empty() => fail("tokens must not be empty"),
            ScriptStep::ExpectNumber { fields, .. } | ScriptStep::ExpectRange { fields, .. }
                if fields.is_empty() =>
            {
                fail("fields must not be empty")
            }
            ScriptStep::ExpectNumber {
                tolerance: Some(t), ..
            } if !(t.is_finite() && *t >= 0.0) => fail("tolerance must be a non-negative number"),
            _ => Ok(()),
        }
    }
}
