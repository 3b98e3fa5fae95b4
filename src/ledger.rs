//! Outcome ledger
//!
//! One [`Outcome`] is appended per executed check. The ledger never mutates
//! or removes an outcome once appended; observers registered with
//! [`Ledger::subscribe`] see every outcome in append order.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Verdict of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
    Skip,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pass => write!(f, "PASS"),
            Status::Fail => write!(f, "FAIL"),
            Status::Skip => write!(f, "SKIP"),
        }
    }
}

/// Why a check did not pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// No response within the request timeout
    Timeout,
    /// Transport-level refusal or reset
    Connection,
    /// Response status outside {200, 201}
    BadStatus { code: u16, snippet: String },
    /// Accepted status but the body is not a JSON document
    MalformedBody { snippet: String },
    /// Any other request failure
    Other { detail: String },
    /// The device answered but violated the contract
    Contract { detail: String },
}

impl FailureKind {
    /// Whether the device answered in a way that means "this control is not
    /// available here" rather than "this control broke"
    pub fn indicates_unsupported(&self) -> bool {
        matches!(self, FailureKind::BadStatus { code, .. } if matches!(code, 400 | 404 | 405 | 501))
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "Request timeout (check device connectivity)"),
            FailureKind::Connection => write!(f, "Connection error (device may have reset)"),
            FailureKind::BadStatus { code, snippet } if snippet.is_empty() => {
                write!(f, "HTTP {}", code)
            }
            FailureKind::BadStatus { code, snippet } => write!(f, "HTTP {}: {}", code, snippet),
            FailureKind::MalformedBody { snippet } if snippet.is_empty() => {
                write!(f, "Invalid JSON response")
            }
            FailureKind::MalformedBody { snippet } => {
                write!(f, "Invalid JSON response: {}", snippet)
            }
            FailureKind::Other { detail } => write!(f, "Error: {}", detail),
            FailureKind::Contract { detail } => write!(f, "{}", detail),
        }
    }
}

/// Result of one executed check
///
/// Built with the constructors below and then handed to the ledger; there
/// is no way to change an outcome after it has been appended.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    name: String,
    status: Status,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<FailureKind>,
}

impl Outcome {
    fn new(name: impl Into<String>, status: Status, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            payload: None,
            failure: None,
        }
    }

    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Status::Pass, message)
    }

    pub fn skip(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Status::Skip, message)
    }

    /// A failure whose message is the classification itself
    pub fn failed(name: impl Into<String>, failure: FailureKind) -> Self {
        let message = failure.to_string();
        Self::new(name, Status::Fail, message).with_failure(failure)
    }

    /// A contract failure over an already-fetched payload
    pub fn contract_fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::failed(name, FailureKind::Contract { detail: detail.into() })
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_failure(mut self, failure: FailureKind) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn failure(&self) -> Option<&FailureKind> {
        self.failure.as_ref()
    }

    pub fn passed(&self) -> bool {
        self.status == Status::Pass
    }

    /// Payload of a passing outcome
    pub fn passed_payload(&self) -> Option<&Value> {
        if self.passed() {
            self.payload.as_ref()
        } else {
            None
        }
    }
}

/// Observer of the outcome stream
///
/// Section and note events carry narration only; they are not outcomes and
/// are never counted.
pub trait OutcomeSink: Send {
    fn section(&mut self, _title: &str) {}

    fn note(&mut self, _text: &str) {}

    fn outcome(&mut self, outcome: &Outcome);

    fn finish(&mut self, _report: &RunReport) {}
}

/// Pass/fail/skip totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Summary {
    /// Passed checks as a percentage of all checks; 0 for an empty run
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64 * 100.0
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Append-only outcome record
#[derive(Default)]
pub struct Ledger {
    outcomes: Vec<Outcome>,
    sinks: Vec<Box<dyn OutcomeSink>>,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("outcomes", &self.outcomes)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for everything appended from now on
    pub fn subscribe(&mut self, sink: Box<dyn OutcomeSink>) {
        self.sinks.push(sink);
    }

    pub fn append(&mut self, outcome: Outcome) {
        tracing::info!(name = outcome.name(), status = %outcome.status(), "{}", outcome.message());
        for sink in &mut self.sinks {
            sink.outcome(&outcome);
        }
        self.outcomes.push(outcome);
    }

    pub fn section(&mut self, title: &str) {
        for sink in &mut self.sinks {
            sink.section(title);
        }
    }

    pub fn note(&mut self, text: &str) {
        for sink in &mut self.sinks {
            sink.note(text);
        }
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            total: self.outcomes.len(),
            ..Summary::default()
        };
        for outcome in &self.outcomes {
            match outcome.status() {
                Status::Pass => summary.passed += 1,
                Status::Fail => summary.failed += 1,
                Status::Skip => summary.skipped += 1,
            }
        }
        summary
    }

    fn finish(&mut self, report: &RunReport) {
        for sink in &mut self.sinks {
            sink.finish(report);
        }
    }
}

/// One full run against one device
#[derive(Debug)]
pub struct Session {
    device_address: String,
    family: String,
    ledger: Ledger,
    interrupted: bool,
}

impl Session {
    pub fn new(device_address: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            device_address: device_address.into(),
            family: family.into(),
            ledger: Ledger::new(),
            interrupted: false,
        }
    }

    pub fn device_address(&self) -> &str {
        &self.device_address
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    pub fn mark_interrupted(&mut self) {
        self.interrupted = true;
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    /// Close the session, notify observers and hand back the report
    pub fn finish(mut self) -> RunReport {
        let report = RunReport {
            device_address: self.device_address.clone(),
            family: self.family.clone(),
            summary: self.ledger.summary(),
            interrupted: self.interrupted,
            outcomes: self.ledger.outcomes.clone(),
        };
        self.ledger.finish(&report);
        report
    }
}

/// Final, serializable record of a run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub device_address: String,
    pub family: String,
    pub summary: Summary,
    pub interrupted: bool,
    pub outcomes: Vec<Outcome>,
}

impl RunReport {
    /// A run succeeds when it completed and nothing failed
    pub fn succeeded(&self) -> bool {
        !self.interrupted && self.summary.all_passed()
    }
}
