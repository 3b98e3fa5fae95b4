//! Scenario sequencer
//!
//! Runs named checks in strict program order against one device and records
//! one outcome per check in the session ledger. A failing check never stops
//! the run; only an external interrupt does, and that is reported as its own
//! terminal condition rather than as a failure.

mod interrupt;
mod suite;

pub use interrupt::{Interrupt, InterruptTrigger};
pub use suite::{run_suite, Bracket, DEFAULT_RUNNING_TOKENS, STOPPED_TOKENS};

use futures_util::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

use crate::assertions::check_state;
use crate::common::config::{Config, SettleConfig, SettleMode};
use crate::invoker::{EndpointCall, Invoker, Method};
use crate::ledger::{Outcome, RunReport, Session, Status};

/// Device-family steps run inside the lifecycle bracket
///
/// A plain function: it receives the sequencer, appends outcomes through it
/// and returns nothing.
pub type FamilyHook = for<'a> fn(&'a mut Sequencer) -> BoxFuture<'a, ()>;

/// Result of exercising a control that a device family may not offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Support {
    Passed,
    Failed,
    Unsupported,
}

/// Drives one session
pub struct Sequencer {
    invoker: Invoker,
    session: Session,
    config: Config,
    interrupt: Interrupt,
}

impl Sequencer {
    pub fn new(invoker: Invoker, session: Session, config: Config, interrupt: Interrupt) -> Self {
        Self {
            invoker,
            session,
            config,
            interrupt,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settle_config(&self) -> &SettleConfig {
        &self.config.settle
    }

    /// Absolute tolerance for setpoint read-back
    pub fn tolerance(&self) -> f64 {
        self.config.tolerance.setpoint
    }

    pub fn control_attempts(&self) -> u32 {
        self.config.retry.control_attempts
    }

    /// Close the session and produce the final report
    pub fn finish(self) -> RunReport {
        self.session.finish()
    }

    // === Call construction ===

    fn call(&self, name: &str, method: Method, path: &str) -> EndpointCall {
        EndpointCall::new(name, method, path)
            .timeout(self.config.request_timeout())
            .attempts(self.config.retry.attempts)
    }

    pub fn get(&self, name: &str, path: &str) -> EndpointCall {
        self.call(name, Method::Get, path)
    }

    pub fn post(&self, name: &str, path: &str) -> EndpointCall {
        self.call(name, Method::Post, path)
    }

    pub fn put(&self, name: &str, path: &str) -> EndpointCall {
        self.call(name, Method::Put, path)
    }

    // === Narration ===

    pub fn section(&mut self, title: &str) {
        if !self.session.interrupted() {
            self.session.ledger_mut().section(title);
        }
    }

    pub fn note(&mut self, text: &str) {
        if !self.session.interrupted() {
            self.session.ledger_mut().note(text);
        }
    }

    // === Interrupt handling ===

    /// Whether the run has been cut short; latches on first observation
    pub fn interrupted(&mut self) -> bool {
        if self.session.interrupted() {
            return true;
        }
        if self.interrupt.is_set() {
            self.latch_interrupt();
            return true;
        }
        false
    }

    fn latch_interrupt(&mut self) {
        if !self.session.interrupted() {
            tracing::warn!("Run interrupted, remaining steps skipped");
            self.session.mark_interrupted();
        }
    }

    /// Run `fut` unless the interrupt fires first
    async fn guarded<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        if self.interrupted() {
            return None;
        }
        let interrupt = self.interrupt.clone();
        tokio::select! {
            biased;
            _ = interrupt.triggered() => {
                self.latch_interrupt();
                None
            }
            out = fut => Some(out),
        }
    }

    // === Steps ===

    /// Append an outcome produced locally
    pub fn record(&mut self, outcome: Outcome) {
        self.session.ledger_mut().append(outcome);
    }

    /// Execute a call without recording it
    pub async fn fetch(&mut self, call: EndpointCall) -> Option<Outcome> {
        let invoker = self.invoker.clone();
        self.guarded(async move { invoker.invoke(&call).await }).await
    }

    /// Execute a call and record its outcome
    pub async fn step(&mut self, call: EndpointCall) -> Option<Outcome> {
        let outcome = self.fetch(call).await?;
        self.record(outcome.clone());
        Some(outcome)
    }

    /// Execute a call and hand back its payload for further assertions
    ///
    /// The call itself is recorded only when it fails; on success the
    /// caller records whatever it concludes from the payload.
    pub async fn observe(&mut self, call: EndpointCall) -> Option<Value> {
        let outcome = self.fetch(call).await?;
        match outcome.passed_payload() {
            Some(payload) => Some(payload.clone()),
            None => {
                self.record(outcome);
                None
            }
        }
    }

    /// Execute a call and record one assertion over its payload
    pub async fn verify<F>(&mut self, call: EndpointCall, check: F) -> Option<Outcome>
    where
        F: FnOnce(&Value) -> Outcome + Send,
    {
        let payload = self.observe(call).await?;
        let outcome = check(&payload);
        self.record(outcome.clone());
        Some(outcome)
    }

    /// Execute a control the device may legitimately not offer
    ///
    /// Client-error statuses (400/404/405/501) are recorded as Skip; every
    /// other failure is recorded as a real Fail.
    pub async fn optional(&mut self, call: EndpointCall) -> Option<Support> {
        let outcome = self.fetch(call).await?;
        let support = match outcome.status() {
            Status::Pass => Support::Passed,
            _ if outcome.failure().is_some_and(|f| f.indicates_unsupported()) => {
                Support::Unsupported
            }
            _ => Support::Failed,
        };
        let outcome = if support == Support::Unsupported {
            Outcome::skip(outcome.name(), format!("Not supported: {}", outcome.message()))
        } else {
            outcome
        };
        self.record(outcome);
        Some(support)
    }

    /// Fixed wait for device-side convergence
    pub async fn settle(&mut self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Settling");
        self.guarded(tokio::time::sleep(delay)).await;
    }

    /// Wait for an asynchronous transition and check the reported state
    ///
    /// In fixed mode this sleeps `delay` and queries once. In poll mode it
    /// re-queries until the state matches or the poll timeout elapses.
    /// Either way exactly one outcome named `check_name` (or the failed
    /// query) is recorded.
    pub async fn await_state(
        &mut self,
        query_name: &str,
        check_name: &str,
        tokens: &[&str],
        delay: Duration,
    ) -> Option<Outcome> {
        let call = self
            .get(query_name, "/device/status")
            .attempts(self.control_attempts());

        match self.config.settle.mode {
            SettleMode::Fixed => {
                self.settle(delay).await;
                self.verify(call, |payload| check_state(payload, tokens).required(check_name))
                    .await
            }
            SettleMode::Poll => self.poll_state(call, check_name, tokens).await,
        }
    }

    async fn poll_state(&mut self, call: EndpointCall, check_name: &str, tokens: &[&str]) -> Option<Outcome> {
        let interval = Duration::from_millis(self.config.settle.poll_interval_ms.max(1));
        let deadline = tokio::time::Instant::now()
            + Duration::from_millis(self.config.settle.poll_timeout_ms);
        let single = call.clone().attempts(1);

        loop {
            let fetched = self.fetch(single.clone()).await?;
            let outcome = match fetched.passed_payload() {
                Some(payload) => check_state(payload, tokens).required(check_name),
                None => fetched,
            };
            if outcome.passed() || tokio::time::Instant::now() >= deadline {
                self.record(outcome.clone());
                return Some(outcome);
            }
            tracing::debug!(check = check_name, "State not converged, polling again");
            self.settle(interval).await;
            if self.interrupted() {
                return None;
            }
        }
    }
}
