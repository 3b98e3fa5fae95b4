//! Device conformance engine
//!
//! Drives a networked device through its HTTP control contract and records
//! one outcome per check. The engine is headless; console and JSON output
//! live in [`report`] and subscribe to the outcome stream.

pub mod assertions;
pub mod cli;
pub mod commands;
pub mod common;
pub mod families;
pub mod invoker;
pub mod ledger;
pub mod report;
pub mod script;
pub mod sequencer;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use ledger::{Outcome, RunReport, Status};
