//! Hand-authored scenario scripts
//!
//! YAML files describing an ordered list of requests, settle delays and
//! expectations, executed against one device by the scenario sequencer.

mod config;
mod runner;

pub use config::*;
pub use runner::{load, parse, run_script};
