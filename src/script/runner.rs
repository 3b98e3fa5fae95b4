//! Script runner
//!
//! Executes a [`Script`] through the same sequencer the built-in suite uses,
//! so scripted steps get the same retry, interrupt and reporting behavior.

use std::path::Path;
use std::time::Duration;

use crate::assertions::{check_range, check_state, check_tolerance};
use crate::common::{Error, Result};
use crate::invoker::Method;
use crate::sequencer::Sequencer;

use super::config::{Script, ScriptStep};

/// Load and validate a scenario script
pub fn load(path: &Path) -> Result<Script> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
    parse(&content)
}

/// Parse and validate script text
pub fn parse(content: &str) -> Result<Script> {
    let script: Script = serde_yaml::from_str(content)?;
    if script.steps.is_empty() {
        return Err(Error::Script(format!("'{}' has no steps", script.name)));
    }
    for (index, step) in script.steps.iter().enumerate() {
        step.validate(index).map_err(Error::Script)?;
    }
    Ok(script)
}

/// Run every step in order; stops early only when interrupted
pub async fn run_script(seq: &mut Sequencer, script: &Script) {
    tracing::info!(name = %script.name, steps = script.steps.len(), "Running script");
    seq.section(&script.name);
    if let Some(description) = &script.description {
        seq.note(description);
    }

    for step in &script.steps {
        if seq.interrupted() {
            break;
        }
        execute_step(seq, step).await;
    }
}

async fn execute_step(seq: &mut Sequencer, step: &ScriptStep) {
    match step {
        ScriptStep::Section { title } => seq.section(title),
        ScriptStep::Request {
            name,
            method,
            path,
            body,
            expect_fields,
            attempts,
            timeout,
            optional,
        } => {
            let mut call = match method {
                Method::Get => seq.get(name, path),
                Method::Post => seq.post(name, path),
                Method::Put => seq.put(name, path),
            }
            .expect(expect_fields.as_slice());
            if let Some(body) = body {
                call = call.body(body.clone());
            }
            if let Some(attempts) = attempts {
                call = call.attempts(*attempts);
            }
            if let Some(secs) = timeout {
                call = call.timeout(Duration::from_secs(*secs));
            }
            if *optional {
                seq.optional(call).await;
            } else {
                seq.step(call).await;
            }
        }
        ScriptStep::Settle { ms } => seq.settle(Duration::from_millis(*ms)).await,
        ScriptStep::ExpectState { name, path, tokens } => {
            let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();
            let call = seq.get(name, path);
            seq.verify(call, |payload| check_state(payload, &tokens).required(name))
                .await;
        }
        ScriptStep::ExpectNumber {
            name,
            path,
            fields,
            equals,
            tolerance,
        } => {
            let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
            let tolerance = tolerance.unwrap_or_else(|| seq.tolerance());
            let call = seq.get(name, path);
            seq.verify(call, |payload| {
                check_tolerance(payload, &fields, *equals, tolerance).required(name)
            })
            .await;
        }
        ScriptStep::ExpectRange {
            name,
            path,
            fields,
            min,
            max,
            optional,
        } => {
            let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
            let call = seq.get(name, path);
            seq.verify(call, |payload| {
                let verdict = check_range(payload, &fields, *min, *max);
                if *optional {
                    verdict.optional(name)
                } else {
                    verdict.required(name)
                }
            })
            .await;
        }
    }
}
