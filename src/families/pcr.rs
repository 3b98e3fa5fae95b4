//! Thermal cycler: zone setpoints, program templates, program validation and
//! one start/verify run per program mode

use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use crate::assertions::{
    self, check_flag, check_non_empty_list, check_object, check_range, check_state, check_text,
    check_tolerance, Verdict,
};
use crate::ledger::Outcome;
use crate::sequencer::Sequencer;

/// States that count as "cycling"
pub const CYCLING_TOKENS: &[&str] = &["RUNNING", "DENATURE", "ANNEAL", "EXTEND", "INIT"];

/// Cycle count above the firmware's accepted range
pub const REJECTED_CYCLES: u32 = 150;

const LID: (usize, &str, f64) = (0, "Lid", 95.0);
const BLOCK: (usize, &str, f64) = (1, "Block", 72.0);

const TEMPLATE_MODES: &[&str] = &["standard", "twostep", "gradient", "touchdown"];

/// Complete standard program accepted by the validator
pub fn standard_program() -> Value {
    json!({
        "cycles": 30,
        "denatureTemp": 95.0,
        "denatureTime": 30,
        "annealTemp": 55.0,
        "annealTime": 30,
        "extendTemp": 72.0,
        "extendTime": 60,
    })
}

pub fn start_params() -> Value {
    standard_program()
}

fn with(mut base: Value, extra: Value) -> Value {
    if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    base
}

pub fn hook(seq: &mut Sequencer) -> BoxFuture<'_, ()> {
    Box::pin(run(seq))
}

async fn run(seq: &mut Sequencer) {
    seq.note("Testing PCR-specific features");
    zones(seq).await;
    cycle_status(seq).await;
    templates(seq).await;
    validation(seq).await;
    for mode in MODES {
        if seq.interrupted() {
            return;
        }
        run_mode(seq, mode).await;
    }
}

/// Zone setpoints are only checked for acceptance; while a program is
/// cycling the firmware drives every zone to the current phase target
async fn zones(seq: &mut Sequencer) {
    for (zone, label, temperature) in [LID, BLOCK] {
        super::put_setpoint(
            seq,
            &format!("Set {} Temperature", label),
            json!({"zone": zone, "temperature": temperature}),
        )
        .await;
    }
}

async fn cycle_status(seq: &mut Sequencer) {
    let call = seq.get("Get PCR Status", "/device/status").expect(&["state"]);
    seq.verify(call, |status| cycle_counter(status).optional("PCR State Info"))
        .await;
}

/// Current and total cycle count
pub fn cycle_counter(status: &Value) -> Verdict {
    let state = assertions::string(status, "state").unwrap_or("UNKNOWN");
    let current = assertions::first_number(status, &["currentCycle", "cycleNumber"]);
    let total = assertions::number(status, "totalCycles");
    match (current, total) {
        (Some((_, current)), Some(total)) if current <= total || total == 0.0 => {
            Verdict::Satisfied(format!("State: {}, Cycle: {}/{}", state, current, total))
        }
        (Some((_, current)), Some(total)) => Verdict::Unsatisfied(format!(
            "Cycle {} exceeds total {}",
            current, total
        )),
        _ => Verdict::Absent(format!("State: {}, cycle counter not reported", state)),
    }
}

async fn templates(seq: &mut Sequencer) {
    let call = seq
        .get("Get Program Templates", "/device/program/templates")
        .expect(&["templates"]);
    let Some(payload) = seq.observe(call).await else {
        return;
    };

    seq.record(check_non_empty_list(&payload, "templates").required("Program Templates"));
    for mode in TEMPLATE_MODES {
        seq.record(template_mode(&payload, mode).optional(&format!("Template: {}", mode)));
    }
    seq.record(template_hot_start(&payload).optional("Template: hot start"));
}

fn template_list(payload: &Value) -> &[Value] {
    assertions::array(payload, "templates").map(Vec::as_slice).unwrap_or_default()
}

/// A template whose `type` is `mode`
pub fn template_mode(payload: &Value, mode: &str) -> Verdict {
    template_list(payload)
        .iter()
        .find(|t| check_text(t, "type", mode).is_satisfied())
        .map(|t| Verdict::Satisfied(assertions::string(t, "name").unwrap_or(mode).to_string()))
        .unwrap_or_else(|| Verdict::Absent(format!("no {} template", mode)))
}

fn template_hot_start(payload: &Value) -> Verdict {
    template_list(payload)
        .iter()
        .find(|t| check_object(t, "hotStart").is_satisfied())
        .map(|t| Verdict::Satisfied(assertions::string(t, "name").unwrap_or("hot start").to_string()))
        .unwrap_or_else(|| Verdict::Absent("no hot-start template".to_string()))
}

async fn validation(seq: &mut Sequencer) {
    let fields = ["valid", "errors", "warnings"];

    let call = seq
        .post("Validate Program", "/device/program/validate")
        .body(standard_program())
        .expect(&fields);
    seq.verify(call, accepted_program).await;

    let rejected = with(standard_program(), json!({"cycles": REJECTED_CYCLES}));
    let call = seq
        .post("Validate Invalid Program", "/device/program/validate")
        .body(rejected)
        .expect(&fields);
    seq.verify(call, rejected_program).await;
}

fn joined(payload: &Value, path: &str) -> String {
    assertions::array(payload, path)
        .map(|items| {
            items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join("; ")
        })
        .unwrap_or_default()
}

/// A complete, in-range program must validate; warnings are surfaced
pub fn accepted_program(payload: &Value) -> Outcome {
    const NAME: &str = "Program Accepted";
    match check_flag(payload, "valid", true) {
        Verdict::Satisfied(_) => {
            let warnings = joined(payload, "warnings");
            if warnings.is_empty() {
                Outcome::pass(NAME, "valid = true")
            } else {
                Outcome::pass(NAME, format!("valid = true (warnings: {})", warnings))
            }
        }
        other => {
            let errors = joined(payload, "errors");
            let outcome = other.required(NAME);
            if errors.is_empty() {
                outcome
            } else {
                let message = format!("{} (errors: {})", outcome.message(), errors);
                outcome.with_message(message)
            }
        }
    }
}

/// An out-of-range cycle count must be rejected with at least one error
pub fn rejected_program(payload: &Value) -> Outcome {
    const NAME: &str = "Program Rejected";
    if !check_flag(payload, "valid", false).is_satisfied() {
        return check_flag(payload, "valid", false).required(NAME);
    }
    match check_non_empty_list(payload, "errors") {
        Verdict::Satisfied(_) => Outcome::pass(NAME, format!("valid = false ({})", joined(payload, "errors"))),
        other => other.required(NAME),
    }
}

/// One program mode exercised start-to-verify
struct ModeRun {
    label: &'static str,
    params: fn() -> Value,
    checks: fn(&Value, f64) -> Vec<Outcome>,
}

const MODES: &[ModeRun] = &[
    ModeRun {
        label: "Standard PCR",
        params: || with(standard_program(), json!({"programType": "standard"})),
        checks: |status, _| vec![check_text(status, "program.type", "standard").optional("Standard Program Type")],
    },
    ModeRun {
        label: "Hot Start PCR",
        params: || {
            with(
                standard_program(),
                json!({
                    "programType": "standard",
                    "hotStart": {"enabled": true, "activationTemp": 95.0, "activationTime": 120}
                }),
            )
        },
        checks: |status, _| {
            vec![
                check_object(status, "program.hotStart").optional("Hot Start Block"),
                check_flag(status, "program.hotStart.enabled", true).optional("Hot Start Enabled"),
            ]
        },
    },
    ModeRun {
        label: "Touchdown PCR",
        params: || {
            with(
                standard_program(),
                json!({
                    "programType": "touchdown",
                    "touchdown": {
                        "enabled": true,
                        "startAnnealTemp": 68.0,
                        "endAnnealTemp": 58.0,
                        "stepSize": 1.0,
                        "touchdownCycles": 10
                    }
                }),
            )
        },
        checks: |status, _| {
            vec![
                check_object(status, "program.touchdown").optional("Touchdown Block"),
                check_range(
                    status,
                    &["program.touchdown.currentAnnealTemp", "metrics.currentAnnealTemp"],
                    68.0,
                    58.0,
                )
                .optional("Touchdown Anneal Temperature"),
            ]
        },
    },
    ModeRun {
        label: "Gradient PCR",
        params: || {
            with(
                standard_program(),
                json!({
                    "programType": "gradient",
                    "gradient": {"enabled": true, "tempLow": 55.0, "tempHigh": 65.0, "positions": 12}
                }),
            )
        },
        checks: |status, _| {
            vec![
                check_object(status, "program.gradient").optional("Gradient Block"),
                check_tolerance(status, &["program.gradient.positions"], 12.0, 0.0).optional("Gradient Positions"),
            ]
        },
    },
    ModeRun {
        label: "Two-Step PCR",
        params: || {
            with(
                standard_program(),
                json!({
                    "programType": "twostep",
                    "twoStepEnabled": true,
                    "annealExtendTemp": 65.0,
                    "annealExtendTime": 30
                }),
            )
        },
        checks: |status, tolerance| {
            vec![
                check_flag(status, "program.twoStepEnabled", true).optional("Two-Step Enabled"),
                check_tolerance(status, &["program.annealExtendTemp"], 65.0, tolerance)
                    .optional("Anneal/Extend Temperature"),
            ]
        },
    },
];

/// stop → settle → start mode → settle → verify cycling and mode fields
async fn run_mode(seq: &mut Sequencer, mode: &ModeRun) {
    seq.note(&format!("Program mode: {}", mode.label));

    let call = seq
        .post(&format!("Stop Before {}", mode.label), "/device/stop")
        .expect(&["success"])
        .attempts(seq.control_attempts());
    seq.step(call).await;
    let delay = seq.settle_config().after_stop();
    seq.settle(delay).await;

    let call = seq
        .post(&format!("Start {}", mode.label), "/device/start")
        .body((mode.params)())
        .expect(&["success"])
        .attempts(seq.control_attempts());
    seq.step(call).await;
    let delay = seq.settle_config().after_start();
    seq.settle(delay).await;

    let call = seq
        .get(&format!("Verify {}", mode.label), "/device/status")
        .attempts(seq.control_attempts());
    let Some(status) = seq.observe(call).await else {
        return;
    };
    seq.record(check_state(&status, CYCLING_TOKENS).required(&format!("{} Cycling", mode.label)));
    for outcome in (mode.checks)(&status, seq.tolerance()) {
        seq.record(outcome);
    }
}
