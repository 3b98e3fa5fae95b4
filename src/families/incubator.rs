//! Incubator: temperature, humidity and CO2 under closed-loop control, plus
//! the alarm and protocol subsystems

use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use crate::assertions::{self, check_list, check_non_empty_list, check_object, check_tolerance, Verdict};
use crate::ledger::Outcome;
use crate::sequencer::Sequencer;

pub const TEMPERATURE: f64 = 37.0;
pub const HUMIDITY: f64 = 85.0;
pub const CO2: f64 = 5.0;

/// Temperature the setpoint change step moves to
pub const CHANGED_TEMPERATURE: f64 = 42.0;

/// Controlled variables and the status keys that describe them
const VARIABLES: &[(&str, &str)] = &[
    ("temperature", "temperatureStable"),
    ("humidity", "humidityStable"),
    ("co2", "co2Stable"),
];

const SEVERITIES: &[&str] = &["critical", "warning"];

pub fn start_params() -> Value {
    json!({
        "temperature": TEMPERATURE,
        "humidity": HUMIDITY,
        "co2Level": CO2,
    })
}

pub fn hook(seq: &mut Sequencer) -> BoxFuture<'_, ()> {
    Box::pin(run(seq))
}

async fn run(seq: &mut Sequencer) {
    seq.note("Testing incubator-specific features");
    environment(seq).await;
    setpoint_change(seq).await;
    alarms(seq).await;
    protocols(seq).await;
}

async fn environment(seq: &mut Sequencer) {
    super::put_setpoint(
        seq,
        "Set Temperature Setpoint",
        json!({"zone": 0, "temperature": TEMPERATURE}),
    )
    .await;

    let call = seq.get("Get Incubator Status", "/device/status");
    let Some(status) = seq.observe(call).await else {
        return;
    };
    let tolerance = seq.tolerance();

    seq.record(Outcome::pass("Environmental Sensors", sensor_summary(&status)));
    seq.record(check_tolerance(&status, &["humiditySetpoint"], HUMIDITY, tolerance).optional("Humidity Setpoint"));
    seq.record(check_tolerance(&status, &["co2Setpoint"], CO2, tolerance).optional("CO2 Setpoint"));
    seq.record(stability_check(&status));
    seq.record(ramping(&status).optional("Ramping Info"));
}

async fn setpoint_change(seq: &mut Sequencer) {
    super::put_setpoint(
        seq,
        "Change Temperature",
        json!({"zone": 0, "temperature": CHANGED_TEMPERATURE}),
    )
    .await;
    super::verify_read_back(
        seq,
        "Verify New Setpoint",
        "Setpoint Updated",
        &["temperatureSetpoint", "setpoint"],
        CHANGED_TEMPERATURE,
    )
    .await;
}

async fn alarms(seq: &mut Sequencer) {
    seq.note("Alarm subsystem");

    let call = seq.get("Get Alarms", "/device/alarms").expect(&["alarms"]);
    seq.verify(call, alarm_check).await;

    let call = seq
        .post("Acknowledge Alarm", "/device/alarms/acknowledge")
        .body(json!({"index": 0}));
    seq.optional(call).await;

    let call = seq.post("Acknowledge All Alarms", "/device/alarms/acknowledge-all");
    seq.optional(call).await;

    let call = seq
        .get("Get Alarm History", "/device/alarms/history")
        .expect(&["history"]);
    seq.verify(call, |payload| check_list(payload, "history").required("Alarm History"))
        .await;
}

async fn protocols(seq: &mut Sequencer) {
    seq.note("Protocol subsystem");

    let call = seq
        .get("Get Protocol Templates", "/device/protocol/templates")
        .expect(&["templates"]);
    seq.verify(call, |payload| {
        check_non_empty_list(payload, "templates").required("Protocol Templates")
    })
    .await;

    // Controls legitimately fail when no protocol is active
    for (name, path) in [
        ("Pause Protocol", "/device/protocol/pause"),
        ("Resume Protocol", "/device/protocol/resume"),
        ("Next Protocol Stage", "/device/protocol/next-stage"),
        ("Stop Protocol", "/device/protocol/stop"),
    ] {
        let call = seq.post(name, path).expect(&["success"]);
        seq.optional(call).await;
    }
}

fn sensor_summary(status: &Value) -> String {
    let mut parts = Vec::new();
    if let Some(t) = assertions::number(status, "temperature") {
        parts.push(format!("Temp: {}°C", t));
    }
    if let Some(h) = assertions::number(status, "humidity") {
        parts.push(format!("Humidity: {}%", h));
    }
    if let Some(c) = assertions::number(status, "co2Level") {
        parts.push(format!("CO2: {}%", c));
    }
    if parts.is_empty() {
        "Basic temperature control available".to_string()
    } else {
        parts.join(", ")
    }
}

/// `environmentStable` must equal the conjunction of the per-variable flags
pub fn stability_check(status: &Value) -> Outcome {
    const NAME: &str = "Environment Stability";
    let Some(overall) = assertions::boolean(status, "environmentStable") else {
        return Outcome::contract_fail(NAME, "environmentStable not found");
    };

    let flags: Vec<(&str, bool)> = VARIABLES
        .iter()
        .filter_map(|(var, key)| assertions::boolean(status, key).map(|b| (*var, b)))
        .collect();
    if flags.is_empty() {
        return Outcome::pass(NAME, format!("environmentStable = {} (no per-variable flags)", overall));
    }

    let unstable: Vec<&str> = flags.iter().filter(|(_, b)| !b).map(|(var, _)| *var).collect();
    let all_stable = unstable.is_empty();
    if overall != all_stable {
        return Outcome::contract_fail(
            NAME,
            format!(
                "environmentStable = {} but per-variable flags say {}",
                overall,
                if all_stable { "all stable".to_string() } else { format!("{} unstable", unstable.join(", ")) }
            ),
        );
    }

    if all_stable {
        let held = assertions::number(status, "timeStable").unwrap_or(0.0);
        Outcome::pass(NAME, format!("Environment stable for {}s", held))
    } else {
        Outcome::pass(NAME, format!("Converging: {} not yet stable", unstable.join(", ")))
    }
}

/// Ramping is reported either as a `ramping` object or as `<var>Ramping` flags
fn ramping(status: &Value) -> Verdict {
    let block = check_object(status, "ramping");
    if !matches!(block, Verdict::Absent(_)) {
        return block;
    }
    let ramping: Vec<String> = VARIABLES
        .iter()
        .filter_map(|(var, _)| {
            let key = format!("{}Ramping", var);
            assertions::boolean(status, &key).map(|b| (key, b))
        })
        .map(|(key, b)| format!("{} = {}", key, b))
        .collect();
    if ramping.is_empty() {
        Verdict::Absent("ramping not found".to_string())
    } else {
        Verdict::Satisfied(ramping.join(", "))
    }
}

/// Alarm summary: count, critical flag, and severities of active alarms
pub fn alarm_check(payload: &Value) -> Outcome {
    const NAME: &str = "Alarm Summary";
    let Some(count) = assertions::number(payload, "alarms.activeCount") else {
        return Outcome::contract_fail(NAME, "alarms.activeCount not found");
    };
    let Some(has_critical) = assertions::boolean(payload, "alarms.hasCritical") else {
        return Outcome::contract_fail(NAME, "alarms.hasCritical not found");
    };

    if let Some(active) = assertions::array(payload, "alarms.active") {
        let mut any_critical = false;
        for (idx, alarm) in active.iter().enumerate() {
            let severity = assertions::string(alarm, "severity").unwrap_or_default().to_lowercase();
            if !SEVERITIES.contains(&severity.as_str()) {
                return Outcome::contract_fail(
                    NAME,
                    format!("Alarm {} has severity '{}' (expected critical or warning)", idx, severity),
                );
            }
            any_critical |= severity == "critical";
        }
        if any_critical != has_critical {
            return Outcome::contract_fail(
                NAME,
                format!("hasCritical = {} disagrees with active alarms", has_critical),
            );
        }
    }

    Outcome::pass(
        NAME,
        format!(
            "{} active, critical: {}",
            count,
            if has_critical { "yes" } else { "no" }
        ),
    )
}
