//! Shared base suite and lifecycle bracket
//!
//! Every device family runs the same four sections: device information,
//! WiFi, configuration and device control. Family-specific steps are
//! plugged into the control section through [`Bracket::hook`] so they run
//! between the start verification and the stop.

use serde_json::Value;

use super::{FamilyHook, Sequencer, Support};
use crate::assertions::{self, lookup};
use crate::ledger::Outcome;

/// State tokens accepted as evidence of a successful start
pub const DEFAULT_RUNNING_TOKENS: &[&str] = &["RUNNING", "IDLE"];

/// State tokens accepted as evidence of a successful stop
pub const STOPPED_TOKENS: &[&str] = &["IDLE", "STOPPED"];

const INFO_FIELDS: &[&str] = &["id", "type", "name", "firmwareVersion", "mac"];
const STATUS_FIELDS: &[&str] = &["state", "uptime"];
const WIFI_FIELDS: &[&str] = &["mode", "connected", "apActive"];
const CONFIG_FIELDS: &[&str] = &["device", "wifi", "network"];

/// Start → family steps → stop
pub struct Bracket {
    /// Body posted to /device/start
    pub start_params: Value,
    /// Family steps run while the device is started
    pub hook: Option<FamilyHook>,
}

impl Default for Bracket {
    fn default() -> Self {
        Self {
            start_params: Value::Object(Default::default()),
            hook: None,
        }
    }
}

/// Run the base suite against the sequencer's device
pub async fn run_suite(seq: &mut Sequencer, expected_type: &str, bracket: Bracket) {
    device_information(seq, expected_type).await;
    wifi(seq).await;
    configuration(seq).await;
    device_control(seq, bracket).await;
}

async fn device_information(seq: &mut Sequencer, expected_type: &str) {
    if seq.interrupted() {
        return;
    }
    seq.section("Device Information Tests");

    let call = seq.get("Get Device Info", "/device/info").expect(INFO_FIELDS);
    if let Some(info) = seq.step(call).await.and_then(|o| o.passed_payload().cloned()) {
        let (outcome, matched) = type_match(&info, expected_type);
        if !matched {
            seq.note(&format!(
                "Expected {}, but device is {}; device-specific tests may not apply",
                expected_type.to_uppercase(),
                assertions::string(&info, "type").unwrap_or("UNKNOWN").to_uppercase()
            ));
        }
        seq.record(outcome);

        if let Some(requirement) = seq.config().device.min_firmware.clone() {
            seq.record(firmware_check(&info, &requirement));
        }
    }

    let call = seq.get("Get Device Status", "/device/status").expect(STATUS_FIELDS);
    if let Some(status) = seq.step(call).await.and_then(|o| o.passed_payload().cloned()) {
        seq.record(Outcome::pass(
            "Device State",
            format!(
                "State: {}, Uptime: {}s",
                assertions::string(&status, "state").unwrap_or("UNKNOWN"),
                lookup(&status, "uptime").map(Value::to_string).unwrap_or_else(|| "0".into())
            ),
        ));
    }
}

/// Informational comparison of the reported device type
///
/// Both branches pass; the flag tells the caller whether the types agreed.
pub fn type_match(info: &Value, expected_type: &str) -> (Outcome, bool) {
    let reported = assertions::string(info, "type").unwrap_or_default().to_uppercase();
    let expected = expected_type.to_uppercase();
    if reported == expected {
        let outcome = Outcome::pass("Device Type Match", format!("Type: {} (as expected)", reported));
        (outcome, true)
    } else {
        let outcome = Outcome::pass(
            "Device Type",
            format!("Detected: {} (expected: {})", reported, expected),
        );
        (outcome, false)
    }
}

/// Reported firmware version against a semver requirement
pub fn firmware_check(info: &Value, requirement: &str) -> Outcome {
    const NAME: &str = "Firmware Version";
    let Some(reported) = assertions::string(info, "firmwareVersion") else {
        return Outcome::contract_fail(NAME, "firmwareVersion not found");
    };
    let req = match semver::VersionReq::parse(requirement) {
        Ok(req) => req,
        Err(e) => return Outcome::contract_fail(NAME, format!("Bad requirement '{}': {}", requirement, e)),
    };
    match semver::Version::parse(reported.trim_start_matches('v')) {
        Ok(version) if req.matches(&version) => {
            Outcome::pass(NAME, format!("{} satisfies {}", version, req))
        }
        Ok(version) => Outcome::contract_fail(NAME, format!("{} does not satisfy {}", version, req)),
        Err(_) => Outcome::contract_fail(NAME, format!("'{}' is not a semantic version", reported)),
    }
}

async fn wifi(seq: &mut Sequencer) {
    if seq.interrupted() {
        return;
    }
    seq.section("WiFi Configuration Tests");

    let call = seq.get("Get WiFi Status", "/wifi/status").expect(WIFI_FIELDS);
    if let Some(status) = seq.step(call).await.and_then(|o| o.passed_payload().cloned()) {
        seq.record(Outcome::pass("WiFi Connection Status", wifi_summary(&status)));
    }
}

fn wifi_summary(status: &Value) -> String {
    let text = |path: &str| assertions::string(status, path).unwrap_or("N/A");
    let mut parts = Vec::new();
    if assertions::boolean(status, "apActive").unwrap_or(false) {
        parts.push(format!("AP: {}", text("apSSID")));
    }
    if assertions::boolean(status, "connected").unwrap_or(false) {
        parts.push(format!("STA: {} ({})", text("ssid"), text("ip")));
    }
    if parts.is_empty() {
        "Not connected".to_string()
    } else {
        parts.join(" | ")
    }
}

async fn configuration(seq: &mut Sequencer) {
    if seq.interrupted() {
        return;
    }
    seq.section("Configuration Tests");
    let delay = std::time::Duration::from_millis(seq.settle_config().before_config_ms);
    seq.settle(delay).await;

    let call = seq
        .get("Get Configuration", "/config")
        .expect(CONFIG_FIELDS)
        .attempts(seq.control_attempts());
    if let Some(config) = seq.step(call).await.and_then(|o| o.passed_payload().cloned()) {
        let name = assertions::string(&config, "device.name").unwrap_or("N/A");
        seq.record(Outcome::pass("Config Structure", format!("Device: {}", name)));
    }
}

async fn device_control(seq: &mut Sequencer, bracket: Bracket) {
    if seq.interrupted() {
        return;
    }
    seq.section("Device Control Tests");
    let delay = std::time::Duration::from_millis(seq.settle_config().before_control_ms);
    seq.settle(delay).await;

    let call = seq
        .post("Start Device", "/device/start")
        .body(bracket.start_params)
        .expect(&["success"])
        .attempts(seq.control_attempts());
    seq.step(call).await;

    let delay = seq.settle_config().after_start();
    seq.await_state("Verify Running State", "Device Started", DEFAULT_RUNNING_TOKENS, delay)
        .await;

    if let Some(hook) = bracket.hook {
        if !seq.interrupted() {
            hook(seq).await;
        }
    }

    pause_and_resume(seq).await;

    let call = seq
        .post("Stop Device", "/device/stop")
        .expect(&["success"])
        .attempts(seq.control_attempts());
    seq.step(call).await;

    let delay = seq.settle_config().after_stop();
    seq.await_state("Verify Stopped State", "Device Stopped", STOPPED_TOKENS, delay)
        .await;
}

/// Pause is optional per family; resume is only meaningful after a pause
async fn pause_and_resume(seq: &mut Sequencer) {
    let call = seq.post("Pause Device", "/device/pause");
    if seq.optional(call).await != Some(Support::Passed) {
        return;
    }
    let delay = seq.settle_config().after_pause();
    seq.settle(delay).await;

    let call = seq.post("Resume Device", "/device/resume");
    seq.step(call).await;
    seq.settle(delay).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Status;
    use serde_json::json;

    #[test]
    fn test_type_match_is_case_insensitive() {
        let (outcome, matched) = type_match(&json!({"type": "pcr"}), "PCR");
        assert!(matched);
        assert_eq!(outcome.name(), "Device Type Match");
        assert_eq!(outcome.message(), "Type: PCR (as expected)");
    }

    #[test]
    fn test_type_mismatch_is_informational() {
        let (outcome, matched) = type_match(&json!({"type": "INCUBATOR"}), "dummy");
        assert!(!matched);
        assert_eq!(outcome.name(), "Device Type");
        assert_eq!(outcome.status(), Status::Pass);
        assert!(outcome.message().contains("expected: DUMMY"));
    }

    #[test]
    fn test_firmware_requirement() {
        let info = json!({"firmwareVersion": "1.4.2"});
        assert!(firmware_check(&info, ">=1.2.0").passed());
        assert_eq!(firmware_check(&info, ">=2.0.0").status(), Status::Fail);
        assert_eq!(
            firmware_check(&json!({"firmwareVersion": "dev-build"}), ">=1.0.0").status(),
            Status::Fail
        );
        assert!(firmware_check(&json!({"firmwareVersion": "v1.2.0"}), "^1.2").passed());
    }

    #[test]
    fn test_wifi_summary() {
        let status = json!({
            "mode": "AP_STA",
            "connected": true,
            "apActive": true,
            "apSSID": "LAB-PCR-01",
            "ssid": "lab-net",
            "ip": "10.0.0.12"
        });
        assert_eq!(wifi_summary(&status), "AP: LAB-PCR-01 | STA: lab-net (10.0.0.12)");
        assert_eq!(
            wifi_summary(&json!({"mode": "OFF", "connected": false, "apActive": false})),
            "Not connected"
        );
    }
}
