//! Device-family scenario sets
//!
//! Each family is the shared lifecycle bracket plus a hook of its own
//! checks. Families never touch the bracket logic; they only choose start
//! parameters and what runs in the middle.

pub mod dummy;
pub mod incubator;
pub mod pcr;

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::assertions::check_tolerance;
use crate::sequencer::{Bracket, FamilyHook, Sequencer};

/// Supported device families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
    /// Single-zone demo device
    Dummy,
    /// Temperature, humidity and CO2 controlled incubator
    Incubator,
    /// Thermal cycler
    Pcr,
}

impl DeviceFamily {
    pub const ALL: [DeviceFamily; 3] = [DeviceFamily::Dummy, DeviceFamily::Incubator, DeviceFamily::Pcr];

    /// The `type` reported by /device/info
    pub fn type_tag(&self) -> &'static str {
        match self {
            DeviceFamily::Dummy => "DUMMY",
            DeviceFamily::Incubator => "INCUBATOR",
            DeviceFamily::Pcr => "PCR",
        }
    }

    /// Body posted to /device/start by the lifecycle bracket
    pub fn start_params(&self) -> Value {
        match self {
            DeviceFamily::Dummy => dummy::start_params(),
            DeviceFamily::Incubator => incubator::start_params(),
            DeviceFamily::Pcr => pcr::start_params(),
        }
    }

    pub fn hook(&self) -> FamilyHook {
        match self {
            DeviceFamily::Dummy => dummy::hook,
            DeviceFamily::Incubator => incubator::hook,
            DeviceFamily::Pcr => pcr::hook,
        }
    }

    /// Lifecycle bracket for this family; `basic_only` drops the family hook
    pub fn bracket(&self, basic_only: bool) -> Bracket {
        Bracket {
            start_params: self.start_params(),
            hook: (!basic_only).then(|| self.hook()),
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceFamily::Dummy => write!(f, "dummy"),
            DeviceFamily::Incubator => write!(f, "incubator"),
            DeviceFamily::Pcr => write!(f, "pcr"),
        }
    }
}

impl FromStr for DeviceFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dummy" | "demo" => Ok(DeviceFamily::Dummy),
            "incubator" => Ok(DeviceFamily::Incubator),
            "pcr" | "thermocycler" => Ok(DeviceFamily::Pcr),
            other => Err(format!(
                "unknown device family '{}' (expected dummy, incubator or pcr)",
                other
            )),
        }
    }
}

/// PUT a setpoint and give the control loop time to take it
pub(crate) async fn put_setpoint(seq: &mut Sequencer, name: &str, body: Value) {
    let call = seq
        .put(name, "/device/setpoint")
        .body(body)
        .expect(&["success"])
        .attempts(seq.control_attempts());
    seq.step(call).await;
    let delay = seq.settle_config().after_setpoint();
    seq.settle(delay).await;
}

/// Query status and require a numeric field to read back within tolerance
pub(crate) async fn verify_read_back(
    seq: &mut Sequencer,
    query: &str,
    check: &str,
    candidates: &[&str],
    expected: f64,
) {
    let tolerance = seq.tolerance();
    let call = seq
        .get(query, "/device/status")
        .attempts(seq.control_attempts());
    seq.verify(call, |status| {
        check_tolerance(status, candidates, expected, tolerance).required(check)
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_parsing() {
        assert_eq!("PCR".parse::<DeviceFamily>().unwrap(), DeviceFamily::Pcr);
        assert_eq!("demo".parse::<DeviceFamily>().unwrap(), DeviceFamily::Dummy);
        assert!("oven".parse::<DeviceFamily>().is_err());
        for family in DeviceFamily::ALL {
            assert_eq!(family.to_string().parse::<DeviceFamily>().unwrap(), family);
        }
    }

    #[test]
    fn test_basic_only_drops_hook() {
        assert!(DeviceFamily::Incubator.bracket(true).hook.is_none());
        assert!(DeviceFamily::Incubator.bracket(false).hook.is_some());
        assert_eq!(DeviceFamily::Incubator.bracket(true).start_params["co2Level"], 5.0);
    }

    #[test]
    fn test_type_tags() {
        assert_eq!(DeviceFamily::Dummy.type_tag(), "DUMMY");
        assert_eq!(DeviceFamily::Pcr.type_tag(), "PCR");
    }
}
