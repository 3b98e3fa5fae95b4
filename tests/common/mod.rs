//! In-process mock device for integration tests
//!
//! Serves the v1 control contract for the dummy, incubator and PCR families
//! on an ephemeral port, with knobs for injecting failures.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use conformance::common::config::{Config, SettleConfig};
use conformance::invoker::{Invoker, RetryPolicy};
use conformance::ledger::Session;
use conformance::sequencer::{Interrupt, Sequencer};

/// A response override queued for one route
#[derive(Debug, Clone)]
pub enum Fault {
    /// Respond with this status and a short body
    Status(u16),
    /// Respond 200 with a body that is not JSON
    Garbage,
    /// Sleep before handling normally
    Delay(Duration),
}

#[derive(Debug)]
struct DeviceState {
    state: String,
    setpoint: f64,
    zones: [f64; 3],
    temperature_setpoint: f64,
    humidity_setpoint: f64,
    co2_setpoint: f64,
    program: Value,
    /// Status queries that still report the old state after a stop
    stop_lag_remaining: usize,
}

#[derive(Debug)]
struct Inner {
    family: String,
    device: DeviceState,
    faults: HashMap<String, VecDeque<Fault>>,
    hits: HashMap<String, usize>,
    pause_supported: bool,
    stop_lag: usize,
    /// Accept start but stay IDLE
    start_idle: bool,
}

/// Handle to a running mock device
#[derive(Clone)]
pub struct MockDevice {
    pub address: String,
    inner: Arc<Mutex<Inner>>,
}

impl MockDevice {
    /// Start a mock of the given family ("DUMMY", "INCUBATOR", "PCR")
    pub async fn start(family: &str) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            family: family.to_uppercase(),
            device: DeviceState {
                state: "IDLE".to_string(),
                setpoint: 25.0,
                zones: [25.0; 3],
                temperature_setpoint: 25.0,
                humidity_setpoint: 50.0,
                co2_setpoint: 0.04,
                program: json!({"type": "standard", "cycles": 30}),
                stop_lag_remaining: 0,
            },
            faults: HashMap::new(),
            hits: HashMap::new(),
            pause_supported: true,
            stop_lag: 0,
            start_idle: false,
        }));

        let app = Router::new().fallback(handle).with_state(inner.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Server failed");
        });

        Self {
            address: format!("127.0.0.1:{}", addr.port()),
            inner,
        }
    }

    /// Queue faults for a route such as "GET /device/info"
    pub fn inject(&self, route: &str, faults: &[Fault]) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .faults
            .entry(route.to_string())
            .or_default()
            .extend(faults.iter().cloned());
    }

    /// Requests received for a route
    pub fn hits(&self, route: &str) -> usize {
        self.inner.lock().unwrap().hits.get(route).copied().unwrap_or(0)
    }

    pub fn set_pause_supported(&self, supported: bool) {
        self.inner.lock().unwrap().pause_supported = supported;
    }

    /// Keep reporting the pre-stop state for `queries` status requests
    pub fn set_stop_lag(&self, queries: usize) {
        self.inner.lock().unwrap().stop_lag = queries;
    }

    /// Accept /device/start without leaving IDLE, as a device with nothing
    /// queued to run does
    pub fn set_start_idle(&self, idle: bool) {
        self.inner.lock().unwrap().start_idle = idle;
    }

    pub fn state(&self) -> String {
        self.inner.lock().unwrap().device.state.clone()
    }
}

/// Configuration with every delay collapsed for tests
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.settle = SettleConfig::immediate();
    config.retry.unit_ms = 1;
    config.retry.timeout_secs = 5;
    config
}

/// Sequencer aimed at `mock`
pub fn sequencer(mock: &MockDevice, family: &str, config: Config, interrupt: Interrupt) -> Sequencer {
    let invoker = Invoker::http(&mock.address, RetryPolicy::from_millis(config.retry.unit_ms))
        .expect("invoker");
    let session = Session::new(mock.address.clone(), family);
    Sequencer::new(invoker, session, config, interrupt)
}

fn ok(body: Value) -> (StatusCode, String) {
    (StatusCode::OK, body.to_string())
}

fn error(code: StatusCode, message: &str) -> (StatusCode, String) {
    (code, json!({"success": false, "error": message}).to_string())
}

fn success(message: &str) -> (StatusCode, String) {
    ok(json!({"success": true, "message": message}))
}

async fn handle(
    State(inner): State<Arc<Mutex<Inner>>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> (StatusCode, String) {
    let path = uri.path().trim_start_matches("/api/v1").to_string();
    let route = format!("{} {}", method, path);

    let fault = {
        let mut guard = inner.lock().unwrap();
        *guard.hits.entry(route.clone()).or_default() += 1;
        guard.faults.get_mut(&route).and_then(VecDeque::pop_front)
    };
    match fault {
        Some(Fault::Status(code)) => {
            let code = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return error(code, "injected fault");
        }
        Some(Fault::Garbage) => return (StatusCode::OK, "<html>rebooting</html>".to_string()),
        Some(Fault::Delay(delay)) => tokio::time::sleep(delay).await,
        None => {}
    }

    let params: Value = if body.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(_) => return error(StatusCode::BAD_REQUEST, "Invalid JSON"),
        }
    };

    let mut guard = inner.lock().unwrap();
    route_request(&mut guard, &route, &params)
}

fn route_request(inner: &mut Inner, route: &str, params: &Value) -> (StatusCode, String) {
    let family = inner.family.clone();
    let incubator = family == "INCUBATOR";
    let pcr = family == "PCR";

    match route {
        "GET /device/info" => ok(json!({
            "id": format!("{}-0001", family.to_lowercase()),
            "type": family,
            "name": format!("Mock {}", family),
            "firmwareVersion": "1.3.0",
            "mac": "24:6F:28:AA:BB:CC"
        })),
        "GET /device/status" => ok(status(inner)),
        "GET /wifi/status" => ok(json!({
            "mode": "AP",
            "connected": false,
            "apActive": true,
            "apSSID": format!("LAB-{}", family)
        })),
        "GET /config" => ok(json!({
            "device": {"name": format!("Mock {}", family), "type": family},
            "wifi": {"mode": "AP"},
            "network": {"port": 80}
        })),
        "POST /device/start" => {
            start(inner, params);
            success("Device started")
        }
        "POST /device/stop" => {
            inner.device.stop_lag_remaining = inner.stop_lag;
            inner.device.state = "IDLE".to_string();
            success("Device stopped")
        }
        "POST /device/pause" => {
            if inner.pause_supported && inner.device.state == "RUNNING" {
                inner.device.state = "PAUSED".to_string();
                success("Device paused")
            } else {
                error(StatusCode::BAD_REQUEST, "Failed to pause device")
            }
        }
        "POST /device/resume" => {
            if inner.device.state == "PAUSED" {
                inner.device.state = "RUNNING".to_string();
                success("Device resumed")
            } else {
                error(StatusCode::BAD_REQUEST, "Failed to resume device")
            }
        }
        "PUT /device/setpoint" => setpoint(inner, params),
        "GET /device/program/templates" => {
            let templates = if pcr { program_templates() } else { json!([]) };
            ok(json!({"templates": templates}))
        }
        "POST /device/program/validate" => ok(validate(params)),
        "GET /device/protocol/templates" if incubator => ok(json!({"templates": [
            {"name": "Mammalian Cell Culture", "type": 0, "stages": 2},
            {"name": "Bacterial Growth (E. coli)", "type": 1, "stages": 2}
        ]})),
        "POST /device/protocol/pause"
        | "POST /device/protocol/resume"
        | "POST /device/protocol/next-stage"
        | "POST /device/protocol/stop"
            if incubator =>
        {
            error(StatusCode::BAD_REQUEST, "No active protocol")
        }
        "GET /device/alarms" if incubator => ok(json!({"alarms": {
            "activeCount": 1,
            "hasCritical": false,
            "active": [{"type": "HUMIDITY_LOW", "severity": "WARNING"}]
        }})),
        "GET /device/alarms/history" if incubator => ok(json!({"history": []})),
        "POST /device/alarms/acknowledge" if incubator => {
            if params.get("index").and_then(Value::as_u64).is_some() {
                success("Alarm acknowledged")
            } else {
                error(StatusCode::BAD_REQUEST, "Missing or invalid 'index' field")
            }
        }
        "POST /device/alarms/acknowledge-all" if incubator => success("All alarms acknowledged"),
        r if r.contains("/device/alarms") || r.contains("/device/protocol") => error(
            StatusCode::BAD_REQUEST,
            "Only available for incubator devices",
        ),
        _ => error(StatusCode::NOT_FOUND, "Not found"),
    }
}

fn reported_state(inner: &mut Inner) -> String {
    let device = &mut inner.device;
    if device.stop_lag_remaining > 0 {
        device.stop_lag_remaining -= 1;
        "RUNNING".to_string()
    } else {
        device.state.clone()
    }
}

fn status(inner: &mut Inner) -> Value {
    let state = reported_state(inner);
    let running = state == "RUNNING" || state == "PAUSED";
    let device = &inner.device;
    match inner.family.as_str() {
        "INCUBATOR" => json!({
            "state": state,
            "uptime": 120,
            "temperature": device.temperature_setpoint - 0.05,
            "humidity": device.humidity_setpoint,
            "co2Level": device.co2_setpoint,
            "temperatureSetpoint": device.temperature_setpoint,
            "humiditySetpoint": device.humidity_setpoint,
            "co2Setpoint": device.co2_setpoint,
            "temperatureStable": true,
            "humidityStable": false,
            "co2Stable": true,
            "environmentStable": false,
            "timeStable": 0,
            "temperatureRamping": false
        }),
        "PCR" => {
            let mut program = device.program.clone();
            let (phase, cycle, total) = if running {
                ("DENATURE", 1, program["cycles"].clone())
            } else {
                ("IDLE", 0, json!(0))
            };
            // While cycling every zone tracks the current phase target
            let zones = if running {
                [program["denatureTemp"].as_f64().unwrap_or(95.0); 3]
            } else {
                device.zones
            };
            let mut doc = json!({
                "state": state,
                "uptime": 120,
                "temperature": zones,
                "setpoint": zones,
                "currentPhase": phase,
                "cycleNumber": cycle,
                "totalCycles": total,
            });
            if running {
                let anneal = program
                    .pointer("/touchdown/startAnnealTemp")
                    .and_then(Value::as_f64)
                    .map(|start| start - program["touchdown"]["stepSize"].as_f64().unwrap_or(1.0));
                if let Some(anneal) = anneal {
                    program["touchdown"]["currentAnnealTemp"] = json!(anneal);
                    doc["metrics"] = json!({"currentAnnealTemp": anneal});
                }
            }
            doc["program"] = program;
            doc
        }
        _ => json!({
            "state": state,
            "uptime": 120,
            "setpoint": device.setpoint,
            "temperature": device.setpoint - 0.02
        }),
    }
}

fn start(inner: &mut Inner, params: &Value) {
    let state = if inner.start_idle { "IDLE" } else { "RUNNING" };
    inner.device.state = state.to_string();
    match inner.family.as_str() {
        "INCUBATOR" => {
            let device = &mut inner.device;
            if let Some(t) = params.get("temperature").and_then(Value::as_f64) {
                device.temperature_setpoint = t;
            }
            if let Some(h) = params.get("humidity").and_then(Value::as_f64) {
                device.humidity_setpoint = h;
            }
            if let Some(c) = params.get("co2Level").and_then(Value::as_f64) {
                device.co2_setpoint = c;
            }
        }
        "PCR" => {
            let mut program = json!({
                "type": params.get("programType").cloned().unwrap_or(json!("standard")),
                "cycles": params.get("cycles").cloned().unwrap_or(json!(30)),
                "denatureTemp": params.get("denatureTemp").cloned().unwrap_or(json!(95.0)),
            });
            for key in ["hotStart", "touchdown", "gradient"] {
                if let Some(block) = params.get(key) {
                    program[key] = block.clone();
                }
            }
            if params.get("twoStepEnabled").and_then(Value::as_bool) == Some(true) {
                program["twoStepEnabled"] = json!(true);
                program["annealExtendTemp"] = params.get("annealExtendTemp").cloned().unwrap_or(json!(65.0));
            }
            inner.device.program = program;
        }
        _ => {}
    }
}

fn setpoint(inner: &mut Inner, params: &Value) -> (StatusCode, String) {
    let (Some(zone), Some(temperature)) = (
        params.get("zone").and_then(Value::as_u64),
        params.get("temperature").and_then(Value::as_f64),
    ) else {
        return error(StatusCode::BAD_REQUEST, "Missing zone or temperature");
    };
    match inner.family.as_str() {
        "INCUBATOR" if zone == 0 => inner.device.temperature_setpoint = temperature,
        "PCR" if (zone as usize) < 3 => inner.device.zones[zone as usize] = temperature,
        "DUMMY" if zone == 0 => inner.device.setpoint = temperature,
        _ => return error(StatusCode::BAD_REQUEST, "Invalid zone"),
    }
    success("Setpoint updated")
}

fn validate(params: &Value) -> Value {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let cycles = params.get("cycles").and_then(Value::as_u64).unwrap_or(0);
    if !(1..=100).contains(&cycles) {
        errors.push("Cycles must be between 1 and 100");
    }
    let anneal = params.get("annealTemp").and_then(Value::as_f64).unwrap_or(60.0);
    if !(45.0..=75.0).contains(&anneal) {
        warnings.push("Annealing temperature outside typical range (45-75°C)");
    }
    if params.get("annealTemp").and_then(Value::as_f64) == Some(55.0) {
        warnings.push("Low annealing temperature may reduce specificity");
    }
    json!({"valid": errors.is_empty(), "errors": errors, "warnings": warnings})
}

fn program_templates() -> Value {
    json!([
        {"name": "Standard PCR", "type": "standard", "cycles": 35},
        {"name": "Fast PCR", "type": "twostep", "twoStepEnabled": true},
        {"name": "Gradient Optimization", "type": "gradient",
         "gradient": {"enabled": true, "tempLow": 55.0, "tempHigh": 65.0, "positions": 12}},
        {"name": "High Specificity", "type": "touchdown",
         "touchdown": {"enabled": true, "startAnnealTemp": 72.0, "endAnnealTemp": 60.0}},
        {"name": "Colony PCR", "type": "standard",
         "hotStart": {"enabled": true, "activationTemp": 95.0, "activationTime": 900}}
    ])
}
