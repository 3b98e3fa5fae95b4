//! Dummy device: one zone, one setpoint

use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use crate::sequencer::Sequencer;

/// Target pushed to zone 0
pub const SETPOINT: f64 = 37.0;

pub fn start_params() -> Value {
    json!({})
}

pub fn hook(seq: &mut Sequencer) -> BoxFuture<'_, ()> {
    Box::pin(run(seq))
}

async fn run(seq: &mut Sequencer) {
    super::put_setpoint(
        seq,
        "Set Temperature Setpoint",
        json!({"zone": 0, "temperature": SETPOINT}),
    )
    .await;
    super::verify_read_back(seq, "Verify Setpoint Applied", "Read Setpoint", &["setpoint"], SETPOINT).await;
}
