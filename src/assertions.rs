//! Contract assertion helpers
//!
//! Pure predicates over decoded response bodies. None of these panic or
//! return errors: an absent or wrong-typed field simply does not satisfy the
//! predicate. Callers decide whether an absent field is a failure or an
//! informational note via [`Verdict::required`] / [`Verdict::optional`].

use serde_json::Value;

use crate::ledger::Outcome;

/// Result of evaluating one predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The predicate holds
    Satisfied(String),
    /// The field is there but its value violates the contract
    Unsatisfied(String),
    /// The field is missing or has the wrong type
    Absent(String),
}

impl Verdict {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Verdict::Satisfied(_))
    }

    /// Absence is a contract failure
    pub fn required(self, name: &str) -> Outcome {
        match self {
            Verdict::Satisfied(msg) => Outcome::pass(name, msg),
            Verdict::Unsatisfied(msg) | Verdict::Absent(msg) => Outcome::contract_fail(name, msg),
        }
    }

    /// Absence is reported but does not fail the check
    pub fn optional(self, name: &str) -> Outcome {
        match self {
            Verdict::Satisfied(msg) => Outcome::pass(name, msg),
            Verdict::Absent(msg) => Outcome::pass(name, format!("Not reported ({})", msg)),
            Verdict::Unsatisfied(msg) => Outcome::contract_fail(name, msg),
        }
    }
}

/// Walk a dotted path ("program.touchdown.stepSize") into a payload
pub fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(payload, |value, key| value.as_object()?.get(key))
}

pub fn number(payload: &Value, path: &str) -> Option<f64> {
    lookup(payload, path)?.as_f64()
}

pub fn boolean(payload: &Value, path: &str) -> Option<bool> {
    lookup(payload, path)?.as_bool()
}

pub fn string<'a>(payload: &'a Value, path: &str) -> Option<&'a str> {
    lookup(payload, path)?.as_str()
}

pub fn array<'a>(payload: &'a Value, path: &str) -> Option<&'a Vec<Value>> {
    lookup(payload, path)?.as_array()
}

/// First candidate path holding a number, with the path that matched
pub fn first_number<'p>(payload: &Value, candidates: &[&'p str]) -> Option<(&'p str, f64)> {
    candidates
        .iter()
        .find_map(|path| number(payload, path).map(|n| (*path, n)))
}

/// Required top-level fields absent from `payload`, in `required` order
///
/// Every missing field is reported, not just the first. A payload that is
/// not an object is missing all of them.
pub fn missing_fields<S: AsRef<str>>(payload: &Value, required: &[S]) -> Vec<String> {
    let object = payload.as_object();
    required
        .iter()
        .map(AsRef::as_ref)
        .filter(|field| !object.is_some_and(|o| o.contains_key(*field)))
        .map(str::to_string)
        .collect()
}

pub fn check_fields<S: AsRef<str>>(payload: &Value, required: &[S]) -> Verdict {
    let missing = missing_fields(payload, required);
    if missing.is_empty() {
        Verdict::Satisfied("All required fields present".to_string())
    } else {
        Verdict::Unsatisfied(format!("Missing fields: {}", missing.join(", ")))
    }
}

/// Slack for binary rounding when a reading sits exactly on the tolerance edge
const TOLERANCE_EPSILON: f64 = 1e-9;

/// Absolute-tolerance comparison, inclusive at the edge
pub fn within_tolerance(actual: f64, expected: f64, tolerance: f64) -> bool {
    actual.is_finite() && (actual - expected).abs() <= tolerance + TOLERANCE_EPSILON
}

/// Inclusive range check; bounds may be given in either order
pub fn in_range(value: f64, a: f64, b: f64) -> bool {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    value.is_finite() && value >= low && value <= high
}

/// Case-insensitive substring match against any accepted token
pub fn state_matches(state: &str, tokens: &[&str]) -> bool {
    let upper = state.to_uppercase();
    tokens.iter().any(|t| upper.contains(&t.to_uppercase()))
}

/// Read a numeric field (first of `candidates`) and compare it to `expected`
pub fn check_tolerance(payload: &Value, candidates: &[&str], expected: f64, tolerance: f64) -> Verdict {
    match first_number(payload, candidates) {
        Some((field, actual)) if within_tolerance(actual, expected, tolerance) => {
            Verdict::Satisfied(format!("{}: {} (expected {} ± {})", field, actual, expected, tolerance))
        }
        Some((field, actual)) => Verdict::Unsatisfied(format!(
            "{}: {} (expected {} ± {})",
            field, actual, expected, tolerance
        )),
        None => Verdict::Absent(format!("{} not found", candidates.join("/"))),
    }
}

/// Read a numeric field and require it to lie in `[a, b]`
pub fn check_range(payload: &Value, candidates: &[&str], a: f64, b: f64) -> Verdict {
    match first_number(payload, candidates) {
        Some((field, value)) if in_range(value, a, b) => {
            Verdict::Satisfied(format!("{}: {} within [{}, {}]", field, value, a.min(b), a.max(b)))
        }
        Some((field, value)) => Verdict::Unsatisfied(format!(
            "{}: {} outside [{}, {}]",
            field,
            value,
            a.min(b),
            a.max(b)
        )),
        None => Verdict::Absent(format!("{} not found", candidates.join("/"))),
    }
}

/// Match the top-level `state` field against accepted tokens
pub fn check_state(payload: &Value, tokens: &[&str]) -> Verdict {
    match string(payload, "state") {
        Some(state) if state_matches(state, tokens) => {
            Verdict::Satisfied(format!("Current state: {}", state))
        }
        Some(state) => Verdict::Unsatisfied(format!(
            "Unexpected state: {} (expected one of {})",
            state,
            tokens.join(", ")
        )),
        None => Verdict::Absent("state not found".to_string()),
    }
}

/// Presence of a nested object, e.g. an optional program block
pub fn check_object(payload: &Value, path: &str) -> Verdict {
    match lookup(payload, path) {
        Some(Value::Object(_)) => Verdict::Satisfied(format!("{} present", path)),
        Some(other) => Verdict::Unsatisfied(format!("{} is {}, expected an object", path, type_name(other))),
        None => Verdict::Absent(format!("{} not found", path)),
    }
}

/// A boolean field equal to `expected`
pub fn check_flag(payload: &Value, path: &str, expected: bool) -> Verdict {
    match lookup(payload, path) {
        Some(Value::Bool(b)) if *b == expected => Verdict::Satisfied(format!("{} = {}", path, b)),
        Some(Value::Bool(b)) => Verdict::Unsatisfied(format!("{} = {} (expected {})", path, b, expected)),
        Some(other) => Verdict::Unsatisfied(format!("{} is {}, expected a boolean", path, type_name(other))),
        None => Verdict::Absent(format!("{} not found", path)),
    }
}

/// A string field equal to `expected`, ignoring case
pub fn check_text(payload: &Value, path: &str, expected: &str) -> Verdict {
    match lookup(payload, path) {
        Some(Value::String(s)) if s.eq_ignore_ascii_case(expected) => {
            Verdict::Satisfied(format!("{} = {}", path, s))
        }
        Some(Value::String(s)) => Verdict::Unsatisfied(format!("{} = {} (expected {})", path, s, expected)),
        Some(other) => Verdict::Unsatisfied(format!("{} is {}, expected a string", path, type_name(other))),
        None => Verdict::Absent(format!("{} not found", path)),
    }
}

/// A list field, possibly empty
pub fn check_list(payload: &Value, path: &str) -> Verdict {
    match lookup(payload, path) {
        Some(Value::Array(items)) => Verdict::Satisfied(format!("{} entries", items.len())),
        Some(other) => Verdict::Unsatisfied(format!("{} is {}, expected a list", path, type_name(other))),
        None => Verdict::Absent(format!("{} not found", path)),
    }
}

/// A non-empty list field
pub fn check_non_empty_list(payload: &Value, path: &str) -> Verdict {
    match lookup(payload, path) {
        Some(Value::Array(items)) if !items.is_empty() => {
            Verdict::Satisfied(format!("{} entries", items.len()))
        }
        Some(Value::Array(_)) => Verdict::Unsatisfied(format!("{} is empty", path)),
        Some(other) => Verdict::Unsatisfied(format!("{} is {}, expected a list", path, type_name(other))),
        None => Verdict::Absent(format!("{} not found", path)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
