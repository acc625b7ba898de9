//! Server reply interpretation.
//!
//! The server answers `{"cars": <int>, "decision": "RED"|"GREEN", ...}`. Only
//! `decision` matters: it must be exactly `RED` or `GREEN`. The server owns
//! the thresholding, so `cars` (and the optional `raw_decision`, the
//! decision before the server's smoothing) are carried for logs only.

use serde_json::Value;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Red,
    Green,
    Unknown,
}

impl Decision {
    /// Parse the wire value. Case-sensitive, no normalization.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "RED" => Decision::Red,
            "GREEN" => Decision::Green,
            _ => Decision::Unknown,
        }
    }

    pub fn is_definite(self) -> bool {
        !matches!(self, Decision::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Red => "RED",
            Decision::Green => "GREEN",
            Decision::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the node reads out of a reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub cars: Option<i64>,
    pub raw_decision: Option<String>,
}

impl Verdict {
    fn unknown() -> Self {
        Self {
            decision: Decision::Unknown,
            cars: None,
            raw_decision: None,
        }
    }
}

/// Interpret a reply body. Anything malformed yields `Decision::Unknown`.
pub fn interpret(body: &str) -> Verdict {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(err) => {
            log::debug!("reply is not json: {}", err);
            return Verdict::unknown();
        }
    };
    let Some(reply) = value.as_object() else {
        log::debug!("reply is not a json object");
        return Verdict::unknown();
    };

    let decision = reply
        .get("decision")
        .and_then(Value::as_str)
        .map(Decision::from_wire)
        .unwrap_or(Decision::Unknown);
    Verdict {
        decision,
        cars: reply.get("cars").and_then(Value::as_i64),
        raw_decision: reply
            .get("raw_decision")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Decision carried by a reply body.
pub fn parse_decision(body: &str) -> Decision {
    interpret(body).decision
}
