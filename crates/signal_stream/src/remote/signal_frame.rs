use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use common::models::{Signal, SignalAction};

use crate::traits::RemoteFrame;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("symbol is empty")]
    EmptySymbol,
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error("unparseable timestamp '{0}'")]
    BadTimestamp(String),
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Signal(Signal),
    Pong,
    Heartbeat,
    ServerError(String),
    Other(String),
}

#[derive(Debug, Deserialize)]
pub struct SignalPayload {
    pub symbol: Option<String>,
    pub action: Option<String>,
    pub confidence: Option<f64>,
    pub timestamp: Option<String>,
}

impl RemoteFrame<Signal> for SignalPayload {
    fn to_validated(&self) -> Result<Signal, DecodeError> {
        let symbol = self
            .symbol
            .as_deref()
            .ok_or(DecodeError::MissingField("symbol"))?
            .trim();
        if symbol.is_empty() {
            return Err(DecodeError::EmptySymbol);
        }

        let raw_action = self
            .action
            .as_deref()
            .ok_or(DecodeError::MissingField("action"))?;
        let action = SignalAction::parse(raw_action)
            .ok_or_else(|| DecodeError::UnknownAction(raw_action.to_string()))?;

        let confidence = self
            .confidence
            .ok_or(DecodeError::MissingField("confidence"))?;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(DecodeError::ConfidenceOutOfRange(confidence));
        }

        let raw_ts = self
            .timestamp
            .as_deref()
            .ok_or(DecodeError::MissingField("timestamp"))?;

        Ok(Signal {
            symbol: symbol.to_uppercase(),
            action,
            confidence,
            timestamp: parse_timestamp(raw_ts)?,
        })
    }
}

/// RFC 3339, or a naive ISO 8601 datetime taken as UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DecodeError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| DecodeError::BadTimestamp(raw.to_string()))
}

pub fn decode_frame(text: &str) -> Result<Frame, DecodeError> {
    let value: Value = serde_json::from_str(text)?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("type"))?;

    match kind {
        "signal" => {
            let payload = serde_json::from_value::<SignalPayload>(value)?;
            Ok(Frame::Signal(payload.to_validated()?))
        }
        "pong" => Ok(Frame::Pong),
        "heartbeat" => Ok(Frame::Heartbeat),
        "error" => Ok(Frame::ServerError(
            value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified")
                .to_string(),
        )),
        other => Ok(Frame::Other(other.to_string())),
    }
}

pub fn ping_frame() -> String {
    json!({ "type": "ping", "timestamp": Utc::now().to_rfc3339() }).to_string()
}

pub fn subscribe_frame(client: &str) -> String {
    json!({ "type": "subscribe", "client": client }).to_string()
}
