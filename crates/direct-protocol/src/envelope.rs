//! Call requests and response envelopes.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Transaction id. An opaque token chosen by the caller and echoed verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tid {
    Number(serde_json::Number),
    String(String),
    /// Any other JSON value (booleans, objects, arrays).
    Other(Value),
}

impl From<u64> for Tid {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl From<i64> for Tid {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for Tid {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

fn default_call_type() -> String {
    "rpc".into()
}

/// One element of a JSON batch: `{action, method, data, type, tid}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    pub action: String,
    pub method: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    #[serde(default)]
    pub tid: Option<Tid>,
}

impl CallRequest {
    pub fn new(
        action: impl Into<String>,
        method: impl Into<String>,
        data: Option<Value>,
        tid: impl Into<Tid>,
    ) -> Self {
        Self {
            action: action.into(),
            method: method.into(),
            data,
            call_type: default_call_type(),
            tid: Some(tid.into()),
        }
    }
}

/// A form submit decoded from the `ext*` form fields. Always a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct FormCall {
    pub action: String,
    pub method: String,
    pub call_type: String,
    pub upload: bool,
    pub tid: Option<Tid>,
}

/// Successful call result: `{type, tid, action, method, result}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessEnvelope {
    #[serde(rename = "type")]
    pub call_type: String,
    pub tid: Option<Tid>,
    pub action: String,
    pub method: String,
    pub result: Value,
}

/// Failed call: `{type: "exception", tid, message, where}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub tid: Option<Tid>,
    pub message: String,
    #[serde(rename = "where")]
    pub location: String,
}

/// A single response unit, correlated to its call by `tid`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    Success(SuccessEnvelope),
    Exception(ExceptionEnvelope),
}

impl ResponseEnvelope {
    pub fn success(
        call_type: impl Into<String>,
        tid: Option<Tid>,
        action: impl Into<String>,
        method: impl Into<String>,
        result: Value,
    ) -> Self {
        Self::Success(SuccessEnvelope {
            call_type: call_type.into(),
            tid,
            action: action.into(),
            method: method.into(),
            result,
        })
    }

    pub fn exception(
        tid: Option<Tid>,
        message: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self::Exception(ExceptionEnvelope {
            kind: "exception".into(),
            tid,
            message: message.into(),
            location: location.into(),
        })
    }

    pub fn tid(&self) -> Option<&Tid> {
        match self {
            Self::Success(s) => s.tid.as_ref(),
            Self::Exception(e) => e.tid.as_ref(),
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception(_))
    }
}

impl<'de> Deserialize<'de> for ResponseEnvelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let is_exception = value.get("type").and_then(Value::as_str) == Some("exception");
        if is_exception {
            serde_json::from_value(value)
                .map(Self::Exception)
                .map_err(serde::de::Error::custom)
        } else {
            serde_json::from_value(value)
                .map(Self::Success)
                .map_err(serde::de::Error::custom)
        }
    }
}

/// What the router writes back for one HTTP request.
///
/// A batch that produced exactly one envelope is emitted unwrapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Batch(Vec<ResponseEnvelope>),
    Single(ResponseEnvelope),
}

impl ResponseBody {
    pub fn from_envelopes(mut envelopes: Vec<ResponseEnvelope>) -> Self {
        if envelopes.len() == 1 {
            if let Some(only) = envelopes.pop() {
                return Self::Single(only);
            }
        }
        Self::Batch(envelopes)
    }

    /// Flatten back into an ordered list of envelopes.
    pub fn into_envelopes(self) -> Vec<ResponseEnvelope> {
        match self {
            Self::Batch(envelopes) => envelopes,
            Self::Single(envelope) => vec![envelope],
        }
    }
}
