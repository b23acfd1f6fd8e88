//! The API descriptor: the provider's self-description document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys owned by [`MethodDescriptor`] that flags may not shadow.
const RESERVED_KEYS: [&str; 2] = ["name", "len"];

/// Extra per-method attributes published in the descriptor (e.g. `formHandler`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodFlags(Map<String, Value>);

impl MethodFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags for a method that receives form submits.
    pub fn form_handler() -> Self {
        Self::new().with("formHandler", true)
    }

    /// Add a flag. Reserved keys (`name`, `len`) are ignored.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) {
            return;
        }
        self.0.insert(key, value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_form_handler(&self) -> bool {
        self.0.get("formHandler").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One method entry: `{name, len, ...flags}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub len: usize,
    #[serde(flatten)]
    pub flags: MethodFlags,
}

/// `{url, type: "remoting", actions: {name: [method, ...]}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDescriptor {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub actions: BTreeMap<String, Vec<MethodDescriptor>>,
}

impl ApiDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: "remoting".into(),
            actions: BTreeMap::new(),
        }
    }

    /// Look up one method entry.
    pub fn method(&self, action: &str, method: &str) -> Option<&MethodDescriptor> {
        self.actions.get(action)?.iter().find(|m| m.name == method)
    }
}
