//! RPC client for an Ext.Direct provider.
//!
//! Fetches the descriptor script, reads the published actions back with the
//! assignment lexer, and builds one [`MethodStub`] per declared method.
//! Every call carries a fresh tid from a shared atomic counter; the echoed
//! tid is checked before the result is trusted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use direct_protocol::script::parse_descriptor;
use direct_protocol::{ApiDescriptor, CallRequest, DirectError, ResponseBody, ResponseEnvelope, Tid};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP exchange did not return 200.
    #[error("request failed: {status} {reason}")]
    Request { status: u16, reason: String },

    /// The provider answered with an exception envelope.
    #[error("remote exception: {message} ({location})")]
    Returned { message: String, location: String },

    /// The echoed tid does not match the one sent.
    #[error("tid mismatch: sent {sent}, received {received}")]
    TidMismatch { sent: String, received: String },

    #[error("{action}.{method} expects {expected} arguments, got {actual}")]
    Arity {
        action: String,
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("{action}.{method} is not published by the provider")]
    UnknownMethod { action: String, method: String },

    #[error("empty response body")]
    EmptyResponse,

    #[error("descriptor error: {0}")]
    Descriptor(#[from] DirectError),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A callable wrapper for one published method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodStub {
    pub action: String,
    pub method: String,
    /// Number of arguments the provider declared
    pub len: usize,
}

impl MethodStub {
    /// Call the method through `client` after checking the argument count.
    pub async fn call(&self, client: &DirectClient, args: Vec<Value>) -> Result<Value, ClientError> {
        if args.len() != self.len {
            return Err(ClientError::Arity {
                action: self.action.clone(),
                method: self.method.clone(),
                expected: self.len,
                actual: args.len(),
            });
        }
        client.send(&self.action, &self.method, args).await
    }
}

/// The methods published under one action.
#[derive(Debug, Clone)]
pub struct ActionProxy {
    pub name: String,
    methods: BTreeMap<String, MethodStub>,
}

impl ActionProxy {
    pub fn method(&self, name: &str) -> Option<&MethodStub> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

pub struct DirectClient {
    http: reqwest::Client,
    router_url: Url,
    descriptor: ApiDescriptor,
    actions: BTreeMap<String, ActionProxy>,
    last_tid: AtomicU64,
}

impl DirectClient {
    /// Fetch the descriptor script at `api_url` and read the descriptor
    /// assigned to `api_name`.
    pub async fn connect(api_url: &str, api_name: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::new();
        let api_url = Url::parse(api_url)?;

        let response = http.get(api_url.clone()).send().await?;
        check_status(response.status())?;
        let script = response.text().await?;

        let descriptor = parse_descriptor(&script, api_name)?;
        Self::from_descriptor(http, &api_url, descriptor)
    }

    /// Build a client from an already parsed descriptor. The descriptor's
    /// `url` is resolved against `base`.
    pub fn from_descriptor(
        http: reqwest::Client,
        base: &Url,
        descriptor: ApiDescriptor,
    ) -> Result<Self, ClientError> {
        let router_url = base.join(&descriptor.url)?;

        let actions = descriptor
            .actions
            .iter()
            .map(|(action, methods)| {
                let stubs = methods
                    .iter()
                    .map(|m| {
                        let stub = MethodStub {
                            action: action.clone(),
                            method: m.name.clone(),
                            len: m.len,
                        };
                        (m.name.clone(), stub)
                    })
                    .collect();
                let proxy = ActionProxy {
                    name: action.clone(),
                    methods: stubs,
                };
                (action.clone(), proxy)
            })
            .collect();

        Ok(Self {
            http,
            router_url,
            descriptor,
            actions,
            last_tid: AtomicU64::new(1),
        })
    }

    pub fn descriptor(&self) -> &ApiDescriptor {
        &self.descriptor
    }

    pub fn router_url(&self) -> &Url {
        &self.router_url
    }

    pub fn action(&self, name: &str) -> Option<&ActionProxy> {
        self.actions.get(name)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionProxy> {
        self.actions.values()
    }

    /// Next transaction id. Strictly increasing across threads.
    pub fn next_tid(&self) -> u64 {
        self.last_tid.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Call `action.method` with positional `args`.
    pub async fn call(&self, action: &str, method: &str, args: Vec<Value>) -> Result<Value, ClientError> {
        let stub = self
            .action(action)
            .and_then(|a| a.method(method))
            .ok_or_else(|| ClientError::UnknownMethod {
                action: action.to_string(),
                method: method.to_string(),
            })?;
        stub.call(self, args).await
    }

    async fn send(&self, action: &str, method: &str, args: Vec<Value>) -> Result<Value, ClientError> {
        let tid = Tid::from(self.next_tid());
        let request = CallRequest::new(action, method, Some(Value::Array(args)), tid.clone());
        debug!("Calling {action}.{method} (tid {tid})");

        let response = self.http.post(self.router_url.clone()).json(&request).send().await?;
        check_status(response.status())?;

        let body: ResponseBody = response.json().await?;
        let envelope = body
            .into_envelopes()
            .into_iter()
            .next()
            .ok_or(ClientError::EmptyResponse)?;

        match envelope {
            ResponseEnvelope::Exception(e) => Err(ClientError::Returned {
                message: e.message,
                location: e.location,
            }),
            ResponseEnvelope::Success(s) if s.tid.as_ref() != Some(&tid) => {
                Err(ClientError::TidMismatch {
                    sent: tid.to_string(),
                    received: s.tid.map(|t| t.to_string()).unwrap_or_else(|| "null".into()),
                })
            }
            ResponseEnvelope::Success(s) => Ok(s.result),
        }
    }
}

fn check_status(status: StatusCode) -> Result<(), ClientError> {
    if status == StatusCode::OK {
        return Ok(());
    }
    Err(ClientError::Request {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("").to_string(),
    })
}
