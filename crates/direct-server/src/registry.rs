//! Method registry: action name → method name → handler and signature.
//!
//! Populated during startup wiring and read concurrently afterwards. Writes
//! are still guarded so registration may also happen while serving; lookups
//! clone the method's `Arc` out of the lock before it is invoked.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use direct_protocol::{MethodDescriptor, MethodFlags, RequestContext};
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// Outcome of a handler: the value to publish as `result`, or a failure.
pub type HandlerResult = anyhow::Result<Value>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

/// A remotely callable function.
///
/// Receives the request context followed by the bound arguments, in the
/// order of the declared parameter names.
pub trait MethodHandler: Send + Sync + 'static {
    fn call(&self, ctx: Arc<RequestContext>, args: Vec<Value>) -> HandlerFuture;
}

impl<F, Fut> MethodHandler for F
where
    F: Fn(Arc<RequestContext>, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: Arc<RequestContext>, args: Vec<Value>) -> HandlerFuture {
        Box::pin(self(ctx, args))
    }
}

/// A registered method: signature, flags, and handler.
pub struct RegisteredMethod {
    pub name: String,
    /// Formal parameter names, excluding the implicit request context
    pub params: Vec<String>,
    pub flags: MethodFlags,
    handler: Arc<dyn MethodHandler>,
}

impl RegisteredMethod {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn handler(&self) -> &Arc<dyn MethodHandler> {
        &self.handler
    }

    pub fn descriptor(&self) -> MethodDescriptor {
        MethodDescriptor {
            name: self.name.clone(),
            len: self.arity(),
            flags: self.flags.clone(),
        }
    }
}

impl std::fmt::Debug for RegisteredMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredMethod")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Routing failure for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no such action")]
    NoSuchAction(String),
    #[error("no such method")]
    NoSuchMethod(String),
}

impl LookupError {
    /// The name that failed to resolve; reported as the envelope's `where`.
    pub fn location(&self) -> &str {
        match self {
            Self::NoSuchAction(name) | Self::NoSuchMethod(name) => name,
        }
    }
}

type ActionTable = BTreeMap<String, BTreeMap<String, Arc<RegisteredMethod>>>;

#[derive(Default)]
pub struct MethodRegistry {
    actions: RwLock<ActionTable>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` as `action.method`. The action is created on first
    /// use; an existing entry for the same pair is replaced.
    pub fn register<H, I, S>(
        &self,
        action: impl Into<String>,
        method: impl Into<String>,
        params: I,
        flags: MethodFlags,
        handler: H,
    ) where
        H: MethodHandler,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let action = action.into();
        let method = method.into();
        let entry = RegisteredMethod {
            name: method.clone(),
            params: params.into_iter().map(Into::into).collect(),
            flags,
            handler: Arc::new(handler),
        };
        let arity = entry.arity();

        let replaced = self
            .actions
            .write()
            .entry(action.clone())
            .or_default()
            .insert(method.clone(), Arc::new(entry))
            .is_some();

        if replaced {
            debug!("Replaced method {action}.{method} (len {arity})");
        } else {
            info!("Registered method {action}.{method} (len {arity})");
        }
    }

    pub fn lookup(&self, action: &str, method: &str) -> Result<Arc<RegisteredMethod>, LookupError> {
        let actions = self.actions.read();
        let methods = actions
            .get(action)
            .ok_or_else(|| LookupError::NoSuchAction(action.to_string()))?;
        methods
            .get(method)
            .cloned()
            .ok_or_else(|| LookupError::NoSuchMethod(method.to_string()))
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.actions.read().contains_key(action)
    }

    pub fn action_count(&self) -> usize {
        self.actions.read().len()
    }

    /// Snapshot of every action and its method descriptors, ordered by name.
    pub fn list_actions(&self) -> Vec<(String, Vec<MethodDescriptor>)> {
        self.actions
            .read()
            .iter()
            .map(|(action, methods)| {
                let descriptors = methods.values().map(|m| m.descriptor()).collect();
                (action.clone(), descriptors)
            })
            .collect()
    }
}
