//! Dispatches decoded requests to registered methods.
//!
//! Every call is isolated: routing errors, arity mismatches and handler
//! failures (including panics) become exception envelopes for that call
//! only. Batch entries run concurrently and are answered in request order.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use direct_protocol::{
    CallRequest, DirectError, FormCall, InboundRequest, RequestContext, ResponseBody,
    ResponseEnvelope, RouterReply, Tid,
};
use direct_transport::RequestHandler;
use futures_util::FutureExt;
use futures_util::future::join_all;
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::binder::bind_arguments;
use crate::config::{DispatchMode, GENERIC_FAILURE_MESSAGE, ProviderConfig};
use crate::decoder::{BatchItem, DecodedRequest, decode};
use crate::descriptor::render_api_script;
use crate::registry::{MethodHandler, MethodRegistry, RegisteredMethod};

/// Message of the envelope produced for an arity mismatch.
pub const INVALID_ARGUMENTS: &str = "invalid arguments";

/// A handler that did not return normally.
enum HandlerFailure {
    Error(anyhow::Error),
    Panic(String),
}

/// The Ext.Direct provider. Owns the registry and routes requests.
pub struct Provider {
    registry: Arc<MethodRegistry>,
    config: ProviderConfig,
}

impl Provider {
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_registry(Arc::new(MethodRegistry::new()), config)
    }

    pub fn with_registry(registry: Arc<MethodRegistry>, config: ProviderConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Register a method. See [`MethodRegistry::register`].
    pub fn register<H, I, S>(
        &self,
        action: impl Into<String>,
        method: impl Into<String>,
        params: I,
        flags: direct_protocol::MethodFlags,
        handler: H,
    ) where
        H: MethodHandler,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry.register(action, method, params, flags, handler);
    }

    /// Render the descriptor script for a router mounted at `router_url`.
    pub fn api_script(&self, router_url: &str) -> Result<String, DirectError> {
        render_api_script(&self.registry, router_url, &self.config)
    }

    /// Decode, dispatch and serialize one router request.
    pub async fn route(&self, request: InboundRequest) -> RouterReply {
        match decode(request) {
            DecodedRequest::Form { call, context } => {
                let envelope = self.dispatch_form(Arc::new(context), &call).await;
                let json = encode(&envelope);
                if call.upload {
                    RouterReply::html(wrap_upload_response(&json))
                } else {
                    RouterReply::json(json)
                }
            }
            DecodedRequest::Batch { items, context } => {
                let body = self.dispatch_batch(Arc::new(context), items).await;
                RouterReply::json(encode(&body))
            }
            DecodedRequest::Malformed(envelope) => {
                warn!("Malformed router request: {envelope:?}");
                RouterReply::json(encode(&envelope))
            }
        }
    }

    /// Dispatch every batch entry; the response keeps request order.
    pub async fn dispatch_batch(&self, ctx: Arc<RequestContext>, items: Vec<BatchItem>) -> ResponseBody {
        let envelopes = join_all(items.into_iter().map(|item| {
            let ctx = ctx.clone();
            async move {
                match item {
                    BatchItem::Call(call) => self.dispatch_call(ctx, call).await,
                    BatchItem::Invalid(envelope) => envelope,
                }
            }
        }))
        .await;

        ResponseBody::from_envelopes(envelopes)
    }

    /// Dispatch one JSON call: resolve, bind, invoke.
    pub async fn dispatch_call(&self, ctx: Arc<RequestContext>, call: CallRequest) -> ResponseEnvelope {
        let CallRequest {
            action,
            method,
            data,
            call_type,
            tid,
        } = call;
        debug!("Dispatching {action}.{method} (tid {tid:?})");

        let target = match self.registry.lookup(&action, &method) {
            Ok(target) => target,
            Err(e) => return ResponseEnvelope::exception(tid, e.to_string(), e.location()),
        };

        let args = match bind_arguments(data.as_ref(), &target.params) {
            Ok(args) => args,
            Err(e) => return ResponseEnvelope::exception(tid, INVALID_ARGUMENTS, e.to_string()),
        };

        match invoke(&target, ctx, args).await {
            Ok(result) => ResponseEnvelope::success(call_type, tid, action, method, result),
            Err(failure) => self.failure_envelope(tid, &action, &method, failure),
        }
    }

    /// Dispatch a form submit. The handler only receives the request context;
    /// it reads the submitted fields from there.
    pub async fn dispatch_form(&self, ctx: Arc<RequestContext>, call: &FormCall) -> ResponseEnvelope {
        let tid = call.tid.clone();
        debug!("Dispatching form submit {}.{} (upload: {})", call.action, call.method, call.upload);

        let target = match self.registry.lookup(&call.action, &call.method) {
            Ok(target) => target,
            Err(e) => return ResponseEnvelope::exception(tid, e.to_string(), e.location()),
        };

        match invoke(&target, ctx, Vec::new()).await {
            Ok(result) => ResponseEnvelope::success(
                call.call_type.clone(),
                tid,
                call.action.clone(),
                call.method.clone(),
                result,
            ),
            Err(failure) => self.failure_envelope(tid, &call.action, &call.method, failure),
        }
    }

    fn failure_envelope(
        &self,
        tid: Option<Tid>,
        action: &str,
        method: &str,
        failure: HandlerFailure,
    ) -> ResponseEnvelope {
        let (message, diagnostic, traced) = match failure {
            HandlerFailure::Error(e) => {
                let traced = e.backtrace().status() == BacktraceStatus::Captured;
                (e.to_string(), format!("{e:?}"), traced)
            }
            HandlerFailure::Panic(msg) => (
                format!("handler panicked: {msg}"),
                format!("panic in {action}.{method}: {msg}"),
                false,
            ),
        };
        error!("{action}.{method} failed: {diagnostic}");

        match self.config.mode {
            DispatchMode::Debug if traced => ResponseEnvelope::exception(tid, message, diagnostic),
            DispatchMode::Debug => {
                // Captured regardless of RUST_BACKTRACE.
                let trace = Backtrace::force_capture();
                let location = format!("{diagnostic}\n\nStack backtrace:\n{trace}");
                ResponseEnvelope::exception(tid, message, location)
            }
            DispatchMode::Production => ResponseEnvelope::exception(tid, GENERIC_FAILURE_MESSAGE, ""),
        }
    }
}

impl RequestHandler for Provider {
    fn api_script(&self, router_url: &str) -> Result<String, DirectError> {
        Provider::api_script(self, router_url)
    }

    async fn handle_request(&self, request: InboundRequest) -> RouterReply {
        self.route(request).await
    }

    fn action_count(&self) -> usize {
        self.registry.action_count()
    }
}

/// Run a handler, trapping both returned errors and panics.
async fn invoke(
    target: &RegisteredMethod,
    ctx: Arc<RequestContext>,
    args: Vec<Value>,
) -> Result<Value, HandlerFailure> {
    let handler = target.handler().clone();
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| handler.call(ctx, args))) {
        Ok(future) => future,
        Err(payload) => return Err(HandlerFailure::Panic(panic_message(payload.as_ref()))),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(HandlerFailure::Error(e)),
        Err(payload) => Err(HandlerFailure::Panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn encode(value: &impl serde::Serialize) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        error!("Failed to encode router response: {e}");
        json!({
            "type": "exception",
            "tid": null,
            "message": "response encoding failed",
            "where": "",
        })
        .to_string()
    })
}

/// Wrap a JSON reply so a browser reading it from an upload iframe sees text.
pub fn wrap_upload_response(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    format!("<html><body><textarea>{escaped}</textarea></body></html>")
}
