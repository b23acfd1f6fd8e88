//! Ext.Direct provider: registers actions and routes RPC requests to them.
//!
//! The [`Provider`] owns the method registry, publishes the API descriptor
//! script, and implements the transport's `RequestHandler` so the HTTP layer
//! can hand it buffered router requests.

pub mod binder;
pub mod config;
pub mod decoder;
pub mod descriptor;
pub mod registry;
pub mod router;

pub use config::{CsrfConfig, DispatchMode, ProviderConfig, GENERIC_FAILURE_MESSAGE};
pub use registry::{HandlerResult, LookupError, MethodHandler, MethodRegistry, RegisteredMethod};
pub use router::Provider;
