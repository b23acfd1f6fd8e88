//! Ext.Direct Transport Layer
//!
//! Serves the provider over HTTP and talks to it as a client.
//! The server side handles:
//! - Descriptor script endpoint (`api.js`)
//! - Router endpoint, buffering the body so form and JSON reads can both run
//! - Form-encoded and multipart field extraction
//! - Health check
//!
//! The transport is decoupled from dispatch via the `RequestHandler` trait.

pub mod client;
pub mod server;

pub use client::{ActionProxy, ClientError, DirectClient, MethodStub};
pub use server::{RequestHandler, TransportConfig, TransportError, TransportServer};
