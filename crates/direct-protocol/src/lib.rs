//! Ext.Direct remoting protocol types.
//!
//! This crate is the single source of truth for everything that crosses the
//! wire: call requests, response envelopes, the API descriptor document and
//! the lexer that reads it back. It carries no HTTP or runtime dependencies.

pub mod context;
pub mod descriptor;
pub mod envelope;
pub mod error;
pub mod script;

pub use context::{FormFields, InboundRequest, RequestContext, RouterReply, UploadedFile};
pub use descriptor::{ApiDescriptor, MethodDescriptor, MethodFlags};
pub use envelope::{
    CallRequest, ExceptionEnvelope, FormCall, ResponseEnvelope, ResponseBody, SuccessEnvelope, Tid,
};
pub use error::DirectError;

/// Form field naming the target action of a form submit.
pub const FORM_ACTION: &str = "extAction";
/// Form field naming the target method of a form submit.
pub const FORM_METHOD: &str = "extMethod";
/// Form field carrying the response type tag.
pub const FORM_TYPE: &str = "extType";
/// Form field set to `"true"` when the submit carries file attachments.
pub const FORM_UPLOAD: &str = "extUpload";
/// Form field carrying the transaction id.
pub const FORM_TID: &str = "extTID";

/// Default global variable the descriptor is assigned to.
pub const DEFAULT_REMOTE_NAME: &str = "Ext.app.REMOTING_API";
