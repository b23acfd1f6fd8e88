//! The model-form capability consumed by the adapter.

use std::collections::BTreeMap;
use std::future::Future;

use direct_protocol::RequestContext;
use serde_json::{Map, Value};
use thiserror::Error;

/// Field name → value.
pub type Record = Map<String, Value>;

/// Key meaning "a record that does not exist yet".
pub const NEW_RECORD: i64 = -1;

#[derive(Debug, Error)]
pub enum FormError {
    #[error("record {0} does not exist")]
    NotFound(i64),

    #[error("invalid record key: {0}")]
    InvalidKey(String),

    #[error("field '{0}' has no choices")]
    NoChoices(String),

    #[error("form is not valid")]
    Invalid,

    #[error("storage error: {0}")]
    Storage(String),
}

/// Which adapter operation an authorization check is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormOperation {
    Get,
    Update,
}

impl FormOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Update => "update",
        }
    }
}

/// Optional access check run before a record is returned or saved.
pub trait Authorize: Send + Sync {
    fn authorize(&self, ctx: &RequestContext, operation: FormOperation) -> bool;
}

impl<F> Authorize for F
where
    F: Fn(&RequestContext, FormOperation) -> bool + Send + Sync,
{
    fn authorize(&self, ctx: &RequestContext, operation: FormOperation) -> bool {
        self(ctx, operation)
    }
}

/// Optional check run before the bound form is validated.
pub trait PreValidate: Send + Sync {
    fn validate(&self, ctx: &RequestContext) -> bool;
}

impl<F> PreValidate for F
where
    F: Fn(&RequestContext) -> bool + Send + Sync,
{
    fn validate(&self, ctx: &RequestContext) -> bool {
        self(ctx)
    }
}

/// A submission bound to a form, possibly over an existing record.
pub trait BoundForm: Send {
    fn is_valid(&mut self) -> bool;

    /// Field name → error messages. Populated by [`BoundForm::is_valid`].
    fn errors(&self) -> BTreeMap<String, Vec<String>>;

    fn save(self) -> impl Future<Output = Result<(), FormError>> + Send;
}

/// A model-backed form type.
pub trait ModelForm: Send + Sync + 'static {
    type Bound: BoundForm;

    /// Form class name; published as action `XD_<name>`.
    fn name(&self) -> &str;

    fn fetch_by_key(&self, key: i64) -> impl Future<Output = Result<Option<Record>, FormError>> + Send;

    /// Field values of a new record.
    fn initial_values(&self) -> Record;

    /// `(key, label)` pairs for `field`, given the record being edited.
    fn field_choices(
        &self,
        record: Option<&Record>,
        field: &str,
    ) -> impl Future<Output = Result<Vec<(Value, String)>, FormError>> + Send;

    /// Bind the request's submitted fields (and files, for uploads).
    fn bind(&self, ctx: &RequestContext, key: i64, instance: Option<Record>) -> Self::Bound;

    fn authorizer(&self) -> Option<&dyn Authorize> {
        None
    }

    fn validator(&self) -> Option<&dyn PreValidate> {
        None
    }
}
