//! Form-backed actions.
//!
//! A model form is an external capability that can fetch a record by key,
//! describe initial values and field choices, and bind/validate/save a
//! submission. [`register_form`] publishes one as an action named
//! `XD_<FormName>` with three ordinary methods: `get`, `update` and
//! `choices`. Authorization and pre-validation failures are returned as
//! regular results carrying `{success: false, errors: {...}}`.

pub mod adapter;
pub mod form;
pub mod memory;

pub use adapter::{ACCESS_DENIED, PRE_VALIDATION_FAILED, action_name, register_form};
pub use form::{Authorize, BoundForm, FormError, FormOperation, ModelForm, NEW_RECORD, PreValidate, Record};
pub use memory::{FieldKind, FieldSpec, MemoryModelForm};
