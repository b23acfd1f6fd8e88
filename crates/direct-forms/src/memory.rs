//! An in-memory model form.
//!
//! Records live in a shared map keyed by an auto-incrementing integer.
//! Submitted fields are validated against a list of [`FieldSpec`]s; fields
//! absent from a submission keep the bound instance's value.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use direct_protocol::{FormFields, RequestContext, UploadedFile};
use parking_lot::RwLock;
use serde_json::{Value, json};

use crate::form::{Authorize, BoundForm, FormError, ModelForm, NEW_RECORD, PreValidate, Record};

const REQUIRED: &str = "This field is required.";
const NOT_AN_INTEGER: &str = "Enter a whole number.";
const INVALID_CHOICE: &str = "Select a valid choice.";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    /// One of a fixed list of `(key, label)` pairs.
    Choice(Vec<(Value, String)>),
    /// An uploaded file, stored as `{name, size}`.
    File,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub initial: Value,
}

impl FieldSpec {
    fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            initial: Value::Null,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean).initial(false)
    }

    pub fn choice<K, L>(name: impl Into<String>, choices: impl IntoIterator<Item = (K, L)>) -> Self
    where
        K: Into<Value>,
        L: Into<String>,
    {
        let choices = choices
            .into_iter()
            .map(|(key, label)| (key.into(), label.into()))
            .collect();
        Self::new(name, FieldKind::Choice(choices))
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::File)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn initial(mut self, value: impl Into<Value>) -> Self {
        self.initial = value.into();
        self
    }
}

type Records = Arc<RwLock<BTreeMap<i64, Record>>>;

/// A [`ModelForm`] over an in-process record map. Clones share storage.
#[derive(Clone)]
pub struct MemoryModelForm {
    name: String,
    fields: Arc<Vec<FieldSpec>>,
    records: Records,
    next_key: Arc<AtomicI64>,
    authorizer: Option<Arc<dyn Authorize>>,
    validator: Option<Arc<dyn PreValidate>>,
}

impl MemoryModelForm {
    pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = FieldSpec>) -> Self {
        Self {
            name: name.into(),
            fields: Arc::new(fields.into_iter().collect()),
            records: Arc::default(),
            next_key: Arc::new(AtomicI64::new(1)),
            authorizer: None,
            validator: None,
        }
    }

    pub fn with_authorizer(mut self, hook: impl Authorize + 'static) -> Self {
        self.authorizer = Some(Arc::new(hook));
        self
    }

    pub fn with_validator(mut self, hook: impl PreValidate + 'static) -> Self {
        self.validator = Some(Arc::new(hook));
        self
    }

    /// Store `record` under a fresh key and return the key.
    pub fn insert(&self, record: Record) -> i64 {
        store(&self.records, &self.next_key, NEW_RECORD, record)
    }

    pub fn get(&self, key: i64) -> Option<Record> {
        self.records.read().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl ModelForm for MemoryModelForm {
    type Bound = MemoryBoundForm;

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_by_key(&self, key: i64) -> Result<Option<Record>, FormError> {
        Ok(self.get(key))
    }

    fn initial_values(&self) -> Record {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.initial.clone()))
            .collect()
    }

    async fn field_choices(
        &self,
        _record: Option<&Record>,
        field: &str,
    ) -> Result<Vec<(Value, String)>, FormError> {
        self.fields
            .iter()
            .find(|f| f.name == field)
            .and_then(|f| match &f.kind {
                FieldKind::Choice(choices) => Some(choices.clone()),
                _ => None,
            })
            .ok_or_else(|| FormError::NoChoices(field.to_string()))
    }

    fn bind(&self, ctx: &RequestContext, key: i64, instance: Option<Record>) -> MemoryBoundForm {
        MemoryBoundForm {
            key,
            fields: self.fields.clone(),
            instance,
            submitted: ctx.form().clone(),
            files: ctx.files().to_vec(),
            cleaned: Record::new(),
            errors: BTreeMap::new(),
            validated: false,
            records: self.records.clone(),
            next_key: self.next_key.clone(),
        }
    }

    fn authorizer(&self) -> Option<&dyn Authorize> {
        self.authorizer.as_deref()
    }

    fn validator(&self) -> Option<&dyn PreValidate> {
        self.validator.as_deref()
    }
}

pub struct MemoryBoundForm {
    key: i64,
    fields: Arc<Vec<FieldSpec>>,
    instance: Option<Record>,
    submitted: FormFields,
    files: Vec<UploadedFile>,
    cleaned: Record,
    errors: BTreeMap<String, Vec<String>>,
    validated: bool,
    records: Records,
    next_key: Arc<AtomicI64>,
}

impl MemoryBoundForm {
    fn existing(&self, field: &str) -> Option<&Value> {
        self.instance.as_ref().and_then(|record| record.get(field))
    }

    fn clean(&self, spec: &FieldSpec) -> Result<Value, &'static str> {
        if spec.kind == FieldKind::File {
            if let Some(file) = self.files.iter().find(|f| f.field == spec.name) {
                return Ok(json!({ "name": file.file_name, "size": file.data.len() }));
            }
            return self.unsubmitted(spec);
        }

        let Some(raw) = self.submitted.get(&spec.name) else {
            return self.unsubmitted(spec);
        };
        let raw = raw.trim();

        if spec.kind == FieldKind::Boolean {
            return Ok(Value::Bool(matches!(raw, "on" | "true" | "1")));
        }
        if raw.is_empty() {
            return if spec.required { Err(REQUIRED) } else { Ok(Value::Null) };
        }

        match &spec.kind {
            FieldKind::Integer => raw.parse::<i64>().map(Value::from).map_err(|_| NOT_AN_INTEGER),
            FieldKind::Choice(choices) => choices
                .iter()
                .map(|(key, _)| key)
                .find(|key| choice_matches(key, raw))
                .cloned()
                .ok_or(INVALID_CHOICE),
            _ => Ok(Value::String(raw.to_string())),
        }
    }

    /// A field missing from the submission keeps the instance's value.
    fn unsubmitted(&self, spec: &FieldSpec) -> Result<Value, &'static str> {
        match self.existing(&spec.name) {
            Some(value) if !value.is_null() => Ok(value.clone()),
            _ if spec.required => Err(REQUIRED),
            _ => Ok(spec.initial.clone()),
        }
    }
}

impl BoundForm for MemoryBoundForm {
    fn is_valid(&mut self) -> bool {
        let mut cleaned = Record::new();
        let mut errors = BTreeMap::new();

        for spec in self.fields.iter() {
            match self.clean(spec) {
                Ok(value) => {
                    cleaned.insert(spec.name.clone(), value);
                }
                Err(message) => {
                    errors.insert(spec.name.clone(), vec![message.to_string()]);
                }
            }
        }

        self.cleaned = cleaned;
        self.errors = errors;
        self.validated = true;
        self.errors.is_empty()
    }

    fn errors(&self) -> BTreeMap<String, Vec<String>> {
        self.errors.clone()
    }

    async fn save(self) -> Result<(), FormError> {
        if !self.validated || !self.errors.is_empty() {
            return Err(FormError::Invalid);
        }
        store(&self.records, &self.next_key, self.key, self.cleaned);
        Ok(())
    }
}

fn store(records: &Records, next_key: &AtomicI64, key: i64, record: Record) -> i64 {
    let key = if key == NEW_RECORD {
        next_key.fetch_add(1, Ordering::SeqCst)
    } else {
        key
    };
    records.write().insert(key, record);
    key
}

fn choice_matches(key: &Value, raw: &str) -> bool {
    match key {
        Value::String(s) => s == raw,
        other => other.to_string() == raw,
    }
}
