//! Registers `get`, `update` and `choices` for a model form.

use std::sync::Arc;

use anyhow::{Context, anyhow};
use direct_protocol::{MethodFlags, RequestContext};
use direct_server::Provider;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::form::{BoundForm, FormError, FormOperation, ModelForm, NEW_RECORD, Record};

pub const ACCESS_DENIED: &str = "access denied";
pub const PRE_VALIDATION_FAILED: &str = "pre-validation failed";

/// Action name a form is published under.
pub fn action_name(form_name: &str) -> String {
    format!("XD_{form_name}")
}

/// Publish `form` on `provider`. Returns the action name.
pub fn register_form<F: ModelForm>(provider: &Provider, form: F) -> String {
    let form = Arc::new(form);
    let action = action_name(form.name());

    let get = form.clone();
    provider.register(
        &action,
        "get",
        ["pk"],
        MethodFlags::new(),
        move |ctx: Arc<RequestContext>, args: Vec<Value>| {
            let form = get.clone();
            async move { get_record(form.as_ref(), &ctx, &args).await }
        },
    );

    let update = form.clone();
    provider.register(
        &action,
        "update",
        ["pk"],
        MethodFlags::form_handler(),
        move |ctx: Arc<RequestContext>, args: Vec<Value>| {
            let form = update.clone();
            async move { update_record(form.as_ref(), &ctx, &args).await }
        },
    );

    let choices = form;
    provider.register(
        &action,
        "choices",
        ["pk", "field"],
        MethodFlags::new(),
        move |ctx: Arc<RequestContext>, args: Vec<Value>| {
            let form = choices.clone();
            async move { record_choices(form.as_ref(), &ctx, &args).await }
        },
    );

    info!("Registered form action {action}");
    action
}

async fn get_record<F: ModelForm>(
    form: &F,
    ctx: &RequestContext,
    args: &[Value],
) -> anyhow::Result<Value> {
    let key = parse_key(args.first()).context("reading record key")?;
    let record = load(form, key).await?;

    if !authorized(form, ctx, FormOperation::Get) {
        return Ok(denied(ACCESS_DENIED));
    }

    let data = record.unwrap_or_else(|| form.initial_values());
    Ok(json!({ "data": data, "success": true }))
}

async fn update_record<F: ModelForm>(
    form: &F,
    ctx: &RequestContext,
    args: &[Value],
) -> anyhow::Result<Value> {
    // Form submits carry the key as a field; JSON calls pass it as the argument.
    let key = match args.first() {
        Some(value) if !value.is_null() => parse_key(Some(value)),
        _ => ctx
            .field("pk")
            .ok_or_else(|| FormError::InvalidKey("missing field 'pk'".into()))
            .and_then(|raw| parse_key(Some(&Value::String(raw.to_string())))),
    }
    .context("reading record key")?;

    let instance = load(form, key).await?;
    let mut bound = form.bind(ctx, key, instance);

    if !authorized(form, ctx, FormOperation::Update) {
        return Ok(denied(ACCESS_DENIED));
    }
    if let Some(validator) = form.validator() {
        if !validator.validate(ctx) {
            return Ok(denied(PRE_VALIDATION_FAILED));
        }
    }

    if bound.is_valid() {
        bound.save().await?;
        debug!("Saved {} record {key}", form.name());
        return Ok(json!({ "success": true }));
    }

    let errors: serde_json::Map<String, Value> = bound
        .errors()
        .into_iter()
        .map(|(field, messages)| (field, Value::String(messages.join("\n"))))
        .collect();
    Ok(json!({ "success": false, "errors": errors }))
}

async fn record_choices<F: ModelForm>(
    form: &F,
    ctx: &RequestContext,
    args: &[Value],
) -> anyhow::Result<Value> {
    let key = parse_key(args.first()).context("reading record key")?;
    let field = args
        .get(1)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("field name must be a string"))?;
    let record = load(form, key).await?;

    if !authorized(form, ctx, FormOperation::Get) {
        return Ok(denied(ACCESS_DENIED));
    }

    let choices: Vec<Value> = form
        .field_choices(record.as_ref(), field)
        .await?
        .into_iter()
        .map(|(key, label)| json!([key, label]))
        .collect();
    Ok(json!({ "data": choices, "success": true }))
}

/// Fetch the record for `key`, or `None` for [`NEW_RECORD`].
async fn load<F: ModelForm>(form: &F, key: i64) -> Result<Option<Record>, FormError> {
    if key == NEW_RECORD {
        return Ok(None);
    }
    match form.fetch_by_key(key).await? {
        Some(record) => Ok(Some(record)),
        None => Err(FormError::NotFound(key)),
    }
}

fn authorized<F: ModelForm>(form: &F, ctx: &RequestContext, operation: FormOperation) -> bool {
    form.authorizer()
        .is_none_or(|hook| hook.authorize(ctx, operation))
}

fn denied(message: &str) -> Value {
    json!({ "success": false, "errors": { "__all__": message } })
}

/// Record keys arrive as JSON integers or as numeric strings from form fields.
fn parse_key(value: Option<&Value>) -> Result<i64, FormError> {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| FormError::InvalidKey(n.to_string())),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| FormError::InvalidKey(s.clone())),
        Some(other) => Err(FormError::InvalidKey(other.to_string())),
        None => Err(FormError::InvalidKey("missing".into())),
    }
}
