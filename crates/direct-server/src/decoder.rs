//! Classifies a buffered router request.
//!
//! Form fields are tried first: a browser file upload cannot carry a JSON
//! body, so form submits arrive as `extAction`/`extMethod`/`extType`/
//! `extUpload`/`extTID` fields. When any of them is missing the raw body is
//! parsed as a JSON batch instead. The body stays buffered in the
//! [`InboundRequest`], so both read paths are available.

use direct_protocol::{
    CallRequest, FORM_ACTION, FORM_METHOD, FORM_TID, FORM_TYPE, FORM_UPLOAD, FormCall, FormFields,
    InboundRequest, RequestContext, ResponseEnvelope, Tid,
};
use serde_json::Value;

/// Message of every envelope produced for an undecodable request or item.
pub const MALFORMED_REQUEST: &str = "malformed request";

/// One element of a decoded JSON batch.
#[derive(Debug, Clone)]
pub enum BatchItem {
    Call(CallRequest),
    /// The element was JSON but not a call; answered with this envelope
    Invalid(ResponseEnvelope),
}

#[derive(Debug)]
pub enum DecodedRequest {
    Form {
        call: FormCall,
        context: RequestContext,
    },
    Batch {
        items: Vec<BatchItem>,
        context: RequestContext,
    },
    /// Neither form fields nor a JSON body; the whole request fails
    Malformed(ResponseEnvelope),
}

pub fn decode(request: InboundRequest) -> DecodedRequest {
    let InboundRequest {
        headers,
        form,
        files,
        body,
    } = request;

    let form_error = match form.as_ref().map(read_form_call) {
        Some(Ok(call)) => {
            let upload = call.upload;
            let context = RequestContext::new(headers, form.unwrap_or_default(), files, upload);
            return DecodedRequest::Form { call, context };
        }
        Some(Err(missing)) => format!("missing form field '{missing}'"),
        None => "no form fields".to_string(),
    };

    match serde_json::from_slice::<Value>(&body) {
        Ok(parsed) => {
            let elements = match parsed {
                Value::Array(elements) => elements,
                single => vec![single],
            };
            let items = elements.into_iter().map(decode_item).collect();
            let context = RequestContext::new(headers, form.unwrap_or_default(), files, false);
            DecodedRequest::Batch { items, context }
        }
        Err(json_error) => DecodedRequest::Malformed(ResponseEnvelope::exception(
            None,
            MALFORMED_REQUEST,
            format!("{form_error}; body is not JSON: {json_error}"),
        )),
    }
}

/// Extract the five `ext*` fields, or name the first missing one.
fn read_form_call(fields: &FormFields) -> Result<FormCall, &'static str> {
    let field = |name: &'static str| fields.get(name).ok_or(name);

    let action = field(FORM_ACTION)?;
    let method = field(FORM_METHOD)?;
    let call_type = field(FORM_TYPE)?;
    let upload = field(FORM_UPLOAD)?;
    let tid = field(FORM_TID)?;

    Ok(FormCall {
        action: action.to_string(),
        method: method.to_string(),
        call_type: call_type.to_string(),
        upload: upload == "true",
        tid: Some(Tid::String(tid.to_string())),
    })
}

fn decode_item(element: Value) -> BatchItem {
    let tid = element
        .get("tid")
        .cloned()
        .and_then(|t| serde_json::from_value::<Option<Tid>>(t).ok().flatten());

    match serde_json::from_value::<CallRequest>(element) {
        Ok(call) => BatchItem::Call(call),
        Err(e) => BatchItem::Invalid(ResponseEnvelope::exception(tid, MALFORMED_REQUEST, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form_fields(upload: &str) -> FormFields {
        [
            (FORM_ACTION, "XD_Contact"),
            (FORM_METHOD, "update"),
            (FORM_TYPE, "rpc"),
            (FORM_UPLOAD, upload),
            (FORM_TID, "5"),
            ("pk", "1"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn complete_form_fields_decode_as_form_submit() {
        let decoded = decode(InboundRequest::form(form_fields("false"), Vec::new()));
        match decoded {
            DecodedRequest::Form { call, context } => {
                assert_eq!(call.action, "XD_Contact");
                assert_eq!(call.method, "update");
                assert!(!call.upload);
                assert_eq!(call.tid, Some(Tid::String("5".into())));
                assert_eq!(context.field("pk"), Some("1"));
                assert!(!context.is_upload());
            }
            other => panic!("expected form submit, got {other:?}"),
        }
    }

    #[test]
    fn upload_flag_requires_literal_true() {
        match decode(InboundRequest::form(form_fields("true"), Vec::new())) {
            DecodedRequest::Form { call, context } => {
                assert!(call.upload);
                assert!(context.is_upload());
            }
            other => panic!("expected form submit, got {other:?}"),
        }
    }

    #[test]
    fn json_object_is_wrapped_into_a_batch() {
        let body = json!({"action": "A", "method": "m", "data": [], "type": "rpc", "tid": 1});
        match decode(InboundRequest::json(body.to_string())) {
            DecodedRequest::Batch { items, .. } => {
                assert_eq!(items.len(), 1);
                assert!(matches!(&items[0], BatchItem::Call(c) if c.action == "A"));
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn json_array_keeps_order() {
        let body = json!([
            {"action": "A", "method": "one", "data": [], "type": "rpc", "tid": 1},
            {"action": "A", "method": "two", "data": [], "type": "rpc", "tid": 2}
        ]);
        match decode(InboundRequest::json(body.to_string())) {
            DecodedRequest::Batch { items, .. } => {
                let methods: Vec<_> = items
                    .iter()
                    .map(|item| match item {
                        BatchItem::Call(c) => c.method.as_str(),
                        BatchItem::Invalid(_) => "invalid",
                    })
                    .collect();
                assert_eq!(methods, vec!["one", "two"]);
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn partial_form_falls_back_to_json_body() {
        let fields: FormFields = [(FORM_ACTION, "A")].into_iter().collect();
        let mut request = InboundRequest::form(fields, Vec::new());
        request.body = json!({"action": "B", "method": "m", "tid": 3}).to_string().into();
        match decode(request) {
            DecodedRequest::Batch { items, .. } => {
                assert!(matches!(&items[0], BatchItem::Call(c) if c.action == "B"));
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn garbage_body_is_malformed_with_null_tid() {
        match decode(InboundRequest::json("not json at all")) {
            DecodedRequest::Malformed(ResponseEnvelope::Exception(e)) => {
                assert_eq!(e.message, MALFORMED_REQUEST);
                assert!(e.tid.is_none());
                assert!(e.location.contains("no form fields"));
            }
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn malformed_diagnostic_names_missing_form_field() {
        let fields: FormFields = [(FORM_ACTION, "A"), (FORM_METHOD, "m")].into_iter().collect();
        match decode(InboundRequest::form(fields, Vec::new())) {
            DecodedRequest::Malformed(ResponseEnvelope::Exception(e)) => {
                assert!(e.location.contains("extType"), "{}", e.location);
            }
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn batch_element_without_action_is_answered_individually() {
        let body = json!([
            {"method": "m", "tid": 9},
            {"action": "A", "method": "m", "data": [], "type": "rpc", "tid": 10}
        ]);
        match decode(InboundRequest::json(body.to_string())) {
            DecodedRequest::Batch { items, .. } => {
                match &items[0] {
                    BatchItem::Invalid(env) => assert_eq!(env.tid(), Some(&Tid::from(9u64))),
                    other => panic!("expected invalid item, got {other:?}"),
                }
                assert!(matches!(&items[1], BatchItem::Call(_)));
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn any_tid_value_is_kept_for_echoing() {
        let body = json!([
            {"action": "A", "method": "m", "data": [], "type": "rpc", "tid": true},
            {"action": "A", "method": "m", "data": [], "type": "rpc", "tid": {"seq": 2}},
            {"action": "A", "method": "m", "data": [], "type": "rpc", "tid": null}
        ]);
        match decode(InboundRequest::json(body.to_string())) {
            DecodedRequest::Batch { items, .. } => {
                let tids: Vec<Option<Tid>> = items
                    .into_iter()
                    .map(|item| match item {
                        BatchItem::Call(call) => call.tid,
                        other => panic!("expected call, got {other:?}"),
                    })
                    .collect();
                assert_eq!(tids[0], Some(Tid::Other(json!(true))));
                assert_eq!(tids[1], Some(Tid::Other(json!({"seq": 2}))));
                assert_eq!(tids[2], None);
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }
}
