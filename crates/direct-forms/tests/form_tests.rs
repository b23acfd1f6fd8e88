//! Form adapter tests through a real provider.

use direct_forms::{
    ACCESS_DENIED, FieldSpec, FormOperation, MemoryModelForm, PRE_VALIDATION_FAILED, Record,
    register_form,
};
use direct_protocol::{
    FORM_ACTION, FORM_METHOD, FORM_TID, FORM_TYPE, FORM_UPLOAD, FormFields, InboundRequest,
    RequestContext, UploadedFile,
};
use direct_server::{Provider, ProviderConfig};
use serde_json::{Value, json};

fn contact_form() -> MemoryModelForm {
    MemoryModelForm::new(
        "Contact",
        [
            FieldSpec::text("name").required(),
            FieldSpec::integer("age"),
            FieldSpec::choice("role", [("admin", "Administrator"), ("user", "User")]).initial("user"),
            FieldSpec::file("avatar"),
        ],
    )
}

fn record(name: &str, age: i64) -> Record {
    let mut record = Record::new();
    record.insert("name".into(), json!(name));
    record.insert("age".into(), json!(age));
    record.insert("role".into(), json!("user"));
    record
}

async fn call(provider: &Provider, method: &str, data: Value) -> Value {
    let body = json!({
        "action": "XD_Contact",
        "method": method,
        "data": data,
        "type": "rpc",
        "tid": 1,
    });
    let reply = provider.route(InboundRequest::json(body.to_string())).await;
    serde_json::from_str(&reply.body).unwrap()
}

async fn submit(provider: &Provider, fields: &[(&str, &str)], files: Vec<UploadedFile>) -> Value {
    let mut form: FormFields = [
        (FORM_ACTION, "XD_Contact"),
        (FORM_METHOD, "update"),
        (FORM_TYPE, "rpc"),
        (FORM_UPLOAD, if files.is_empty() { "false" } else { "true" }),
        (FORM_TID, "3"),
    ]
    .into_iter()
    .collect();
    for (name, value) in fields {
        form.insert(*name, *value);
    }

    let upload = !files.is_empty();
    let reply = provider.route(InboundRequest::form(form, files)).await;
    let mut body = reply.body.as_str();
    if upload {
        body = body
            .strip_prefix("<html><body><textarea>")
            .and_then(|b| b.strip_suffix("</textarea></body></html>"))
            .unwrap();
    }
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn registration_publishes_three_methods() {
    let provider = Provider::new(ProviderConfig::default());
    let action = register_form(&provider, contact_form());
    assert_eq!(action, "XD_Contact");

    let descriptor = direct_server::descriptor::build_descriptor(provider.registry(), "/router");
    assert_eq!(descriptor.method("XD_Contact", "get").unwrap().len, 1);
    assert_eq!(descriptor.method("XD_Contact", "choices").unwrap().len, 2);
    let update = descriptor.method("XD_Contact", "update").unwrap();
    assert_eq!(update.len, 1);
    assert!(update.flags.is_form_handler());
}

#[tokio::test]
async fn get_new_record_returns_initial_values() {
    let provider = Provider::new(ProviderConfig::default());
    register_form(&provider, contact_form());

    let response = call(&provider, "get", json!([-1])).await;
    assert_eq!(response["result"]["success"], true);
    assert_eq!(response["result"]["data"]["role"], "user");
    assert!(response["result"]["data"]["name"].is_null());
}

#[tokio::test]
async fn get_existing_record() {
    let provider = Provider::new(ProviderConfig::default());
    let form = contact_form();
    let key = form.insert(record("Ada", 36));
    register_form(&provider, form);

    let response = call(&provider, "get", json!([key])).await;
    assert_eq!(response["result"], json!({
        "data": {"name": "Ada", "age": 36, "role": "user"},
        "success": true,
    }));
}

#[tokio::test]
async fn get_missing_record_is_an_exception() {
    let provider = Provider::new(ProviderConfig::default().debug());
    register_form(&provider, contact_form());

    let response = call(&provider, "get", json!([404])).await;
    assert_eq!(response["type"], "exception");
    assert_eq!(response["message"], "record 404 does not exist");
}

#[tokio::test]
async fn update_creates_a_record_from_form_fields() {
    let provider = Provider::new(ProviderConfig::default());
    let form = contact_form();
    register_form(&provider, form.clone());

    let response = submit(&provider, &[("pk", "-1"), ("name", "Grace"), ("age", "85")], Vec::new()).await;
    assert_eq!(response["tid"], "3");
    assert_eq!(response["result"], json!({"success": true}));

    assert_eq!(form.len(), 1);
    let saved = form.get(1).unwrap();
    assert_eq!(saved["name"], "Grace");
    assert_eq!(saved["age"], 85);
    assert_eq!(saved["role"], "user");
}

#[tokio::test]
async fn update_keeps_values_not_submitted() {
    let provider = Provider::new(ProviderConfig::default());
    let form = contact_form();
    let key = form.insert(record("Ada", 36));
    register_form(&provider, form.clone());

    let pk = key.to_string();
    let response = submit(&provider, &[("pk", &pk), ("age", "37")], Vec::new()).await;
    assert_eq!(response["result"]["success"], true);

    let saved = form.get(key).unwrap();
    assert_eq!(saved["name"], "Ada");
    assert_eq!(saved["age"], 37);
}

#[tokio::test]
async fn invalid_update_reports_joined_field_errors() {
    let provider = Provider::new(ProviderConfig::default());
    let form = contact_form();
    register_form(&provider, form.clone());

    let response = submit(&provider, &[("pk", "-1"), ("age", "old"), ("role", "root")], Vec::new()).await;
    let result = &response["result"];
    assert_eq!(result["success"], false);
    assert_eq!(result["errors"]["name"], "This field is required.");
    assert_eq!(result["errors"]["age"], "Enter a whole number.");
    assert_eq!(result["errors"]["role"], "Select a valid choice.");
    assert!(form.is_empty());
}

#[tokio::test]
async fn upload_update_stores_file_metadata() {
    let provider = Provider::new(ProviderConfig::default());
    let form = contact_form();
    register_form(&provider, form.clone());

    let avatar = UploadedFile {
        field: "avatar".into(),
        file_name: Some("ada.png".into()),
        content_type: Some("image/png".into()),
        data: vec![0u8; 16].into(),
    };
    let response = submit(&provider, &[("pk", "-1"), ("name", "Ada")], vec![avatar]).await;
    assert_eq!(response["result"]["success"], true);
    assert_eq!(form.get(1).unwrap()["avatar"], json!({"name": "ada.png", "size": 16}));
}

#[tokio::test]
async fn denied_access_is_a_regular_result() {
    let provider = Provider::new(ProviderConfig::default());
    let form = contact_form().with_authorizer(|ctx: &RequestContext, op: FormOperation| {
        op == FormOperation::Get || ctx.header("x-role") == Some("admin")
    });
    register_form(&provider, form.clone());

    let response = submit(&provider, &[("pk", "-1"), ("name", "Eve")], Vec::new()).await;
    assert_eq!(response["type"], "rpc");
    assert_eq!(response["result"], json!({"success": false, "errors": {"__all__": ACCESS_DENIED}}));
    assert!(form.is_empty());

    let response = call(&provider, "get", json!([-1])).await;
    assert_eq!(response["result"]["success"], true);
}

#[tokio::test]
async fn failed_pre_validation_blocks_the_save() {
    let provider = Provider::new(ProviderConfig::default());
    let form = contact_form().with_validator(|ctx: &RequestContext| ctx.field("confirm") == Some("yes"));
    register_form(&provider, form.clone());

    let response = submit(&provider, &[("pk", "-1"), ("name", "Ada")], Vec::new()).await;
    assert_eq!(response["result"]["errors"]["__all__"], PRE_VALIDATION_FAILED);
    assert!(form.is_empty());

    let response = submit(&provider, &[("pk", "-1"), ("name", "Ada"), ("confirm", "yes")], Vec::new()).await;
    assert_eq!(response["result"]["success"], true);
    assert_eq!(form.len(), 1);
}

#[tokio::test]
async fn choices_lists_key_label_pairs() {
    let provider = Provider::new(ProviderConfig::default());
    register_form(&provider, contact_form());

    let response = call(&provider, "choices", json!([-1, "role"])).await;
    assert_eq!(response["result"], json!({
        "success": true,
        "data": [["admin", "Administrator"], ["user", "User"]],
    }));

    let named = call(&provider, "choices", json!([{"pk": -1, "field": "role"}])).await;
    assert_eq!(named["result"], response["result"]);
}

#[tokio::test]
async fn choices_for_plain_field_is_an_exception() {
    let provider = Provider::new(ProviderConfig::default().debug());
    register_form(&provider, contact_form());

    let response = call(&provider, "choices", json!([-1, "name"])).await;
    assert_eq!(response["type"], "exception");
    assert_eq!(response["message"], "field 'name' has no choices");
}

#[tokio::test]
async fn update_over_json_takes_the_key_argument() {
    let provider = Provider::new(ProviderConfig::default());
    let form = contact_form();
    let key = form.insert(record("Ada", 36));
    register_form(&provider, form.clone());

    // No submitted fields: every value is kept from the instance.
    let response = call(&provider, "update", json!([key])).await;
    assert_eq!(response["result"]["success"], true);
    assert_eq!(form.get(key).unwrap()["name"], "Ada");
}
