//! The transport-neutral view of an inbound HTTP request.
//!
//! The transport buffers the body and, for form-encoded or multipart bodies,
//! extracts the fields and attachments into an [`InboundRequest`]. The router
//! turns that into a [`RequestContext`], which every handler receives as its
//! implicit first argument.

use std::collections::BTreeMap;

use bytes::Bytes;

/// Content type of JSON router replies.
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Content type of upload replies (JSON wrapped in a `<textarea>`).
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
/// Content type of the descriptor script.
pub const SCRIPT_CONTENT_TYPE: &str = "text/javascript; charset=utf-8";

/// Submitted form fields. Repeated names keep the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(BTreeMap<String, String>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Self::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// A file attached to a multipart form submit.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    /// Form field the file was submitted under
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// A buffered inbound router request.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Header names are lower-case
    pub headers: BTreeMap<String, String>,
    /// Fields of a form-encoded or multipart body; `None` for other bodies
    pub form: Option<FormFields>,
    pub files: Vec<UploadedFile>,
    /// The raw body, kept so a JSON parse can follow a failed form read
    pub body: Bytes,
}

impl InboundRequest {
    /// A request carrying a raw (JSON) body.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// A request carrying form fields and optional attachments.
    pub fn form(fields: FormFields, files: Vec<UploadedFile>) -> Self {
        Self {
            form: Some(fields),
            files,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }
}

/// Per-request state handed to every handler.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: BTreeMap<String, String>,
    form: FormFields,
    files: Vec<UploadedFile>,
    upload: bool,
}

impl RequestContext {
    pub fn new(
        headers: BTreeMap<String, String>,
        form: FormFields,
        files: Vec<UploadedFile>,
        upload: bool,
    ) -> Self {
        Self {
            headers,
            form,
            files,
            upload,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn form(&self) -> &FormFields {
        &self.form
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.form.get(name)
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    /// Whether this request is a form submit with `extUpload == "true"`.
    pub fn is_upload(&self) -> bool {
        self.upload
    }
}

/// The router's serialized answer, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterReply {
    pub content_type: &'static str,
    pub body: String,
}

impl RouterReply {
    pub fn json(body: String) -> Self {
        Self {
            content_type: JSON_CONTENT_TYPE,
            body,
        }
    }

    pub fn html(body: String) -> Self {
        Self {
            content_type: HTML_CONTENT_TYPE,
            body,
        }
    }
}
