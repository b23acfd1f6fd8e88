//! Lexer for the descriptor script.
//!
//! The descriptor endpoint serves a small script made of statements shaped
//! `name = <json>;`. Clients do not run the script; they read the assignments
//! back with [`parse_assignments`]. Statements that are not a plain JSON
//! assignment (provider registration, request interceptors) are skipped.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::descriptor::ApiDescriptor;
use crate::error::DirectError;

/// Render one `name = <json>;` statement.
pub fn assignment(name: &str, value: &impl serde::Serialize) -> Result<String, DirectError> {
    Ok(format!("{name} = {};", serde_json::to_string(value)?))
}

/// Collect every `name = <json>;` assignment in `script`.
pub fn parse_assignments(script: &str) -> BTreeMap<String, Value> {
    let mut vars = BTreeMap::new();
    let mut rest = script;

    while let Some(pos) = rest.find(['=', ';']) {
        let (head, tail) = rest.split_at(pos);
        if tail.starts_with(';') {
            rest = &tail[1..];
            continue;
        }

        let name: String = head.chars().filter(|c| !c.is_whitespace()).collect();
        let value_text = &tail[1..];

        match parse_value(value_text) {
            Some((value, remaining)) if is_variable_name(&name) => {
                vars.insert(name, value);
                rest = remaining;
            }
            _ => rest = skip_statement(value_text),
        }
    }

    vars
}

/// Read the descriptor assigned to `name`.
pub fn parse_descriptor(script: &str, name: &str) -> Result<ApiDescriptor, DirectError> {
    let mut vars = parse_assignments(script);
    let value = vars
        .remove(name)
        .ok_or_else(|| DirectError::MissingDescriptor(name.to_string()))?;
    serde_json::from_value(value).map_err(|e| DirectError::InvalidDescriptor(e.to_string()))
}

/// Parse one JSON value followed by `;` (or end of input).
/// Returns the value and the text after the terminator.
fn parse_value(text: &str) -> Option<(Value, &str)> {
    let (slice, remaining) = match statement_end(text) {
        Some(pos) => (&text[..pos], &text[pos + 1..]),
        None => (text, ""),
    };
    let value = serde_json::from_str(slice.trim()).ok()?;
    Some((value, remaining))
}

/// Byte offset of the first `;` outside a JSON string literal.
fn statement_end(text: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;

    for (pos, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
        } else {
            match c {
                '"' => in_string = true,
                ';' => return Some(pos),
                _ => {}
            }
        }
    }
    None
}

fn skip_statement(text: &str) -> &str {
    match text.find(';') {
        Some(pos) => &text[pos + 1..],
        None => "",
    }
}

fn is_variable_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_multiple_assignments() {
        let vars = parse_assignments("a = 1;\nb = {\"x\": [1, 2]};");
        assert_eq!(vars["a"], json!(1));
        assert_eq!(vars["b"], json!({"x": [1, 2]}));
    }

    #[test]
    fn scalars_directly_before_semicolon() {
        let vars = parse_assignments("a = 1;b = 1.5;c = true;d = null;e = -3;f = false;");
        assert_eq!(vars.len(), 6);
        assert_eq!(vars["a"], json!(1));
        assert_eq!(vars["b"], json!(1.5));
        assert_eq!(vars["c"], json!(true));
        assert_eq!(vars["d"], Value::Null);
        assert_eq!(vars["e"], json!(-3));
        assert_eq!(vars["f"], json!(false));
    }

    #[test]
    fn semicolon_inside_string_is_not_a_terminator() {
        let vars = parse_assignments(r#"API = {"url": "/a;b"};"#);
        assert_eq!(vars["API"]["url"], "/a;b");

        let vars = parse_assignments(r#"s = "x\";y"; t = 2;"#);
        assert_eq!(vars["s"], "x\";y");
        assert_eq!(vars["t"], json!(2));
    }

    #[test]
    fn non_json_statements_are_skipped() {
        let script = concat!(
            "Ext.app.API = {\"url\": \"/r\"};\n",
            "Ext.Ajax.on(\"beforerequest\", function(conn, options){",
            "    if( !options.headers )",
            "        options.headers = {};",
            "    options.headers[\"X-CSRFToken\"] = Ext.util.Cookies.get(\"csrftoken\");",
            "});\n",
            "Ext.Direct.addProvider( Ext.app.API );",
        );
        let vars = parse_assignments(script);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars["Ext.app.API"]["url"], "/r");
    }

    #[test]
    fn trailing_assignment_without_semicolon() {
        let vars = parse_assignments("x = true");
        assert_eq!(vars["x"], json!(true));
    }

    #[test]
    fn missing_descriptor_is_reported() {
        let err = parse_descriptor("other = {};", "API").unwrap_err();
        assert!(matches!(err, DirectError::MissingDescriptor(name) if name == "API"));
    }
}
