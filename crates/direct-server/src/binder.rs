//! Reconciles positional and named argument passing.
//!
//! Callers send `data` either as a positional array (`[1, 2]`) or as a
//! single-element array wrapping an object keyed by parameter name
//! (`[{"a": 1, "b": 2}]`). Named binding only applies when every declared
//! parameter is present; otherwise the original `data` is used positionally.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Expected {expected}, got {actual}")]
pub struct ArityError {
    pub expected: usize,
    pub actual: usize,
}

/// Bind `data` against `params`, returning arguments in declaration order.
pub fn bind_arguments(data: Option<&Value>, params: &[String]) -> Result<Vec<Value>, ArityError> {
    let args = match data {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => match items.as_slice() {
            [Value::Object(named)] if !params.is_empty() => {
                bind_named(named, params).unwrap_or_else(|| items.clone())
            }
            _ => items.clone(),
        },
        Some(Value::Object(named)) if !params.is_empty() => {
            bind_named(named, params).unwrap_or_else(|| vec![Value::Object(named.clone())])
        }
        Some(other) => vec![other.clone()],
    };

    if args.len() != params.len() {
        return Err(ArityError {
            expected: params.len(),
            actual: args.len(),
        });
    }
    Ok(args)
}

fn bind_named(named: &Map<String, Value>, params: &[String]) -> Option<Vec<Value>> {
    params.iter().map(|name| named.get(name).cloned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn positional_arguments_pass_through() {
        let data = json!([1, "two"]);
        let args = bind_arguments(Some(&data), &params(&["a", "b"])).unwrap();
        assert_eq!(args, vec![json!(1), json!("two")]);
    }

    #[test]
    fn named_arguments_bind_like_positional() {
        let p = params(&["a", "b"]);
        let named = json!([{"b": 2, "a": 1}]);
        let positional = json!([1, 2]);
        assert_eq!(
            bind_arguments(Some(&named), &p).unwrap(),
            bind_arguments(Some(&positional), &p).unwrap()
        );
    }

    #[test]
    fn named_binding_ignores_extra_keys() {
        let data = json!([{"a": 1, "b": 2, "c": 3}]);
        let args = bind_arguments(Some(&data), &params(&["a", "b"])).unwrap();
        assert_eq!(args, vec![json!(1), json!(2)]);
    }

    #[test]
    fn missing_name_falls_back_to_positional() {
        // One object for a one-parameter method: passed through as the argument.
        let data = json!([{"x": 1}]);
        let args = bind_arguments(Some(&data), &params(&["record"])).unwrap();
        assert_eq!(args, vec![json!({"x": 1})]);

        // One object for a two-parameter method: arity mismatch.
        let err = bind_arguments(Some(&data), &params(&["a", "b"])).unwrap_err();
        assert_eq!(err, ArityError { expected: 2, actual: 1 });
    }

    #[test]
    fn null_data_is_zero_arguments() {
        assert!(bind_arguments(None, &[]).unwrap().is_empty());
        assert!(bind_arguments(Some(&Value::Null), &[]).unwrap().is_empty());
        let err = bind_arguments(None, &params(&["a"])).unwrap_err();
        assert_eq!(err.to_string(), "Expected 1, got 0");
    }

    #[test]
    fn object_for_zero_arity_method_is_an_argument() {
        let data = json!([{}]);
        let err = bind_arguments(Some(&data), &[]).unwrap_err();
        assert_eq!(err, ArityError { expected: 0, actual: 1 });
    }

    #[test]
    fn arity_message_names_both_counts() {
        let data = json!([1]);
        let err = bind_arguments(Some(&data), &params(&["a", "b"])).unwrap_err();
        assert_eq!(err.to_string(), "Expected 2, got 1");
    }

    #[test]
    fn bare_object_binds_by_name() {
        let data = json!({"a": 1, "b": 2});
        let args = bind_arguments(Some(&data), &params(&["a", "b"])).unwrap();
        assert_eq!(args, vec![json!(1), json!(2)]);
    }

    #[test]
    fn bare_scalar_is_one_argument() {
        let data = json!(42);
        let args = bind_arguments(Some(&data), &params(&["n"])).unwrap();
        assert_eq!(args, vec![json!(42)]);
    }
}
