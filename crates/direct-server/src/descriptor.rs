//! API descriptor builder.
//!
//! The descriptor is rebuilt from the registry on every fetch; nothing is
//! cached. The script is a sequence of statements where the first one assigns
//! the descriptor JSON to the configured global name.

use direct_protocol::script::assignment;
use direct_protocol::{ApiDescriptor, DirectError};

use crate::config::{CsrfConfig, ProviderConfig};
use crate::registry::MethodRegistry;

/// Snapshot the registry as a descriptor pointing at `router_url`.
pub fn build_descriptor(registry: &MethodRegistry, router_url: &str) -> ApiDescriptor {
    let mut descriptor = ApiDescriptor::new(router_url);
    descriptor.actions = registry.list_actions().into_iter().collect();
    descriptor
}

/// Render the descriptor script served by the `api.js` endpoint.
pub fn render_api_script(
    registry: &MethodRegistry,
    router_url: &str,
    config: &ProviderConfig,
) -> Result<String, DirectError> {
    let descriptor = build_descriptor(registry, router_url);
    let mut lines = vec![assignment(&config.remote_name, &descriptor)?];

    if let Some(csrf) = &config.csrf {
        lines.push(csrf_interceptor(csrf)?);
    }
    if config.auto_add_provider {
        lines.push(format!("Ext.Direct.addProvider( {} );", config.remote_name));
    }

    Ok(lines.join("\n"))
}

fn csrf_interceptor(csrf: &CsrfConfig) -> Result<String, DirectError> {
    let header = serde_json::to_string(&csrf.header)?;
    let cookie = serde_json::to_string(&csrf.cookie)?;
    Ok(format!(
        "Ext.Ajax.on(\"beforerequest\", function(conn, options){{\n\
         \x20   if( !options.headers )\n\
         \x20       options.headers = {{}};\n\
         \x20   options.headers[{header}] = Ext.util.Cookies.get({cookie});\n\
         }});"
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use direct_protocol::script::{parse_assignments, parse_descriptor};
    use direct_protocol::{MethodFlags, RequestContext};
    use serde_json::{Value, json};

    use crate::registry::HandlerResult;

    async fn noop(_ctx: Arc<RequestContext>, _args: Vec<Value>) -> HandlerResult {
        Ok(Value::Null)
    }

    fn registry() -> MethodRegistry {
        let registry = MethodRegistry::new();
        registry.register("Calc", "add", ["a", "b"], MethodFlags::new(), noop);
        registry.register("Calc", "neg", ["a"], MethodFlags::new(), noop);
        registry.register("XD_Contact", "update", ["pk"], MethodFlags::form_handler(), noop);
        registry
    }

    #[test]
    fn descriptor_lists_len_per_method() {
        let descriptor = build_descriptor(&registry(), "/direct/router");
        assert_eq!(descriptor.url, "/direct/router");
        assert_eq!(descriptor.kind, "remoting");
        assert_eq!(descriptor.method("Calc", "add").unwrap().len, 2);
        assert_eq!(descriptor.method("Calc", "neg").unwrap().len, 1);
        assert!(descriptor.method("XD_Contact", "update").unwrap().flags.is_form_handler());
    }

    #[test]
    fn script_starts_with_assignment_and_registers_provider() {
        let config = ProviderConfig::default();
        let script = render_api_script(&registry(), "/direct/router", &config).unwrap();
        let lines: Vec<_> = script.lines().collect();
        assert!(lines[0].starts_with("Ext.app.REMOTING_API = {"));
        assert_eq!(lines.last().copied(), Some("Ext.Direct.addProvider( Ext.app.REMOTING_API );"));
    }

    #[test]
    fn script_without_auto_add_is_a_single_statement() {
        let config = ProviderConfig {
            remote_name: "API".into(),
            auto_add_provider: false,
            ..ProviderConfig::default()
        };
        let script = render_api_script(&registry(), "/r", &config).unwrap();
        assert_eq!(script.lines().count(), 1);
        assert_eq!(parse_assignments(&script)["API"]["url"], json!("/r"));
    }

    #[test]
    fn csrf_interceptor_precedes_provider_registration() {
        let config = ProviderConfig {
            csrf: Some(CsrfConfig::default()),
            ..ProviderConfig::default()
        };
        let script = render_api_script(&registry(), "/r", &config).unwrap();
        let csrf_at = script.find("X-CSRFToken").unwrap();
        let add_at = script.find("Ext.Direct.addProvider").unwrap();
        assert!(csrf_at < add_at);
        assert!(script.contains("Ext.util.Cookies.get(\"csrftoken\")"));

        // The lexer still recovers the descriptor.
        let parsed = parse_descriptor(&script, &config.remote_name).unwrap();
        assert_eq!(parsed, build_descriptor(&registry(), "/r"));
    }

    #[test]
    fn repeated_fetches_are_identical() {
        let registry = registry();
        let config = ProviderConfig::default();
        let first = render_api_script(&registry, "/r", &config).unwrap();
        let second = render_api_script(&registry, "/r", &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn descriptor_reflects_later_registrations() {
        let registry = registry();
        assert!(build_descriptor(&registry, "/r").method("Calc", "mul").is_none());
        registry.register("Calc", "mul", ["a", "b"], MethodFlags::new(), noop);
        assert_eq!(build_descriptor(&registry, "/r").method("Calc", "mul").unwrap().len, 2);
    }
}
