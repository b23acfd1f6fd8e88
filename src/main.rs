//! extdirect: Ext.Direct RPC router
//!
//! Publishes a set of demo actions over HTTP: the descriptor script at
//! `<base>/api.js` and the router endpoint at `<base>/router`.
//!
//! Usage:
//!   extdirect                                 # Default port 7070, production mode
//!   extdirect --port 8080 --debug             # Report handler errors verbatim
//!   extdirect --base-path /ext --csrf         # Custom prefix, CSRF header snippet
//!   extdirect --log-file /tmp/direct.log      # Log to a file instead of stderr

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use direct_forms::{FieldSpec, MemoryModelForm, register_form};
use direct_protocol::{
    DEFAULT_REMOTE_NAME, FORM_ACTION, FORM_METHOD, FORM_TID, FORM_TYPE, FORM_UPLOAD, MethodFlags,
    RequestContext,
};
use direct_server::{CsrfConfig, DispatchMode, HandlerResult, Provider, ProviderConfig};
use direct_transport::{TransportConfig, TransportServer};
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[derive(Parser, Debug)]
#[command(name = "extdirect", about = "Ext.Direct RPC router")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "7070")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Path prefix of the descriptor and router endpoints
    #[arg(long, default_value = "/direct")]
    base_path: String,

    /// Global variable the descriptor is assigned to
    #[arg(long, default_value = DEFAULT_REMOTE_NAME)]
    remote_name: String,

    /// Do not append `Ext.Direct.addProvider(...)` to the descriptor script
    #[arg(long)]
    no_auto_add: bool,

    /// Emit a request interceptor copying the CSRF cookie into a header
    #[arg(long)]
    csrf: bool,

    /// Report handler failures verbatim instead of a generic message
    #[arg(long)]
    debug: bool,

    /// Largest router body accepted, in bytes
    #[arg(long, default_value = "10485760")]
    max_body_bytes: usize,

    /// Enable permissive CORS
    #[arg(long)]
    cors: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let writer = match &cli.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            eprintln!("Logging to {}", path.display());
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(cli.log_file.is_none());
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Demo actions
// ─────────────────────────────────────────────────────────────────────────────

async fn add(_ctx: Arc<RequestContext>, args: Vec<Value>) -> HandlerResult {
    let a = args[0].as_f64().context("a must be a number")?;
    let b = args[1].as_f64().context("b must be a number")?;
    Ok(json!(a + b))
}

async fn echo(_ctx: Arc<RequestContext>, mut args: Vec<Value>) -> HandlerResult {
    Ok(args.pop().unwrap_or(Value::Null))
}

async fn fail(_ctx: Arc<RequestContext>, args: Vec<Value>) -> HandlerResult {
    let reason = args[0].as_str().unwrap_or("no reason given");
    bail!("requested failure: {reason}")
}

async fn headers(ctx: Arc<RequestContext>, _args: Vec<Value>) -> HandlerResult {
    Ok(json!({
        "userAgent": ctx.header("user-agent"),
        "csrfToken": ctx.header("x-csrftoken"),
    }))
}

const CONTROL_FIELDS: [&str; 5] = [FORM_ACTION, FORM_METHOD, FORM_TYPE, FORM_UPLOAD, FORM_TID];

/// Form submit: echoes the submitted fields and attachment sizes.
async fn submit(ctx: Arc<RequestContext>, _args: Vec<Value>) -> HandlerResult {
    let fields: serde_json::Map<String, Value> = ctx
        .form()
        .iter()
        .filter(|(name, _)| !CONTROL_FIELDS.contains(name))
        .map(|(name, value)| (name.to_string(), json!(value)))
        .collect();
    let files: Vec<Value> = ctx
        .files()
        .iter()
        .map(|f| json!({ "field": f.field, "name": f.file_name, "size": f.data.len() }))
        .collect();
    Ok(json!({ "success": true, "fields": fields, "files": files }))
}

fn register_demo_actions(provider: &Provider) {
    provider.register("Calc", "add", ["a", "b"], MethodFlags::new(), add);
    provider.register("Calc", "echo", ["value"], MethodFlags::new(), echo);
    provider.register("Calc", "fail", ["reason"], MethodFlags::new(), fail);
    provider.register("Calc", "headers", Vec::<String>::new(), MethodFlags::new(), headers);
    provider.register("Profile", "submit", Vec::<String>::new(), MethodFlags::form_handler(), submit);

    let contacts = MemoryModelForm::new(
        "Contact",
        [
            FieldSpec::text("name").required(),
            FieldSpec::text("email"),
            FieldSpec::integer("age"),
            FieldSpec::choice("role", [("admin", "Administrator"), ("user", "User")]).initial("user"),
            FieldSpec::boolean("subscribed"),
            FieldSpec::file("avatar"),
        ],
    );
    let mut sample = serde_json::Map::new();
    sample.insert("name".into(), json!("Ada Lovelace"));
    sample.insert("email".into(), json!("ada@example.org"));
    sample.insert("role".into(), json!("admin"));
    contacts.insert(sample);
    register_form(provider, contacts);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    if cli.max_body_bytes == 0 {
        bail!("--max-body-bytes must be positive");
    }

    let provider_config = ProviderConfig {
        remote_name: cli.remote_name.clone(),
        auto_add_provider: !cli.no_auto_add,
        csrf: cli.csrf.then(CsrfConfig::default),
        mode: if cli.debug {
            DispatchMode::Debug
        } else {
            DispatchMode::Production
        },
    };
    let provider = Provider::new(provider_config);
    register_demo_actions(&provider);

    let transport_config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        base_path: cli.base_path.clone(),
        max_body_bytes: cli.max_body_bytes,
        enable_cors: cli.cors,
    };

    let actions = provider.registry().list_actions();
    let mut transport = TransportServer::start(transport_config, provider)
        .await
        .context("starting transport")?;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                    Ext.Direct Router                         ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("  Descriptor: {}", transport.api_url());
    println!("  Router:     {}", transport.router_url());
    println!("  Variable:   {}", cli.remote_name);
    println!("  Mode:       {}", if cli.debug { "debug" } else { "production" });
    println!();
    println!("  Actions:");
    for (action, methods) in &actions {
        let names: Vec<&str> = methods.iter().map(|m| m.name.as_str()).collect();
        println!("    {action:<14} {}", names.join(", "));
    }
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;

    info!("Shutdown requested");
    println!("  Shutting down...");
    transport.stop().await;
    println!("  Server stopped.");
    Ok(())
}
