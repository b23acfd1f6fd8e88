//! HTTP transport server using Axum.
//!
//! Serves the descriptor script and the router endpoint. Router bodies are
//! buffered in full before dispatch so the handler can try the form-field
//! read and still fall back to parsing the raw body as JSON.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{
        FromRequest, Request, State,
        multipart::{Multipart, MultipartError, MultipartRejection},
    },
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use direct_protocol::{
    DirectError, FormFields, InboundRequest, RouterReply, UploadedFile,
    context::SCRIPT_CONTENT_TYPE,
};
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

/// Trait implemented by the provider to answer transport requests.
pub trait RequestHandler: Send + Sync + 'static {
    /// Render the descriptor script for a router mounted at `router_url`.
    fn api_script(&self, router_url: &str) -> Result<String, DirectError>;

    /// Route one buffered router request.
    fn handle_request(
        &self,
        request: InboundRequest,
    ) -> impl std::future::Future<Output = RouterReply> + Send;

    /// Number of registered actions (reported by the health check).
    fn action_count(&self) -> usize;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid listen address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("multipart body rejected: {0}")]
    MultipartRejected(#[from] MultipartRejection),

    #[error("multipart body unreadable: {0}")]
    Multipart(#[from] MultipartError),

    #[error("HTTP error: {0}")]
    Http(#[from] axum::http::Error),
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Path prefix of the descriptor and router endpoints
    pub base_path: String,
    /// Largest router body that is buffered
    pub max_body_bytes: usize,
    /// Enable permissive CORS
    pub enable_cors: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 7070,
            hostname: "127.0.0.1".into(),
            base_path: "/direct".into(),
            max_body_bytes: 10 * 1024 * 1024,
            enable_cors: false,
        }
    }
}

impl TransportConfig {
    /// Normalized prefix: leading slash, no trailing slash, empty for root.
    fn prefix(&self) -> String {
        let trimmed = self.base_path.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }

    pub fn api_path(&self) -> String {
        format!("{}/api.js", self.prefix())
    }

    pub fn router_path(&self) -> String {
        format!("{}/router", self.prefix())
    }
}

/// Shared state for the transport server.
struct AppState<H: RequestHandler> {
    handler: Arc<H>,
    config: TransportConfig,
}

/// The transport server. Owns the listener task.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound address
    addr: SocketAddr,
    config: TransportConfig,
}

impl TransportServer {
    /// Start the transport server with the given request handler.
    pub async fn start<H: RequestHandler>(
        config: TransportConfig,
        handler: H,
    ) -> Result<Self, TransportError> {
        Self::start_shared(config, Arc::new(handler)).await
    }

    /// Start the transport server with a handler that is shared elsewhere.
    pub async fn start_shared<H: RequestHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, TransportError> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let state = Arc::new(AppState {
            handler,
            config: config.clone(),
        });

        let router_path = config.router_path();
        let mut app = Router::new()
            .route(&config.api_path(), get(api_handler::<H>))
            .route(&router_path, post(router_handler::<H>))
            .route(&format!("{router_path}/"), post(router_handler::<H>))
            .route("/health", get(health_handler::<H>))
            .with_state(state)
            .layer(TraceLayer::new_for_http());
        if config.enable_cors {
            app = app.layer(CorsLayer::permissive());
        }

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        info!("Ext.Direct descriptor at http://{addr}{}", config.api_path());
        info!("Ext.Direct router at http://{addr}{router_path}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
            {
                error!("HTTP server terminated: {e}");
            }
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            addr,
            config,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Absolute URL of the descriptor script.
    pub fn api_url(&self) -> String {
        format!("http://{}{}", self.addr, self.config.api_path())
    }

    /// Absolute URL of the router endpoint.
    pub fn router_url(&self) -> String {
        format!("http://{}{}", self.addr, self.config.router_path())
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Ext.Direct transport stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn api_handler<H: RequestHandler>(State(state): State<Arc<AppState<H>>>) -> Response {
    match state.handler.api_script(&state.config.router_path()) {
        Ok(script) => ([(header::CONTENT_TYPE, SCRIPT_CONTENT_TYPE)], script).into_response(),
        Err(e) => {
            error!("Failed to render descriptor: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn router_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.config.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to buffer router body: {e}");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large or unreadable")
                .into_response();
        }
    };

    let inbound = build_inbound(&parts.headers, body).await;
    let reply = state.handler.handle_request(inbound).await;
    ([(header::CONTENT_TYPE, reply.content_type)], reply.body).into_response()
}

async fn health_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "actions": state.handler.action_count(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Buffer headers and, for form bodies, the submitted fields and files.
async fn build_inbound(headers: &HeaderMap, body: Bytes) -> InboundRequest {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();
    let content_type = headers
        .get("content-type")
        .cloned()
        .unwrap_or_default();

    let mut inbound = InboundRequest {
        headers,
        form: None,
        files: Vec::new(),
        body,
    };

    let media_type = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match media_type.as_str() {
        "application/x-www-form-urlencoded" => {
            inbound.form = Some(url::form_urlencoded::parse(&inbound.body).into_owned().collect());
        }
        "multipart/form-data" => match read_multipart(&content_type, inbound.body.clone()).await {
            Ok((fields, files)) => {
                inbound.form = Some(fields);
                inbound.files = files;
            }
            Err(e) => warn!("Ignoring unreadable multipart body: {e}"),
        },
        _ => {}
    }

    inbound
}

async fn read_multipart(
    content_type: &str,
    body: Bytes,
) -> Result<(FormFields, Vec<UploadedFile>), TransportError> {
    let request = axum::http::Request::builder()
        .method(Method::POST)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))?;
    let mut multipart = Multipart::from_request(request, &()).await?;

    let mut fields = FormFields::new();
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;

        if file_name.is_some() {
            files.push(UploadedFile {
                field: name,
                file_name,
                content_type,
                data,
            });
        } else {
            fields.insert(name, String::from_utf8_lossy(&data).into_owned());
        }
    }

    Ok((fields, files))
}
