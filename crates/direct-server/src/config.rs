//! Provider configuration.

use direct_protocol::DEFAULT_REMOTE_NAME;

/// Message substituted for handler failures in production mode.
pub const GENERIC_FAILURE_MESSAGE: &str = "An internal error occurred while processing the call.";

/// How much of a handler failure is reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Real error text in `message`, full diagnostic in `where`.
    Debug,
    /// Fixed generic `message`, empty `where`.
    #[default]
    Production,
}

/// Cookie-to-header copy emitted into the descriptor script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfConfig {
    /// Request header the token is written to
    pub header: String,
    /// Cookie the token is read from
    pub cookie: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            header: "X-CSRFToken".into(),
            cookie: "csrftoken".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Global variable the descriptor is assigned to
    pub remote_name: String,
    /// Append `Ext.Direct.addProvider(<remote_name>)` to the descriptor script
    pub auto_add_provider: bool,
    /// Emit a request interceptor attaching the CSRF token
    pub csrf: Option<CsrfConfig>,
    pub mode: DispatchMode,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            remote_name: DEFAULT_REMOTE_NAME.into(),
            auto_add_provider: true,
            csrf: None,
            mode: DispatchMode::Production,
        }
    }
}

impl ProviderConfig {
    pub fn debug(mut self) -> Self {
        self.mode = DispatchMode::Debug;
        self
    }
}
