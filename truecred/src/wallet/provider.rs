//! Capability surface of an injected wallet provider.
//!
//! Vendor errors arrive as `{code, message}` pairs and are mapped into
//! [`ProviderErrorKind`] here, at the boundary, so the gate only ever
//! branches on categories.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::WalletError;

/// Method that prompts the user to connect accounts. Only this one is serialized.
pub const REQUEST_ACCOUNTS: &str = "eth_requestAccounts";

/// Method that lists already-authorized accounts without prompting.
pub const ACCOUNTS: &str = "eth_accounts";

/// Boxed future returned by [`WalletProvider::request`].
pub type ProviderFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Value, ProviderError>> + Send + 'a>>;

/// An injected wallet provider (EIP-1193 style).
pub trait WalletProvider: Send + Sync {
    /// Issue a provider request.
    fn request(&self, method: &str, params: Value) -> ProviderFuture<'_>;

    /// Whether the provider can currently accept requests at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Subscribe to provider-side events, if the provider emits any.
    fn events(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        None
    }
}

/// Events pushed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(String),
    Disconnect(String),
}

/// Raw error reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    /// Vendor error code. `None` when the request never reached the provider.
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Provider-error categories the gate and its callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// A request of the same kind is already pending; retryable.
    Busy,
    UserRejected,
    Unauthorized,
    Unsupported,
    Disconnected,
    /// Anything not mapped above. Never retried.
    Unknown,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
            data: None,
        }
    }

    /// Failure to reach the provider at all (transport, closed channel).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            data: None,
        }
    }

    pub fn kind(&self) -> ProviderErrorKind {
        match self.code {
            None => ProviderErrorKind::Disconnected,
            Some(-32002) => ProviderErrorKind::Busy,
            Some(4001) => ProviderErrorKind::UserRejected,
            Some(4100) => ProviderErrorKind::Unauthorized,
            Some(4200) | Some(-32601) => ProviderErrorKind::Unsupported,
            Some(4900) | Some(4901) => ProviderErrorKind::Disconnected,
            Some(_) if is_busy_message(&self.message) => ProviderErrorKind::Busy,
            Some(_) => ProviderErrorKind::Unknown,
        }
    }
}

// Older MetaMask builds report the pending-request condition under a generic
// code with one of these phrases.
fn is_busy_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("already processing") || lower.contains("already pending")
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for WalletError {
    fn from(err: ProviderError) -> Self {
        match err.kind() {
            ProviderErrorKind::Busy => WalletError::Busy(err.message),
            ProviderErrorKind::UserRejected => WalletError::Rejected(err.message),
            ProviderErrorKind::Unauthorized => WalletError::Unauthorized(err.message),
            ProviderErrorKind::Unsupported => WalletError::Unsupported(err.message),
            ProviderErrorKind::Disconnected => WalletError::Disconnected(err.message),
            ProviderErrorKind::Unknown => WalletError::Unknown {
                code: err.code.unwrap_or_default(),
                message: err.message,
            },
        }
    }
}
