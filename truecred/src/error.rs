use std::time::Duration;

use thiserror::Error;

/// Failure of a wallet-provider request, as seen by callers of the gate.
///
/// `Clone` because every caller joined onto one in-flight
/// `eth_requestAccounts` attempt receives its own copy of the outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("no wallet provider available")]
    NotInstalled,

    #[error("connection rejected: {0}")]
    Rejected(String),

    #[error("provider busy: {0}")]
    Busy(String),

    #[error("provider did not respond within {0:?}")]
    Timeout(Duration),

    #[error("provider not authorized: {0}")]
    Unauthorized(String),

    #[error("method not supported by provider: {0}")]
    Unsupported(String),

    #[error("provider disconnected: {0}")]
    Disconnected(String),

    #[error("provider error {code}: {message}")]
    Unknown { code: i64, message: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("wallet request aborted: {0}")]
    Aborted(String),
}

impl WalletError {
    /// User-facing text for a failed wallet connection.
    pub fn user_message(&self) -> &'static str {
        match self {
            WalletError::NotInstalled => "Please install or unlock a wallet to continue.",
            WalletError::Rejected(_) => "Wallet connection rejected.",
            WalletError::Timeout(_) | WalletError::Busy(_) => {
                "The wallet did not respond. Open it and try again."
            }
            WalletError::Unauthorized(_) => "The wallet has not authorized this site.",
            WalletError::Disconnected(_) => "The wallet is disconnected from the network.",
            _ => "Failed to connect wallet.",
        }
    }
}

#[derive(Error, Debug)]
pub enum TruecredError {
    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("token decode error: {0}")]
    TokenDecode(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("validation error: {0}")]
    Validation(String),
}

impl TruecredError {
    /// HTTP 401/403 from the backend.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, TruecredError::Http { status: 401 | 403, .. })
    }

    /// Connectivity failure: the request never produced an HTTP response.
    pub fn is_network_error(&self) -> bool {
        match self {
            TruecredError::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }

    /// Map to the short text shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            TruecredError::Wallet(e) => e.user_message().to_string(),
            e if e.is_auth_error() => "Your session has expired. Please log in again.".into(),
            e if e.is_network_error() => {
                "Unable to reach the server. Check your connection.".into()
            }
            TruecredError::Http { message, .. } if !message.is_empty() => message.clone(),
            TruecredError::NotAuthenticated => "Please log in to continue.".into(),
            TruecredError::Validation(msg) => msg.clone(),
            _ => "Something went wrong. Please try again.".into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TruecredError>;
