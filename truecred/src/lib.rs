pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod utils;
pub mod wallet;

// ---- Top-level re-exports for ergonomic usage ----

// Client + config
pub use client::Truecred;
pub use config::{GateConfig, SessionConfig, TruecredConfig};
pub use error::{Result, TruecredError, WalletError};

// Wallet gate + provider surface
pub use wallet::{
    JsonRpcProvider, ProviderError, ProviderErrorKind, ProviderEvent, WalletProvider,
    WalletRequestGate,
};

// Session lifecycle
pub use session::{
    AuthBackend, AuthHttpClient, FileStore, MemoryStore, ProfileCheck, SessionManager,
    SessionState, SessionStore, SessionTokens, TokenClaims, User,
};
