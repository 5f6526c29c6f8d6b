pub mod api;
pub mod manager;
pub mod scheduler;
pub mod store;
pub mod tokens;
pub mod types;

pub use api::{AuthBackend, AuthHttpClient, BackendFuture};
pub use manager::{SessionManager, WalletSubscription};
pub use scheduler::{RefreshSchedule, ScheduleState};
pub use store::{FileStore, MemoryStore, SessionStore};
pub use tokens::{decode_claims, SessionTokens, TokenClaims};
pub use types::{
    AuthResponse, LoginRequest, ProfileCheck, RefreshResponse, RegisterRequest, SessionState,
    User, WalletAuthRequest,
};
