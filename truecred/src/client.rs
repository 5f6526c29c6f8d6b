use std::sync::Arc;

use crate::config::TruecredConfig;
use crate::error::Result;
use crate::session::{AuthHttpClient, SessionManager, SessionStore, User};
use crate::wallet::{WalletProvider, WalletRequestGate};

/// Main truecred client: one wallet gate and one session manager sharing a
/// backend.
pub struct Truecred {
    pub config: TruecredConfig,
    /// HTTP client for the backend auth API.
    pub http_client: AuthHttpClient,
    /// Process-wide wallet gate.
    pub gate: Arc<WalletRequestGate>,
    /// Process-wide session owner.
    pub session: SessionManager,
}

impl Truecred {
    /// Wire the client together. `provider` is `None` when no wallet is injected.
    pub fn new(
        config: TruecredConfig,
        provider: Option<Arc<dyn WalletProvider>>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let http_client = AuthHttpClient::new(&config.api_base_url);
        let gate = Arc::new(WalletRequestGate::with_optional_provider(
            provider,
            config.gate,
        ));
        let session = SessionManager::new(Arc::new(http_client.clone()), store, config.session);

        Self {
            config,
            http_client,
            gate,
            session,
        }
    }

    /// Connect the wallet through the gate and authenticate with it.
    pub async fn connect_and_authenticate(&self) -> Result<User> {
        self.session.authenticate_with_wallet(&self.gate).await
    }

    /// Link the connected wallet to the logged-in account.
    pub async fn link_wallet(&self) -> Result<User> {
        let address = self.gate.connect().await?;
        self.session.connect_wallet(&address).await
    }
}
