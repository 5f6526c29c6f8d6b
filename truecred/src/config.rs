use std::time::Duration;

/// Configuration for the truecred client.
#[derive(Debug, Clone)]
pub struct TruecredConfig {
    /// Base URL for the backend API (e.g. `http://localhost:5000`).
    pub api_base_url: String,
    /// Wallet request gate tuning.
    pub gate: GateConfig,
    /// Session lifecycle tuning.
    pub session: SessionConfig,
}

impl Default for TruecredConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000".into(),
            gate: GateConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Bounds for serialized `eth_requestAccounts` attempts.
#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    /// Total time budget for one attempt, retries included.
    pub timeout: Duration,
    /// Delay between retries while the provider reports busy.
    pub poll_interval: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Lead time before access-token expiry at which the refresh fires.
    pub refresh_margin: Duration,
    /// Minimum interval between two non-forced profile fetches.
    pub profile_debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::from_secs(5 * 60),
            profile_debounce: Duration::from_secs(10),
        }
    }
}
