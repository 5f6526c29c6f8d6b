//! Single-flight gate in front of the wallet provider.
//!
//! The provider tolerates one outstanding `eth_requestAccounts` call. Every
//! caller that arrives while an attempt is pending joins it and observes the
//! same outcome. The attempt itself runs as a spawned task, so it completes
//! (and clears the in-flight slot) even if every waiting caller goes away.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::config::GateConfig;
use crate::error::WalletError;
use crate::utils::{mask_address, normalize_address};

use super::provider::{
    ProviderErrorKind, ProviderEvent, WalletProvider, ACCOUNTS, REQUEST_ACCOUNTS,
};

type SharedOutcome = Shared<BoxFuture<'static, Result<Value, WalletError>>>;

/// A pending `eth_requestAccounts` call.
struct WalletRequest {
    id: u64,
    started_at: Instant,
    outcome: SharedOutcome,
}

type Slot = Arc<Mutex<Option<WalletRequest>>>;

pub struct WalletRequestGate {
    provider: Option<Arc<dyn WalletProvider>>,
    config: GateConfig,
    in_flight: Slot,
    next_id: AtomicU64,
}

impl WalletRequestGate {
    pub fn new(provider: Arc<dyn WalletProvider>, config: GateConfig) -> Self {
        Self::with_optional_provider(Some(provider), config)
    }

    /// Build a gate for an environment where a provider may not be injected.
    pub fn with_optional_provider(
        provider: Option<Arc<dyn WalletProvider>>,
        config: GateConfig,
    ) -> Self {
        Self {
            provider,
            config,
            in_flight: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Whether an `eth_requestAccounts` attempt is currently outstanding.
    pub fn in_flight(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    /// Issue a provider request.
    ///
    /// `eth_requestAccounts` is serialized and retried while the provider is
    /// busy; every other method passes straight through.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let provider = self.provider()?;

        if method != REQUEST_ACCOUNTS {
            return provider
                .request(method, params)
                .await
                .map_err(WalletError::from);
        }

        self.join_or_start(provider, params).await
    }

    /// Prompt for account access and return the first account, normalized.
    pub async fn connect(&self) -> Result<String, WalletError> {
        let value = self
            .request(REQUEST_ACCOUNTS, Value::Array(Vec::new()))
            .await?;
        let address = first_account(value)?;
        info!(wallet = %mask_address(&address), "wallet connected");
        Ok(address)
    }

    /// Accounts the provider has already authorized. Never prompts.
    pub async fn accounts(&self) -> Result<Vec<String>, WalletError> {
        let value = self.request(ACCOUNTS, Value::Array(Vec::new())).await?;
        parse_accounts(value)
    }

    /// Subscribe to provider events. `None` if there is no provider or it
    /// emits no events.
    pub fn events(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        self.provider.as_ref().and_then(|p| p.events())
    }

    fn provider(&self) -> Result<Arc<dyn WalletProvider>, WalletError> {
        match &self.provider {
            Some(p) if p.is_available() => Ok(Arc::clone(p)),
            _ => Err(WalletError::NotInstalled),
        }
    }

    fn join_or_start(&self, provider: Arc<dyn WalletProvider>, params: Value) -> SharedOutcome {
        let mut slot = lock(&self.in_flight);

        if let Some(pending) = slot.as_ref() {
            debug!(
                attempt = pending.id,
                waited_ms = pending.started_at.elapsed().as_millis() as u64,
                "joining in-flight eth_requestAccounts"
            );
            return pending.outcome.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let started_at = Instant::now();
        let config = self.config;
        let release = Arc::clone(&self.in_flight);

        // The slot stays locked until the new entry is stored, so the task
        // cannot clear it before it exists.
        let handle = tokio::spawn(async move {
            let outcome = run_attempt(provider.as_ref(), params, started_at, config).await;
            let mut slot = lock(&release);
            if slot.as_ref().is_some_and(|p| p.id == id) {
                *slot = None;
            }
            outcome
        });

        let outcome = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(WalletError::Aborted(e.to_string())))
        }
        .boxed()
        .shared();

        debug!(attempt = id, "starting eth_requestAccounts attempt");
        *slot = Some(WalletRequest {
            id,
            started_at,
            outcome: outcome.clone(),
        });
        outcome
    }
}

/// Retry loop for one attempt, bounded by `config.timeout` from `started_at`.
async fn run_attempt(
    provider: &dyn WalletProvider,
    params: Value,
    started_at: Instant,
    config: GateConfig,
) -> Result<Value, WalletError> {
    let deadline = started_at + config.timeout;
    let mut calls = 0u32;

    loop {
        calls += 1;
        let call = provider.request(REQUEST_ACCOUNTS, params.clone());

        let err = match time::timeout_at(deadline, call).await {
            Ok(Ok(value)) => {
                debug!(calls, elapsed_ms = elapsed_ms(started_at), "eth_requestAccounts resolved");
                return Ok(value);
            }
            Ok(Err(err)) => err,
            Err(_) => {
                warn!(calls, "provider never answered eth_requestAccounts");
                return Err(WalletError::Timeout(config.timeout));
            }
        };

        if err.kind() != ProviderErrorKind::Busy {
            debug!(calls, error = %err, "eth_requestAccounts failed");
            return Err(err.into());
        }

        if Instant::now() + config.poll_interval >= deadline {
            warn!(
                calls,
                elapsed_ms = elapsed_ms(started_at),
                "provider stayed busy for the whole budget"
            );
            return Err(WalletError::Timeout(config.timeout));
        }

        debug!(calls, "provider busy, retrying");
        time::sleep(config.poll_interval).await;
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

fn lock(slot: &Slot) -> MutexGuard<'_, Option<WalletRequest>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn parse_accounts(value: Value) -> Result<Vec<String>, WalletError> {
    serde_json::from_value(value)
        .map_err(|e| WalletError::InvalidResponse(format!("expected account list: {e}")))
}

fn first_account(value: Value) -> Result<String, WalletError> {
    let accounts = parse_accounts(value)?;
    let first = accounts
        .first()
        .ok_or_else(|| WalletError::InvalidResponse("provider returned no accounts".into()))?;
    normalize_address(first).map_err(|e| WalletError::InvalidResponse(e.to_string()))
}
