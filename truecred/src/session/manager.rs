//! Session lifecycle: token pair ownership, proactive refresh, and a
//! deduplicated profile query.
//!
//! All mutation of the token pair and of the stored session keys goes
//! through [`SessionManager`], under the data lock so memory, storage and
//! the published state move together. The lock is never held across an
//! await.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, TruecredError};
use crate::utils::{mask_address, normalize_address};
use crate::wallet::{ProviderEvent, WalletRequestGate};

use super::api::AuthBackend;
use super::scheduler::{RefreshSchedule, ScheduleState};
use super::store::{self, SessionStore, WALLET_ADDRESS_KEY};
use super::tokens::{decode_claims, refresh_delay, unix_now, SessionTokens, TokenClaims};
use super::types::*;

#[derive(Debug, Default)]
struct ProfileFetchState {
    in_flight: bool,
    last_checked_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct SessionData {
    /// Bumped whenever a session is established or cleared. Refresh keeps it.
    epoch: u64,
    tokens: Option<SessionTokens>,
    user: Option<User>,
    schedule: RefreshSchedule,
    profile: ProfileFetchState,
}

struct Inner {
    backend: Arc<dyn AuthBackend>,
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
    data: Mutex<SessionData>,
    state_tx: watch::Sender<SessionState>,
}

impl Inner {
    fn data(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owner of the authenticated session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        store: Arc<dyn SessionStore>,
        config: SessionConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            inner: Arc::new(Inner {
                backend,
                store,
                config,
                data: Mutex::new(SessionData::default()),
                state_tx,
            }),
        }
    }

    // --- Queries ---

    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    /// Receive every session state transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.data().user.clone()
    }

    pub fn tokens(&self) -> Option<SessionTokens> {
        self.inner.data().tokens.clone()
    }

    /// Bearer for other API callers.
    pub fn access_token(&self) -> Option<String> {
        self.inner
            .data()
            .tokens
            .as_ref()
            .map(|t| t.access_token.clone())
    }

    pub fn wallet_address(&self) -> Option<String> {
        self.inner.store.get(WALLET_ADDRESS_KEY)
    }

    pub fn refresh_schedule(&self) -> ScheduleState {
        self.inner.data().schedule.state()
    }

    /// Armed refresh timers; never more than one.
    pub fn pending_refreshes(&self) -> usize {
        self.inner.data().schedule.pending()
    }

    // --- Authentication ---

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let req = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let resp = self.inner.backend.login(&req).await.inspect_err(|e| {
            warn!(error = %e, "login failed");
        })?;
        self.establish(resp, None)
    }

    pub async fn register(&self, req: &RegisterRequest) -> Result<User> {
        let req = RegisterRequest {
            wallet_address: req
                .wallet_address
                .as_deref()
                .map(normalize_address)
                .transpose()?,
            ..req.clone()
        };
        let resp = self.inner.backend.register(&req).await.inspect_err(|e| {
            warn!(error = %e, "registration failed");
        })?;
        self.establish(resp, req.wallet_address.as_deref())
    }

    /// Log in (or sign up) with a wallet address the user already controls.
    pub async fn wallet_auth(&self, wallet_address: &str) -> Result<User> {
        let wallet_address = normalize_address(wallet_address)?;
        let req = WalletAuthRequest {
            wallet_address: wallet_address.clone(),
        };
        let resp = self.inner.backend.wallet_auth(&req).await.inspect_err(|e| {
            warn!(wallet = %mask_address(&wallet_address), error = %e, "wallet auth failed");
        })?;
        self.establish(resp, Some(&wallet_address))
    }

    /// Connect through the gate, then authenticate with the returned account.
    pub async fn authenticate_with_wallet(&self, gate: &WalletRequestGate) -> Result<User> {
        let address = gate.connect().await?;
        self.wallet_auth(&address).await
    }

    /// Link a wallet to the logged-in account.
    pub async fn connect_wallet(&self, wallet_address: &str) -> Result<User> {
        let wallet_address = normalize_address(wallet_address)?;
        let (epoch, access_token) = {
            let data = self.inner.data();
            let tokens = data.tokens.as_ref().ok_or(TruecredError::NotAuthenticated)?;
            (data.epoch, tokens.access_token.clone())
        };

        match self
            .inner
            .backend
            .connect_wallet(&access_token, &wallet_address)
            .await
        {
            Ok(mut user) => {
                if user.wallet_address.is_none() {
                    user.wallet_address = Some(wallet_address.clone());
                }
                let mut data = self.inner.data();
                if data.epoch != epoch {
                    debug!("wallet link result discarded, session changed meanwhile");
                    return Err(TruecredError::NotAuthenticated);
                }
                store::write_user(self.inner.store.as_ref(), &user)?;
                self.inner.store.set(WALLET_ADDRESS_KEY, &wallet_address)?;
                data.user = Some(user.clone());
                drop(data);
                info!(wallet = %mask_address(&wallet_address), "wallet linked to account");
                Ok(user)
            }
            Err(e) if e.is_auth_error() => {
                warn!(error = %e, "wallet link rejected, session no longer valid");
                self.clear_session_if(epoch);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Rehydrate from storage at startup.
    ///
    /// A still-valid access token re-arms the refresh timer; an expired one
    /// is exchanged immediately.
    pub async fn restore(&self) -> Result<SessionState> {
        let store = self.inner.store.as_ref();
        let Some(tokens) = store::read_tokens(store) else {
            debug!("no stored session");
            self.set_state(SessionState::Unauthenticated);
            return Ok(SessionState::Unauthenticated);
        };
        let user = store::read_user(store);
        let claims = decode_claims(&tokens.access_token);

        let needs_refresh = {
            let mut data = self.inner.data();
            data.epoch += 1;
            data.tokens = Some(tokens);
            data.user = user;
            match claims {
                Ok(claims) if !claims.is_expired(unix_now()) => {
                    self.arm_refresh(&mut data, &claims);
                    self.set_state(SessionState::Authenticated);
                    false
                }
                _ => true,
            }
        };

        if needs_refresh {
            info!("stored access token expired or unreadable, refreshing");
            self.refresh_access_token().await?;
        }
        Ok(self.state())
    }

    pub async fn logout(&self) {
        let tokens = {
            let mut data = self.inner.data();
            data.schedule.cancel();
            data.tokens.clone()
        };

        if let Some(tokens) = tokens {
            if let Err(e) = self.inner.backend.logout(&tokens.access_token).await {
                warn!(error = %e, "logout notification failed, clearing local session anyway");
            }
        }

        self.clear_session();
        info!("logged out");
    }

    // --- Refresh ---

    /// Arm the single refresh timer for `access_token`, replacing any other.
    ///
    /// Returns the delay until it fires.
    pub fn schedule_refresh(&self, access_token: &str) -> Result<Duration> {
        let claims = decode_claims(access_token)?;
        let mut data = self.inner.data();
        Ok(self.arm_refresh(&mut data, &claims))
    }

    /// Exchange the refresh token for a new pair and re-arm the timer.
    ///
    /// Any failure clears the session.
    pub async fn refresh_access_token(&self) -> Result<SessionTokens> {
        self.refresh(None).await
    }

    async fn on_refresh_timer(&self, generation: u64) {
        let fired = self.inner.data().schedule.begin_fire(generation);
        if !fired {
            debug!(generation, "stale refresh timer ignored");
            return;
        }
        if let Err(e) = self.refresh(Some(generation)).await {
            warn!(generation, error = %e, "scheduled token refresh failed");
        }
    }

    async fn refresh(&self, fired: Option<u64>) -> Result<SessionTokens> {
        let (epoch, refresh_token) = {
            let data = self.inner.data();
            (data.epoch, data.tokens.as_ref().map(|t| t.refresh_token.clone()))
        };

        let Some(refresh_token) = refresh_token else {
            if let Some(generation) = fired {
                self.inner.data().schedule.finish(generation);
            }
            return Err(TruecredError::NotAuthenticated);
        };

        let result = self
            .inner
            .backend
            .refresh(&refresh_token)
            .await
            .and_then(|resp| {
                let tokens = SessionTokens {
                    access_token: resp.access_token,
                    refresh_token: resp
                        .refresh_token
                        .unwrap_or_else(|| refresh_token.clone()),
                };
                let claims = decode_claims(&tokens.access_token)?;
                Ok((tokens, claims))
            });

        let mut data = self.inner.data();

        // Logout, a new login, or another refresh replaced the pair meanwhile.
        let superseded = data.epoch != epoch
            || data
                .tokens
                .as_ref()
                .map_or(true, |t| t.refresh_token != refresh_token);
        if superseded {
            debug!("refresh result discarded, session changed while refreshing");
            if let Some(generation) = fired {
                data.schedule.finish(generation);
            }
            return data.tokens.clone().ok_or(TruecredError::NotAuthenticated);
        }

        match result {
            Ok((tokens, claims)) => {
                if let Err(e) = store::write_tokens(self.inner.store.as_ref(), &tokens) {
                    warn!(error = %e, "failed to persist refreshed tokens");
                }
                data.tokens = Some(tokens.clone());
                self.arm_refresh(&mut data, &claims);
                self.set_state(SessionState::Authenticated);
                drop(data);
                info!("access token refreshed");
                Ok(tokens)
            }
            Err(e) => {
                error!(error = %e, "token refresh failed, clearing session");
                self.clear_locked(&mut data);
                Err(e)
            }
        }
    }

    fn arm_refresh(&self, data: &mut SessionData, claims: &TokenClaims) -> Duration {
        let delay = refresh_delay(claims, unix_now(), self.inner.config.refresh_margin);
        let inner = Arc::downgrade(&self.inner);
        let generation = data
            .schedule
            .arm(delay, move |generation| refresh_timer_fired(inner, generation));
        info!(
            generation,
            refresh_in_secs = delay.as_secs(),
            expires_at = ?claims.expires_at(),
            "token refresh scheduled"
        );
        delay
    }

    // --- Profile ---

    /// Fetch the profile unless one is running or the last one is recent.
    ///
    /// `force` skips the debounce window, not the in-flight check.
    pub async fn ensure_fresh_profile(&self, force: bool) -> Result<ProfileCheck> {
        let (epoch, access_token) = {
            let mut data = self.inner.data();
            if data.profile.in_flight {
                debug!("profile fetch already in flight");
                return Ok(ProfileCheck::InFlight);
            }
            if !force {
                if let Some(last) = data.profile.last_checked_at {
                    if last.elapsed() < self.inner.config.profile_debounce {
                        debug!(
                            since_ms = last.elapsed().as_millis() as u64,
                            "profile fetch debounced"
                        );
                        return Ok(ProfileCheck::Debounced);
                    }
                }
            }
            let Some(tokens) = data.tokens.as_ref() else {
                return Err(TruecredError::NotAuthenticated);
            };
            let access_token = tokens.access_token.clone();
            data.profile.in_flight = true;
            (data.epoch, access_token)
        };

        let guard = InFlightGuard {
            inner: &self.inner,
            epoch,
        };
        let result = self.inner.backend.profile(&access_token).await;
        drop(guard);

        // The answer belongs to the session that asked for it.
        let mut data = self.inner.data();
        if data.epoch != epoch {
            debug!("profile result discarded, session changed while fetching");
            return Err(TruecredError::NotAuthenticated);
        }

        match result {
            Ok(user) => {
                store::write_user(self.inner.store.as_ref(), &user)?;
                data.profile.last_checked_at = Some(Instant::now());
                data.user = Some(user.clone());
                Ok(ProfileCheck::Fetched(user))
            }
            Err(e) if e.is_auth_error() => {
                warn!(error = %e, "profile check rejected, clearing session");
                self.clear_locked(&mut data);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    // --- Provider events ---

    /// Register against the provider's events once. Dropping or closing the
    /// returned handle tears the subscription down.
    pub fn watch_wallet(&self, gate: &WalletRequestGate) -> Option<WalletSubscription> {
        let mut rx = gate.events()?;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let inner = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(event) => {
                            let Some(inner) = inner.upgrade() else { break };
                            SessionManager { inner }.handle_provider_event(&event);
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("wallet event subscription lagged by {n} events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            debug!("wallet event subscription closed");
        });

        Some(WalletSubscription { cancel, handle })
    }

    pub fn handle_provider_event(&self, event: &ProviderEvent) {
        let store = self.inner.store.as_ref();
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                None => {
                    info!("wallet revoked all accounts");
                    if let Err(e) = store.remove(WALLET_ADDRESS_KEY) {
                        warn!(error = %e, "failed to clear wallet address");
                    }
                }
                Some(account) => match normalize_address(account) {
                    Ok(address) => {
                        if store.get(WALLET_ADDRESS_KEY).as_deref() != Some(address.as_str()) {
                            info!(wallet = %mask_address(&address), "active wallet account changed");
                            if let Err(e) = store.set(WALLET_ADDRESS_KEY, &address) {
                                warn!(error = %e, "failed to store wallet address");
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "ignoring malformed account from provider"),
                },
            },
            ProviderEvent::ChainChanged(chain_id) => {
                debug!(chain_id = %chain_id, "wallet chain changed");
            }
            ProviderEvent::Disconnect(reason) => {
                info!(reason = %reason, "wallet provider disconnected");
                if let Err(e) = store.remove(WALLET_ADDRESS_KEY) {
                    warn!(error = %e, "failed to clear wallet address");
                }
            }
        }
    }

    // --- Internals ---

    fn establish(&self, resp: AuthResponse, wallet_address: Option<&str>) -> Result<User> {
        let tokens = SessionTokens {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
        };
        let claims = decode_claims(&tokens.access_token)?;

        let mut user = resp.user;
        if user.wallet_address.is_none() {
            user.wallet_address = wallet_address.map(str::to_string);
        }

        let store = self.inner.store.as_ref();
        let mut data = self.inner.data();
        if let Err(e) =
            store::write_user(store, &user).and_then(|()| store::write_tokens(store, &tokens))
        {
            error!(error = %e, "failed to persist new session, clearing");
            self.clear_locked(&mut data);
            return Err(e);
        }

        data.epoch += 1;
        data.tokens = Some(tokens);
        data.user = Some(user.clone());
        data.profile = ProfileFetchState::default();
        self.arm_refresh(&mut data, &claims);
        self.set_state(SessionState::Authenticated);
        drop(data);
        info!(user_id = ?user.id, role = ?user.role, "authenticated");
        Ok(user)
    }

    fn clear_session(&self) {
        let mut data = self.inner.data();
        self.clear_locked(&mut data);
    }

    /// Clear only if `epoch` is still the live session.
    fn clear_session_if(&self, epoch: u64) {
        let mut data = self.inner.data();
        if data.epoch == epoch {
            self.clear_locked(&mut data);
        } else {
            debug!("stale rejection ignored, session already replaced");
        }
    }

    fn clear_locked(&self, data: &mut SessionData) {
        data.epoch += 1;
        data.schedule.cancel();
        data.tokens = None;
        data.user = None;
        data.profile = ProfileFetchState::default();
        if let Err(e) = store::clear_session(self.inner.store.as_ref()) {
            error!(error = %e, "failed to clear stored session");
        }
        self.set_state(SessionState::Unauthenticated);
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.inner.state_tx.send_replace(state);
        if previous != state {
            info!(from = ?previous, to = ?state, "session state changed");
        }
    }
}

/// Timer body. Returns a boxed future so the timer and the refresh it
/// triggers can re-arm each other.
fn refresh_timer_fired(
    inner: Weak<Inner>,
    generation: u64,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        SessionManager { inner }.on_refresh_timer(generation).await;
    })
}

/// Clears `in_flight` however the profile fetch ends, including cancellation.
/// A guard from a replaced session leaves the new session's slot alone.
struct InFlightGuard<'a> {
    inner: &'a Inner,
    epoch: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut data = self.inner.data();
        if data.epoch == self.epoch {
            data.profile.in_flight = false;
        }
    }
}

/// Handle for a provider-event subscription.
#[derive(Debug)]
pub struct WalletSubscription {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl WalletSubscription {
    pub fn is_closed(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop listening and wait for the listener task to exit.
    pub async fn close(mut self) {
        self.cancel.cancel();
        let _ = (&mut self.handle).await;
    }
}

impl Drop for WalletSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
