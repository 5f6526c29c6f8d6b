//! Shared fixtures: JWT builder, scripted wallet provider, scripted backend.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use truecred::session::types::{
    AuthResponse, LoginRequest, RefreshResponse, RegisterRequest, WalletAuthRequest,
};
use truecred::session::{AuthBackend, BackendFuture};
use truecred::wallet::{ProviderError, ProviderEvent, ProviderFuture, WalletProvider};
use truecred::{TruecredError, User};

pub const ALICE_WALLET: &str = "0xabcdef0123456789abcdef0123456789abcdef01";

static TOKEN_SEQ: AtomicU64 = AtomicU64::new(1);

/// Build an unsigned JWT that expires `ttl_secs` from now (wall clock).
pub fn make_token(ttl_secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let seq = TOKEN_SEQ.fetch_add(1, Ordering::SeqCst);
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = json!({
        "iat": now,
        "exp": now + ttl_secs,
        "sub": "1",
        "type": "access",
        "jti": format!("token-{seq}"),
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

pub fn alice() -> User {
    User {
        id: Some("1".into()),
        email: Some("alice@example.com".into()),
        name: Some("Alice".into()),
        role: Some("student".into()),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Wallet provider
// ---------------------------------------------------------------------------

/// One scripted provider answer.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(Result<Value, ProviderError>),
    After(Duration, Result<Value, ProviderError>),
    Hang,
}

impl Step {
    pub fn accounts(accounts: &[&str]) -> Self {
        Step::Respond(Ok(json!(accounts)))
    }

    pub fn busy() -> Self {
        Step::Respond(Err(ProviderError::new(
            -32002,
            "Already processing eth_requestAccounts. Please wait.",
        )))
    }

    pub fn rejected() -> Self {
        Step::Respond(Err(ProviderError::new(4001, "User rejected the request.")))
    }
}

/// Provider that replays a script and counts calls.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicUsize,
    methods: Mutex<Vec<String>>,
    available: bool,
    events: broadcast::Sender<ProviderEvent>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Step>, fallback: Step) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            methods: Mutex::new(Vec::new()),
            available: true,
            events,
        }
    }

    /// Always answers with `step`.
    pub fn always(step: Step) -> Self {
        Self::new(Vec::new(), step)
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::always(Step::accounts(&[ALICE_WALLET]))
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn methods(&self) -> Vec<String> {
        self.methods.lock().unwrap().clone()
    }

    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }
}

impl WalletProvider for ScriptedProvider {
    fn request(&self, method: &str, _params: Value) -> ProviderFuture<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.methods.lock().unwrap().push(method.to_string());
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        Box::pin(async move {
            match step {
                Step::Respond(result) => result,
                Step::After(delay, result) => {
                    tokio::time::sleep(delay).await;
                    result
                }
                Step::Hang => std::future::pending().await,
            }
        })
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn events(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        Some(self.events.subscribe())
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Ok,
    Status(u16),
}

pub fn http_error(status: u16) -> TruecredError {
    TruecredError::Http {
        status,
        message: format!("mock status {status}"),
    }
}

/// Backend that issues real-looking tokens and counts calls.
pub struct MockBackend {
    pub access_ttl_secs: i64,
    pub login_calls: AtomicUsize,
    pub wallet_auth_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub connect_wallet_calls: AtomicUsize,
    pub last_wallet_address: Mutex<Option<String>>,
    refresh_replies: Mutex<VecDeque<Reply>>,
    profile_reply: Mutex<Reply>,
    logout_reply: Mutex<Reply>,
    refresh_latency: Mutex<Duration>,
    profile_latency: Mutex<Duration>,
    refresh_seq: AtomicUsize,
}

impl MockBackend {
    /// Access tokens live 20 minutes.
    pub fn new() -> Self {
        Self::with_ttl(20 * 60)
    }

    pub fn with_ttl(access_ttl_secs: i64) -> Self {
        Self {
            access_ttl_secs,
            login_calls: AtomicUsize::new(0),
            wallet_auth_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            connect_wallet_calls: AtomicUsize::new(0),
            last_wallet_address: Mutex::new(None),
            refresh_replies: Mutex::new(VecDeque::new()),
            profile_reply: Mutex::new(Reply::Ok),
            logout_reply: Mutex::new(Reply::Ok),
            refresh_latency: Mutex::new(Duration::ZERO),
            profile_latency: Mutex::new(Duration::ZERO),
            refresh_seq: AtomicUsize::new(0),
        }
    }

    pub fn queue_refresh(&self, reply: Reply) {
        self.refresh_replies.lock().unwrap().push_back(reply);
    }

    pub fn set_profile_reply(&self, reply: Reply) {
        *self.profile_reply.lock().unwrap() = reply;
    }

    pub fn set_logout_reply(&self, reply: Reply) {
        *self.logout_reply.lock().unwrap() = reply;
    }

    pub fn set_refresh_latency(&self, latency: Duration) {
        *self.refresh_latency.lock().unwrap() = latency;
    }

    pub fn set_profile_latency(&self, latency: Duration) {
        *self.profile_latency.lock().unwrap() = latency;
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn auth_response(&self, user: User) -> AuthResponse {
        AuthResponse {
            access_token: make_token(self.access_ttl_secs),
            refresh_token: "refresh-0".into(),
            user,
            message: None,
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthBackend for MockBackend {
    fn login<'a>(&'a self, req: &'a LoginRequest) -> BackendFuture<'a, AuthResponse> {
        Box::pin(async move {
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            if req.password != "correct-horse" {
                return Err(http_error(401));
            }
            Ok(self.auth_response(alice()))
        })
    }

    fn register<'a>(&'a self, req: &'a RegisterRequest) -> BackendFuture<'a, AuthResponse> {
        Box::pin(async move {
            let user = User {
                id: Some("2".into()),
                email: Some(req.email.clone()),
                name: Some(req.name.clone()),
                role: req.role.clone(),
                ..Default::default()
            };
            Ok(self.auth_response(user))
        })
    }

    fn wallet_auth<'a>(&'a self, req: &'a WalletAuthRequest) -> BackendFuture<'a, AuthResponse> {
        Box::pin(async move {
            self.wallet_auth_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_wallet_address.lock().unwrap() = Some(req.wallet_address.clone());
            Ok(self.auth_response(alice()))
        })
    }

    fn refresh<'a>(&'a self, _refresh_token: &'a str) -> BackendFuture<'a, RefreshResponse> {
        Box::pin(async move {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let latency = *self.refresh_latency.lock().unwrap();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let reply = self
                .refresh_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Reply::Ok);
            match reply {
                Reply::Ok => {
                    let n = self.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(RefreshResponse {
                        access_token: make_token(self.access_ttl_secs),
                        refresh_token: Some(format!("refresh-{n}")),
                    })
                }
                Reply::Status(status) => Err(http_error(status)),
            }
        })
    }

    fn logout<'a>(&'a self, _access_token: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.logout_calls.fetch_add(1, Ordering::SeqCst);
            let reply = *self.logout_reply.lock().unwrap();
            match reply {
                Reply::Ok => Ok(()),
                Reply::Status(status) => Err(http_error(status)),
            }
        })
    }

    fn connect_wallet<'a>(
        &'a self,
        _access_token: &'a str,
        wallet_address: &'a str,
    ) -> BackendFuture<'a, User> {
        Box::pin(async move {
            self.connect_wallet_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_wallet_address.lock().unwrap() = Some(wallet_address.to_string());
            Ok(User {
                wallet_address: Some(wallet_address.to_string()),
                ..alice()
            })
        })
    }

    fn profile<'a>(&'a self, _access_token: &'a str) -> BackendFuture<'a, User> {
        Box::pin(async move {
            self.profile_calls.fetch_add(1, Ordering::SeqCst);
            let latency = *self.profile_latency.lock().unwrap();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let reply = *self.profile_reply.lock().unwrap();
            match reply {
                Reply::Ok => Ok(User {
                    name: Some("Alice Verified".into()),
                    ..alice()
                }),
                Reply::Status(status) => Err(http_error(status)),
            }
        })
    }
}
