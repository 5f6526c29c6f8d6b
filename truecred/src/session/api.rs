//! Backend auth surface (`/api/auth/*`).

use std::future::Future;
use std::pin::Pin;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, TruecredError};

use super::types::*;

/// Boxed future returned by [`AuthBackend`] methods.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Operations the session manager needs from the backend.
pub trait AuthBackend: Send + Sync {
    fn login<'a>(&'a self, req: &'a LoginRequest) -> BackendFuture<'a, AuthResponse>;
    fn register<'a>(&'a self, req: &'a RegisterRequest) -> BackendFuture<'a, AuthResponse>;
    fn wallet_auth<'a>(&'a self, req: &'a WalletAuthRequest) -> BackendFuture<'a, AuthResponse>;
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BackendFuture<'a, RefreshResponse>;
    fn logout<'a>(&'a self, access_token: &'a str) -> BackendFuture<'a, ()>;
    fn connect_wallet<'a>(
        &'a self,
        access_token: &'a str,
        wallet_address: &'a str,
    ) -> BackendFuture<'a, User>;
    fn profile<'a>(&'a self, access_token: &'a str) -> BackendFuture<'a, User>;
}

/// HTTP client wrapper for the backend REST API.
#[derive(Debug, Clone)]
pub struct AuthHttpClient {
    client: Client,
    base_url: String,
}

impl AuthHttpClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a JSON resource.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, bearer: Option<&str>) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        self.send(with_bearer(self.client.get(&url), bearer)).await
    }

    /// POST a JSON body and decode a JSON response.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&str>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        self.send(with_bearer(self.client.post(&url).json(body), bearer))
            .await
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = checked(req).await?;
        resp.json::<T>().await.map_err(TruecredError::Request)
    }

    // --- Endpoints ---

    /// POST /api/auth/login
    pub async fn login(&self, req: &LoginRequest) -> Result<AuthResponse> {
        self.post("/api/auth/login", req, None).await
    }

    /// POST /api/auth/register
    pub async fn register(&self, req: &RegisterRequest) -> Result<AuthResponse> {
        self.post("/api/auth/register", req, None).await
    }

    /// POST /api/auth/wallet-auth - log in (or sign up) by wallet address.
    pub async fn wallet_auth(&self, req: &WalletAuthRequest) -> Result<AuthResponse> {
        self.post("/api/auth/wallet-auth", req, None).await
    }

    /// POST /api/auth/refresh - the refresh token is the bearer.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse> {
        self.post("/api/auth/refresh", &serde_json::json!({}), Some(refresh_token))
            .await
    }

    /// POST /api/auth/logout
    pub async fn logout(&self, access_token: &str) -> Result<()> {
        // The body, if any, carries nothing the client needs.
        let url = format!("{}/api/auth/logout", self.base_url);
        checked(self.client.post(&url).bearer_auth(access_token)).await?;
        Ok(())
    }

    /// POST /api/auth/connect-wallet - link a wallet to the logged-in account.
    pub async fn connect_wallet(&self, access_token: &str, wallet_address: &str) -> Result<User> {
        let body = WalletAuthRequest {
            wallet_address: wallet_address.to_string(),
        };
        let envelope: UserEnvelope = self
            .post("/api/auth/connect-wallet", &body, Some(access_token))
            .await?;
        Ok(envelope.into_user())
    }

    /// GET /api/auth/profile
    pub async fn profile(&self, access_token: &str) -> Result<User> {
        let envelope: UserEnvelope = self.get("/api/auth/profile", Some(access_token)).await?;
        Ok(envelope.into_user())
    }
}

impl AuthBackend for AuthHttpClient {
    fn login<'a>(&'a self, req: &'a LoginRequest) -> BackendFuture<'a, AuthResponse> {
        Box::pin(AuthHttpClient::login(self, req))
    }

    fn register<'a>(&'a self, req: &'a RegisterRequest) -> BackendFuture<'a, AuthResponse> {
        Box::pin(AuthHttpClient::register(self, req))
    }

    fn wallet_auth<'a>(&'a self, req: &'a WalletAuthRequest) -> BackendFuture<'a, AuthResponse> {
        Box::pin(AuthHttpClient::wallet_auth(self, req))
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BackendFuture<'a, RefreshResponse> {
        Box::pin(AuthHttpClient::refresh(self, refresh_token))
    }

    fn logout<'a>(&'a self, access_token: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(AuthHttpClient::logout(self, access_token))
    }

    fn connect_wallet<'a>(
        &'a self,
        access_token: &'a str,
        wallet_address: &'a str,
    ) -> BackendFuture<'a, User> {
        Box::pin(AuthHttpClient::connect_wallet(
            self,
            access_token,
            wallet_address,
        ))
    }

    fn profile<'a>(&'a self, access_token: &'a str) -> BackendFuture<'a, User> {
        Box::pin(AuthHttpClient::profile(self, access_token))
    }
}

/// Send and turn non-2xx responses into `TruecredError::Http`.
async fn checked(req: RequestBuilder) -> Result<Response> {
    let resp = req.send().await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(TruecredError::Http {
            status,
            message: error_message(&body),
        });
    }

    Ok(resp)
}

fn with_bearer(req: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
    match bearer {
        Some(token) => req.bearer_auth(token),
        None => req,
    }
}

/// Pull a human-readable message out of an error body.
///
/// The backend answers `{"error": ..}` or `{"message": ..}`; the JWT layer
/// answers `{"msg": ..}`. Anything else is passed through as text.
fn error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message", "msg"] {
            if let Some(Value::String(msg)) = map.get(key) {
                return msg.clone();
            }
        }
    }
    body.trim().to_string()
}
