//! Access/refresh token pair and local claim decoding.
//!
//! Tokens are JWTs issued by the backend. Only the payload is decoded here,
//! to learn the expiry; signature verification is the server's business.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TruecredError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenClaims {
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub sub: Option<Value>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, rename = "type")]
    pub token_type: Option<String>,
}

impl TokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|iat| DateTime::from_timestamp(iat, 0))
    }

    pub fn subject(&self) -> Option<String> {
        match self.sub.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn is_expired(&self, now_unix: i64) -> bool {
        now_unix >= self.exp
    }

    /// Time until expiry, zero if already expired.
    pub fn time_to_expiry(&self, now_unix: i64) -> Duration {
        Duration::from_secs(self.exp.saturating_sub(now_unix).max(0) as u64)
    }
}

/// Decode the claims of a JWT without verifying it.
///
/// # Errors
///
/// Returns `TruecredError::TokenDecode` if the token is not three
/// dot-separated segments or its payload is not base64url JSON with `exp`.
pub fn decode_claims(token: &str) -> Result<TokenClaims> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => {
            return Err(TruecredError::TokenDecode(
                "expected three dot-separated segments".into(),
            ))
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| TruecredError::TokenDecode(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| TruecredError::TokenDecode(format!("invalid claims: {e}")))
}

/// Delay until the refresh for a token expiring at `exp` should fire.
///
/// `exp - margin - now`, floored at zero.
pub fn refresh_delay(claims: &TokenClaims, now_unix: i64, margin: Duration) -> Duration {
    claims.time_to_expiry(now_unix).saturating_sub(margin)
}

pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}
