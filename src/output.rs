use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use truecred::session::tokens::{decode_claims, unix_now};
use truecred::utils::{mask_address, mask_token};
use truecred::{ProfileCheck, SessionState, SessionTokens, User};

use crate::error::CliError;

/// What `status` and `refresh` report about a token pair.
#[derive(Debug, Serialize)]
pub struct TokenReport {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub expires_in_secs: Option<i64>,
    pub expired: bool,
}

impl TokenReport {
    pub fn new(tokens: &SessionTokens) -> Self {
        let now = unix_now();
        let claims = decode_claims(&tokens.access_token).ok();
        Self {
            access_token: mask_token(&tokens.access_token),
            refresh_token: mask_token(&tokens.refresh_token),
            expires_at: claims.as_ref().and_then(|c| c.expires_at()),
            expires_in_secs: claims.as_ref().map(|c| c.exp - now),
            expired: claims.map_or(true, |c| c.is_expired(now)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub state: SessionState,
    pub user: Option<User>,
    pub wallet_address: Option<String>,
    pub tokens: Option<TokenReport>,
}

/// Write one result to stdout, as a JSON line or as text.
pub fn emit<T: Serialize>(
    value: &T,
    json: bool,
    text: impl FnOnce(&mut String),
) -> Result<(), CliError> {
    let mut buf = String::new();
    if json {
        buf.push_str(&serde_json::to_string(value)?);
    } else {
        text(&mut buf);
    }
    if !buf.ends_with('\n') {
        buf.push('\n');
    }

    let mut out = std::io::stdout().lock();
    out.write_all(buf.as_bytes())?;
    out.flush()?;
    Ok(())
}

pub fn user(user: &User, json: bool) -> Result<(), CliError> {
    emit(user, json, |buf| write_user(buf, user))
}

pub fn status(report: &StatusReport, json: bool) -> Result<(), CliError> {
    emit(report, json, |buf| {
        let state = match report.state {
            SessionState::Authenticated => "authenticated",
            SessionState::Unauthenticated => "unauthenticated",
        };
        push_field(buf, "state", state);
        if let Some(user) = &report.user {
            write_user(buf, user);
        }
        if let Some(wallet) = &report.wallet_address {
            push_field(buf, "wallet", &mask_address(wallet));
        }
        if let Some(tokens) = &report.tokens {
            write_tokens(buf, tokens);
        }
    })
}

pub fn tokens(report: &TokenReport, json: bool) -> Result<(), CliError> {
    emit(report, json, |buf| write_tokens(buf, report))
}

pub fn profile(check: &ProfileCheck, json: bool) -> Result<(), CliError> {
    let (outcome, fetched) = match check {
        ProfileCheck::Fetched(user) => ("fetched", Some(user)),
        ProfileCheck::InFlight => ("in_flight", None),
        ProfileCheck::Debounced => ("debounced", None),
    };
    let value = serde_json::json!({ "outcome": outcome, "user": fetched });
    emit(&value, json, |buf| match fetched {
        Some(user) => write_user(buf, user),
        None => push_field(buf, "profile", outcome),
    })
}

pub fn message(text: &str, json: bool) -> Result<(), CliError> {
    emit(&serde_json::json!({ "message": text }), json, |buf| {
        buf.push_str(text)
    })
}

fn write_user(buf: &mut String, user: &User) {
    push_field(buf, "id", user.id.as_deref().unwrap_or("-"));
    push_field(buf, "email", user.email.as_deref().unwrap_or("-"));
    push_field(buf, "name", user.name.as_deref().unwrap_or("-"));
    push_field(buf, "role", user.role.as_deref().unwrap_or("-"));
    if let Some(wallet) = &user.wallet_address {
        push_field(buf, "wallet", &mask_address(wallet));
    }
}

fn write_tokens(buf: &mut String, report: &TokenReport) {
    push_field(buf, "access_token", &report.access_token);
    push_field(buf, "refresh_token", &report.refresh_token);
    match (report.expires_at, report.expires_in_secs) {
        (Some(at), Some(secs)) if !report.expired => {
            push_field(buf, "expires", &format!("{} (in {}s)", at.to_rfc3339(), secs))
        }
        (Some(at), _) => push_field(buf, "expires", &format!("{} (expired)", at.to_rfc3339())),
        _ => push_field(buf, "expires", "unreadable"),
    }
}

fn push_field(buf: &mut String, key: &str, value: &str) {
    buf.push_str(key);
    buf.push('\t');
    buf.push_str(value);
    buf.push('\n');
}
