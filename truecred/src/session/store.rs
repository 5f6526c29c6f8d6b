//! Durable client storage: flat string keys, no schema versioning.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::{Result, TruecredError};

use super::tokens::SessionTokens;
use super::types::User;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_ROLE_KEY: &str = "userRole";
pub const USER_KEY: &str = "user";
pub const WALLET_ADDRESS_KEY: &str = "walletAddress";

/// Every key owned by the session.
pub const SESSION_KEYS: [&str; 5] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    USER_ROLE_KEY,
    USER_KEY,
    WALLET_ADDRESS_KEY,
];

pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Store persisted as a single JSON object on disk.
///
/// The whole object is rewritten on every mutation through a temp file and a
/// rename, so a crash never leaves a half-written file behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), keys = entries.len(), "session store opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut entries);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&*entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.mutate(|entries| {
            entries.remove(key);
        })
    }
}

// ---- Session helpers over any store ----

/// Both tokens, or `None` if either is missing.
pub fn read_tokens(store: &dyn SessionStore) -> Option<SessionTokens> {
    Some(SessionTokens {
        access_token: store.get(ACCESS_TOKEN_KEY)?,
        refresh_token: store.get(REFRESH_TOKEN_KEY)?,
    })
}

pub fn write_tokens(store: &dyn SessionStore, tokens: &SessionTokens) -> Result<()> {
    store.set(ACCESS_TOKEN_KEY, &tokens.access_token)?;
    store.set(REFRESH_TOKEN_KEY, &tokens.refresh_token)
}

/// Stored user, if present and parseable.
pub fn read_user(store: &dyn SessionStore) -> Option<User> {
    let raw = store.get(USER_KEY)?;
    match serde_json::from_str(&raw) {
        Ok(user) => Some(user),
        Err(e) => {
            warn!(error = %e, "discarding unparseable stored user");
            None
        }
    }
}

/// Persist the user together with its role and wallet address.
pub fn write_user(store: &dyn SessionStore, user: &User) -> Result<()> {
    store.set(USER_KEY, &serde_json::to_string(user)?)?;
    match &user.role {
        Some(role) => store.set(USER_ROLE_KEY, role)?,
        None => store.remove(USER_ROLE_KEY)?,
    }
    if let Some(address) = &user.wallet_address {
        store.set(WALLET_ADDRESS_KEY, address)?;
    }
    Ok(())
}

/// Remove every session key. Attempts all keys and reports the first failure.
pub fn clear_session(store: &dyn SessionStore) -> Result<()> {
    let mut first_err: Option<TruecredError> = None;
    for key in SESSION_KEYS {
        if let Err(e) = store.remove(key) {
            warn!(key, error = %e, "failed to remove session key");
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}
