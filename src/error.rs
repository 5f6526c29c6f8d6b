use thiserror::Error;
use truecred::TruecredError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Truecred(#[from] TruecredError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not logged in")]
    NotLoggedIn,

    #[error("session ended: {0}")]
    SessionEnded(&'static str),
}

impl CliError {
    /// Short text for the terminal; details go to the log.
    pub fn user_message(&self) -> String {
        match self {
            CliError::Truecred(e) => e.user_message(),
            CliError::NotLoggedIn => "Not logged in. Run `truecred login` first.".into(),
            CliError::SessionEnded(reason) => format!("Session ended ({reason}). Log in again."),
            other => other.to_string(),
        }
    }
}
