use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use truecred::session::store::{read_tokens, read_user, WALLET_ADDRESS_KEY};
use truecred::session::types::RegisterRequest;
use truecred::{
    FileStore, JsonRpcProvider, ProfileCheck, SessionState, SessionStore, Truecred,
    WalletProvider,
};

use crate::cli::{Cli, Command, KeepAliveArgs, WalletArgs};
use crate::error::CliError;
use crate::output::{self, StatusReport, TokenReport};

pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<(), CliError> {
    let config = cli.config();
    let store = Arc::new(FileStore::open(&cli.store)?);
    let json = cli.json;

    let provider = match &cli.command {
        Command::WalletLogin(args) | Command::ConnectWallet(args) => Some(rpc_provider(args)?),
        _ => None,
    };
    let client = Truecred::new(config, provider, store.clone());

    match cli.command {
        Command::Login(args) => {
            let user = client.session.login(&args.email, &args.password).await?;
            output::user(&user, json)
        }

        Command::Register(args) => {
            let req = RegisterRequest {
                email: args.email,
                password: args.password,
                name: args.name,
                role: args.role,
                wallet_address: args.wallet,
            };
            let user = client.session.register(&req).await?;
            output::user(&user, json)
        }

        Command::WalletLogin(_) => {
            let user = client.connect_and_authenticate().await?;
            output::user(&user, json)
        }

        Command::ConnectWallet(_) => {
            require_session(&client).await?;
            let user = client.link_wallet().await?;
            output::user(&user, json)
        }

        Command::Profile(args) => {
            require_session(&client).await?;
            let check = client.session.ensure_fresh_profile(args.force).await?;
            output::profile(&check, json)
        }

        Command::Refresh => {
            require_session(&client).await?;
            let tokens = client.session.refresh_access_token().await?;
            output::tokens(&TokenReport::new(&tokens), json)
        }

        Command::Logout => {
            if let Err(e) = client.session.restore().await {
                debug!(error = %e, "stored session not restorable");
            }
            client.session.logout().await;
            output::message("logged out", json)
        }

        Command::Status => output::status(&stored_status(store.as_ref()), json),

        Command::KeepAlive(args) => keep_alive(&client, &args, cancel).await,
    }
}

fn rpc_provider(args: &WalletArgs) -> Result<Arc<dyn WalletProvider>, CliError> {
    let provider = JsonRpcProvider::new(&args.rpc_url)?;
    info!(rpc_url = %provider.url(), "using json-rpc wallet provider");
    Ok(Arc::new(provider))
}

async fn require_session(client: &Truecred) -> Result<(), CliError> {
    match client.session.restore().await? {
        SessionState::Authenticated => Ok(()),
        SessionState::Unauthenticated => Err(CliError::NotLoggedIn),
    }
}

/// Report what is on disk. Never refreshes, never calls the backend.
fn stored_status(store: &dyn SessionStore) -> StatusReport {
    let tokens = read_tokens(store);
    let state = match &tokens {
        Some(_) => SessionState::Authenticated,
        None => SessionState::Unauthenticated,
    };
    StatusReport {
        state,
        user: read_user(store),
        wallet_address: store.get(WALLET_ADDRESS_KEY),
        tokens: tokens.as_ref().map(TokenReport::new),
    }
}

/// Hold the session open: the refresh timer runs in the background while a
/// periodic profile check confirms the server still accepts it.
async fn keep_alive(
    client: &Truecred,
    args: &KeepAliveArgs,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    require_session(client).await?;

    let mut state_rx = client.session.subscribe();
    let mut profile_tick =
        tokio::time::interval(Duration::from_secs(args.profile_interval_secs.max(1)));
    info!(
        profile_interval_secs = args.profile_interval_secs,
        "keeping session alive"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("keep-alive stopped, session left in place");
                return Ok(());
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return Err(CliError::SessionEnded("session manager dropped"));
                }
                let state = *state_rx.borrow_and_update();
                if state == SessionState::Unauthenticated {
                    warn!("session ended while keeping alive");
                    return Err(CliError::SessionEnded("refresh rejected"));
                }
            }
            _ = profile_tick.tick() => {
                match client.session.ensure_fresh_profile(false).await {
                    Ok(ProfileCheck::Fetched(user)) => {
                        debug!(user_id = ?user.id, "profile confirmed");
                    }
                    Ok(other) => debug!(outcome = ?other, "profile check skipped"),
                    Err(e) if e.is_auth_error() => {
                        return Err(CliError::SessionEnded("profile rejected"));
                    }
                    Err(e) => warn!(error = %e, "profile check failed, will retry"),
                }
            }
        }
    }
}
