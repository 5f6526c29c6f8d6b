use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use truecred::{GateConfig, SessionConfig, TruecredConfig};

/// truecred: session and wallet client for the TrueCred backend.
#[derive(Parser, Debug)]
#[command(name = "truecred", version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Backend base URL
    #[arg(
        long,
        env = "TRUECRED_API_URL",
        default_value = "http://localhost:5000",
        global = true
    )]
    pub api_url: String,

    /// Session file holding tokens and the cached user
    #[arg(
        long,
        env = "TRUECRED_STORE",
        default_value = ".truecred/session.json",
        global = true
    )]
    pub store: PathBuf,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(flatten)]
    pub timing: TimingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in with email and password
    Login(LoginArgs),

    /// Create an account
    Register(RegisterArgs),

    /// Connect a wallet and log in (or sign up) with its address
    WalletLogin(WalletArgs),

    /// Link a wallet to the logged-in account
    ConnectWallet(WalletArgs),

    /// Fetch the profile (debounced unless --force)
    Profile(ProfileArgs),

    /// Exchange the refresh token for a new pair now
    Refresh,

    /// End the session on the server and locally
    Logout,

    /// Show the stored session without touching the network
    Status,

    /// Keep the session alive, refreshing before expiry, until interrupted
    KeepAlive(KeepAliveArgs),
}

/// Timing knobs shared by every subcommand.
#[derive(Args, Debug)]
pub struct TimingArgs {
    /// Budget for one wallet connection attempt, retries included (ms)
    #[arg(long, default_value = "5000", global = true)]
    pub wallet_timeout_ms: u64,

    /// Delay between retries while the wallet is busy (ms)
    #[arg(long, default_value = "250", global = true)]
    pub wallet_poll_ms: u64,

    /// Refresh this long before the access token expires (s)
    #[arg(long, default_value = "300", global = true)]
    pub refresh_margin_secs: u64,

    /// Minimum interval between profile fetches (s)
    #[arg(long, default_value = "10", global = true)]
    pub profile_debounce_secs: u64,
}

/// Arguments for the `login` subcommand.
#[derive(Args, Debug)]
pub struct LoginArgs {
    pub email: String,

    #[arg(long, env = "TRUECRED_PASSWORD", hide_env_values = true)]
    pub password: String,
}

/// Arguments for the `register` subcommand.
#[derive(Args, Debug)]
pub struct RegisterArgs {
    pub email: String,

    /// Display name
    #[arg(long)]
    pub name: String,

    #[arg(long, env = "TRUECRED_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Account role (student, university, employer)
    #[arg(long)]
    pub role: Option<String>,

    /// Wallet address to attach at sign-up
    #[arg(long)]
    pub wallet: Option<String>,
}

/// Arguments for the wallet subcommands.
#[derive(Args, Debug)]
pub struct WalletArgs {
    /// JSON-RPC endpoint of the wallet node
    #[arg(long, env = "TRUECRED_RPC_URL", default_value = "http://127.0.0.1:8545")]
    pub rpc_url: String,
}

/// Arguments for the `profile` subcommand.
#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// Skip the debounce window
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `keep-alive` subcommand.
#[derive(Args, Debug)]
pub struct KeepAliveArgs {
    /// Interval between background profile checks (s)
    #[arg(long, default_value = "60")]
    pub profile_interval_secs: u64,
}

impl Cli {
    pub fn config(&self) -> TruecredConfig {
        TruecredConfig {
            api_base_url: self.api_url.clone(),
            gate: GateConfig {
                timeout: Duration::from_millis(self.timing.wallet_timeout_ms),
                poll_interval: Duration::from_millis(self.timing.wallet_poll_ms),
            },
            session: SessionConfig {
                refresh_margin: Duration::from_secs(self.timing.refresh_margin_secs),
                profile_debounce: Duration::from_secs(self.timing.profile_debounce_secs),
            },
        }
    }
}
