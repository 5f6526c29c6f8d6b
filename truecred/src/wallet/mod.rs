pub mod gate;
pub mod provider;
pub mod rpc;

pub use gate::WalletRequestGate;
pub use provider::{
    ProviderError, ProviderErrorKind, ProviderEvent, ProviderFuture, WalletProvider, ACCOUNTS,
    REQUEST_ACCOUNTS,
};
pub use rpc::JsonRpcProvider;
