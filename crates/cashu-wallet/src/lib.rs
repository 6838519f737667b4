#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod auth;
pub mod cache;
pub mod client;
pub mod connector;
pub mod error;
pub mod oidc;
pub mod store;
pub mod types;
pub mod wallet;

pub use cashu_core;

pub use self::auth::AuthWallet;
pub use self::client::HttpClient;
pub use self::connector::MintConnector;
pub use self::error::Error;
pub use self::store::{MemoryStore, WalletStore};
pub use self::types::{Melted, MintQuote, ProofStatus, WalletMeltQuote};
pub use self::wallet::{Wallet, WalletBuilder};
