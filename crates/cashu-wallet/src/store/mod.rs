//! Wallet persistence
//!
//! The embedder supplies the store; the wallet core only states what it
//! needs to remember: mint snapshots, keysets and keys, per-keyset counters
//! for deterministic secrets, proofs with a local status, and in-flight
//! quotes. Everything is keyed so that a wallet can resume any operation
//! from what is here.

use std::fmt::Debug;

use async_trait::async_trait;
use cashu_core::info::MintInfo;
use cashu_core::keys::PublicKey;
use cashu_core::keyset::{Id, KeySet, KeySetInfo, Keys};
use cashu_core::mint_url::MintUrl;
use cashu_core::proofs::Proofs;
use thiserror::Error as ThisError;

use crate::types::{MintQuote, ProofStatus, WalletMeltQuote};

mod memory;

pub use memory::MemoryStore;

/// Store error
#[derive(Debug, ThisError)]
pub enum Error {
    /// Underlying storage failed
    #[error("Store error: {0}")]
    Backend(String),
    /// A record the operation relies on is gone
    #[error("Record not found")]
    NotFound,
}

/// What a wallet persists
#[async_trait]
pub trait WalletStore: Debug + Send + Sync {
    /// Store the info snapshot of a mint
    async fn set_mint_info(&self, mint_url: MintUrl, info: MintInfo) -> Result<(), Error>;
    /// Info snapshot of a mint
    async fn get_mint_info(&self, mint_url: &MintUrl) -> Result<Option<MintInfo>, Error>;

    /// Replace the keyset listing of a mint
    async fn set_keysets(&self, mint_url: MintUrl, keysets: Vec<KeySetInfo>) -> Result<(), Error>;
    /// Keyset listing of a mint
    async fn get_keysets(&self, mint_url: &MintUrl) -> Result<Option<Vec<KeySetInfo>>, Error>;

    /// Store the keys of a keyset
    async fn add_keys(&self, keyset: KeySet) -> Result<(), Error>;
    /// Keys of a keyset
    async fn get_keys(&self, keyset_id: &Id) -> Result<Option<Keys>, Error>;

    /// Atomically reserve `count` derivation counters of a keyset,
    /// returning the first reserved value
    async fn reserve_counters(&self, keyset_id: &Id, count: u32) -> Result<u32, Error>;
    /// Next unused derivation counter of a keyset
    async fn get_counter(&self, keyset_id: &Id) -> Result<u32, Error>;
    /// Raise a keyset's counter to at least `counter`
    async fn raise_counter(&self, keyset_id: &Id, counter: u32) -> Result<(), Error>;

    /// Store proofs under a mint with a status
    async fn add_proofs(
        &self,
        mint_url: MintUrl,
        proofs: Proofs,
        status: ProofStatus,
    ) -> Result<(), Error>;
    /// Proofs of a mint, optionally filtered by status
    async fn get_proofs(
        &self,
        mint_url: &MintUrl,
        status: Option<ProofStatus>,
    ) -> Result<Proofs, Error>;
    /// Update the status of proofs by their Y values
    async fn set_proof_status(&self, ys: &[PublicKey], status: ProofStatus) -> Result<(), Error>;
    /// Drop proofs by their Y values
    async fn remove_proofs(&self, ys: &[PublicKey]) -> Result<(), Error>;

    /// Track a mint quote
    async fn add_mint_quote(&self, quote: MintQuote) -> Result<(), Error>;
    /// A tracked mint quote
    async fn get_mint_quote(&self, quote_id: &str) -> Result<Option<MintQuote>, Error>;
    /// Stop tracking a mint quote
    async fn remove_mint_quote(&self, quote_id: &str) -> Result<(), Error>;

    /// Track a melt quote
    async fn add_melt_quote(&self, quote: WalletMeltQuote) -> Result<(), Error>;
    /// A tracked melt quote
    async fn get_melt_quote(&self, quote_id: &str) -> Result<Option<WalletMeltQuote>, Error>;
    /// Stop tracking a melt quote
    async fn remove_melt_quote(&self, quote_id: &str) -> Result<(), Error>;
}
