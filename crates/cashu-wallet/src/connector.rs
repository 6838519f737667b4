//! Connector trait
//!
//! Everything the wallet says to a mint goes through this trait, one method
//! per endpoint. [`crate::HttpClient`] is the production implementation;
//! tests drive the wallet against an in-process mint.

use std::fmt::Debug;

use async_trait::async_trait;
use cashu_core::info::MintInfo;
use cashu_core::keyset::{Id, KeySet, KeysetResponse};
use cashu_core::messages::{
    CheckStateRequest, CheckStateResponse, MeltQuoteRequest, MeltQuoteResponse, MeltRequest,
    MintQuoteRequest, MintQuoteResponse, MintRequest, MintResponse, RestoreRequest,
    RestoreResponse, SwapRequest, SwapResponse,
};

use crate::auth::MintAuthRequest;
use crate::error::Error;

/// Interface between a wallet and one mint
#[async_trait]
pub trait MintConnector: Debug + Send + Sync {
    /// Active keysets with their keys
    async fn get_mint_keys(&self) -> Result<Vec<KeySet>, Error>;
    /// Keys of one keyset
    async fn get_mint_keyset(&self, keyset_id: Id) -> Result<KeySet, Error>;
    /// All keysets the mint has ever had
    async fn get_mint_keysets(&self) -> Result<KeysetResponse, Error>;
    /// Mint metadata and capabilities
    async fn get_mint_info(&self) -> Result<MintInfo, Error>;

    /// Request a mint quote
    async fn post_mint_quote(&self, request: MintQuoteRequest)
        -> Result<MintQuoteResponse, Error>;
    /// State of a mint quote
    async fn get_mint_quote_state(&self, quote_id: &str) -> Result<MintQuoteResponse, Error>;
    /// Issue ecash for a paid quote
    async fn post_mint(&self, request: MintRequest) -> Result<MintResponse, Error>;

    /// Swap proofs for fresh ones
    async fn post_swap(&self, request: SwapRequest) -> Result<SwapResponse, Error>;

    /// Request a melt quote
    async fn post_melt_quote(&self, request: MeltQuoteRequest)
        -> Result<MeltQuoteResponse, Error>;
    /// State of a melt quote
    async fn get_melt_quote_state(&self, quote_id: &str) -> Result<MeltQuoteResponse, Error>;
    /// Pay a melt quote
    async fn post_melt(&self, request: MeltRequest) -> Result<MeltQuoteResponse, Error>;

    /// Check proof states by Y
    async fn post_check_state(
        &self,
        request: CheckStateRequest,
    ) -> Result<CheckStateResponse, Error>;
    /// Look up signatures for deterministic outputs
    async fn post_restore(&self, request: RestoreRequest) -> Result<RestoreResponse, Error>;

    /// Blind-auth keysets
    async fn get_blind_auth_keysets(&self) -> Result<KeysetResponse, Error>;
    /// Keys of a blind-auth keyset
    async fn get_blind_auth_keyset(&self, keyset_id: Id) -> Result<KeySet, Error>;
    /// Mint blind auth tokens
    async fn post_mint_blind_auth(&self, request: MintAuthRequest) -> Result<MintResponse, Error>;
}
