//! Wallet
//!
//! One [`Wallet`] per (mint, unit) pair. All proof-store mutations pass
//! through one internal lock, so overlapping operations can never select
//! the same proof twice or hand out the same derivation counter; crypto
//! and network I/O happen outside it.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use bip39::Mnemonic;
use bitcoin::bip32::Xpriv;
use cashu_core::amount::{Amount, SplitTarget};
use cashu_core::derivation::master_xpriv;
use cashu_core::info::MintInfo;
use cashu_core::keys::PublicKey;
use cashu_core::keyset::{Id, KeySetInfo, Keys, KeysetDiff};
use cashu_core::mint_url::MintUrl;
use cashu_core::proofs::{BlindSignature, CurrencyUnit, PreMint, PreMintSecrets};
use cashu_core::spend::SpendingConditions;
use cashu_core::util::unix_time;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::connector::MintConnector;
use crate::error::Error;
use crate::store::WalletStore;
use crate::types::ProofStatus;

mod blind_auth;
mod issue;
mod melt;
mod receive;
mod restore;
mod selection;
mod send;
mod swap;

#[cfg(test)]
pub(crate) mod test_mint;

pub use melt::pay_invoice_mpp;
pub use receive::ReceiveOptions;
pub use selection::{select_proofs, Selection, SelectionStrategy};

/// A wallet against one mint, in one unit
#[derive(Debug)]
pub struct Wallet {
    /// Url of the mint
    pub mint_url: MintUrl,
    /// Unit of this wallet
    pub unit: CurrencyUnit,
    connector: Arc<dyn MintConnector>,
    store: Arc<dyn WalletStore>,
    xpriv: Option<Xpriv>,
    strategy: SelectionStrategy,
    split_target: SplitTarget,
    // serializes proof selection, counter reservation and status flips
    op_lock: Mutex<()>,
    // blank-output material of in-flight melts, keyed by quote id
    pending_melts: Mutex<HashMap<String, (PreMintSecrets, Vec<PublicKey>)>>,
}

impl Wallet {
    /// Start building a [`Wallet`]
    pub fn builder() -> WalletBuilder {
        WalletBuilder::default()
    }

    /// The connector this wallet talks through
    pub fn connector(&self) -> &Arc<dyn MintConnector> {
        &self.connector
    }

    /// The store this wallet persists into
    pub fn store(&self) -> &Arc<dyn WalletStore> {
        &self.store
    }

    /// Spendable balance
    #[instrument(skip(self))]
    pub async fn balance(&self) -> Result<Amount, Error> {
        let proofs = self
            .store
            .get_proofs(&self.mint_url, Some(ProofStatus::Unspent))
            .await?;
        Ok(Amount::try_sum(proofs.iter().map(|p| p.amount))?)
    }

    /// Balance committed to in-flight operations
    #[instrument(skip(self))]
    pub async fn pending_balance(&self) -> Result<Amount, Error> {
        let proofs = self
            .store
            .get_proofs(&self.mint_url, Some(ProofStatus::Pending))
            .await?;
        Ok(Amount::try_sum(proofs.iter().map(|p| p.amount))?)
    }

    /// Fetch mint info and keysets, store both, and report what changed
    ///
    /// New keysets have their keys fetched and their published id checked
    /// against the id derived from the keys before anything is stored.
    #[instrument(skip(self))]
    pub async fn refresh_keysets(&self) -> Result<KeysetDiff, Error> {
        if let Ok(info) = self.connector.get_mint_info().await {
            self.store
                .set_mint_info(self.mint_url.clone(), info)
                .await?;
        }

        let current = self.connector.get_mint_keysets().await?.keysets;
        let known = self
            .store
            .get_keysets(&self.mint_url)
            .await?
            .unwrap_or_default();

        let diff = KeysetDiff::between(&known, &current);

        for keyset_id in &diff.unseen {
            let keyset = self.connector.get_mint_keyset(*keyset_id).await?;
            keyset.verify_id()?;
            self.store.add_keys(keyset).await?;
        }

        self.store
            .set_keysets(self.mint_url.clone(), current)
            .await?;

        Ok(diff)
    }

    /// Stored mint info, fetching it if absent
    pub async fn mint_info(&self) -> Result<MintInfo, Error> {
        if let Some(info) = self.store.get_mint_info(&self.mint_url).await? {
            return Ok(info);
        }

        let info = self.connector.get_mint_info().await?;
        self.store
            .set_mint_info(self.mint_url.clone(), info.clone())
            .await?;
        Ok(info)
    }

    /// The active keyset this wallet should write outputs to: active, right
    /// unit, cheapest input fee
    pub(crate) async fn active_keyset(&self) -> Result<KeySetInfo, Error> {
        if let Some(keyset) = self.pick_active(&self.stored_keysets().await?) {
            return Ok(keyset);
        }

        self.refresh_keysets().await?;

        self.pick_active(&self.stored_keysets().await?)
            .ok_or(Error::NoActiveKeyset)
    }

    fn pick_active(&self, keysets: &[KeySetInfo]) -> Option<KeySetInfo> {
        keysets
            .iter()
            .filter(|info| info.active && info.unit == self.unit)
            .min_by_key(|info| info.input_fee_ppk)
            .cloned()
    }

    async fn stored_keysets(&self) -> Result<Vec<KeySetInfo>, Error> {
        Ok(self
            .store
            .get_keysets(&self.mint_url)
            .await?
            .unwrap_or_default())
    }

    /// Keys of a keyset, from the store or the mint
    pub(crate) async fn keyset_keys(&self, keyset_id: Id) -> Result<Keys, Error> {
        if let Some(keys) = self.store.get_keys(&keyset_id).await? {
            return Ok(keys);
        }

        let keyset = self.connector.get_mint_keyset(keyset_id).await?;
        keyset.verify_id()?;
        self.store.add_keys(keyset.clone()).await?;
        Ok(keyset.keys)
    }

    /// Input fee ppk per known keyset of this mint
    pub(crate) async fn keyset_fees(&self) -> Result<HashMap<Id, u64>, Error> {
        Ok(self
            .stored_keysets()
            .await?
            .iter()
            .map(|info| (info.id, info.input_fee_ppk))
            .collect())
    }

    /// Ids of this mint's inactive keysets
    pub(crate) async fn inactive_keyset_ids(&self) -> Result<HashSet<Id>, Error> {
        Ok(self
            .stored_keysets()
            .await?
            .iter()
            .filter(|info| !info.active)
            .map(|info| info.id)
            .collect())
    }

    /// Build outputs for `amount` on `keyset_id`
    ///
    /// With a seed, secrets come off the keyset's counter so a lost
    /// response can be replayed or restored; without one they are random.
    /// The reserved counter range is committed before any network use, so
    /// a failed operation burns counters instead of ever reusing them.
    pub(crate) async fn premint_secrets(
        &self,
        keyset_id: Id,
        amount: Amount,
        target: &SplitTarget,
    ) -> Result<PreMintSecrets, Error> {
        let mut premint = match self.xpriv {
            Some(xpriv) => {
                let count = amount.split_targeted(target)?.len() as u32;
                let start = self.store.reserve_counters(&keyset_id, count).await?;
                PreMintSecrets::from_xpriv(keyset_id, start, xpriv, amount, target)?
            }
            None => PreMintSecrets::random(keyset_id, amount, target)?,
        };

        premint.sort_secrets();
        Ok(premint)
    }

    /// Build blank outputs for a fee reserve
    ///
    /// Blanks are always random: their amounts are chosen by the mint, so
    /// a deterministic restore could never guess them anyway.
    pub(crate) fn blank_outputs(
        &self,
        keyset_id: Id,
        fee_reserve: Amount,
    ) -> Result<PreMintSecrets, Error> {
        Ok(PreMintSecrets::blank(keyset_id, fee_reserve)?)
    }

    /// Build outputs locked by `conditions`
    pub(crate) fn condition_outputs(
        &self,
        keyset_id: Id,
        amount: Amount,
        target: &SplitTarget,
        conditions: &SpendingConditions,
    ) -> Result<PreMintSecrets, Error> {
        let mut premint =
            PreMintSecrets::with_conditions(keyset_id, amount, target, conditions)?;
        premint.sort_secrets();
        Ok(premint)
    }

    /// Check returned signatures line up with what was sent and that every
    /// attached DLEQ verifies
    pub(crate) fn verify_signatures(
        &self,
        premints: &[PreMint],
        signatures: &[BlindSignature],
        keys: &Keys,
    ) -> Result<(), Error> {
        if signatures.len() != premints.len() {
            return Err(Error::SignatureCountMismatch {
                expected: premints.len(),
                got: signatures.len(),
            });
        }

        for (signature, premint) in signatures.iter().zip(premints) {
            let key = keys
                .amount_key(signature.amount)
                .ok_or(Error::CouldNotVerifyDleq)?;

            match signature.verify_dleq(key, premint.blinded_message.blinded_secret) {
                Ok(()) | Err(cashu_core::dleq::Error::MissingDleqProof) => (),
                Err(_) => return Err(Error::CouldNotVerifyDleq),
            }
        }

        Ok(())
    }

    pub(crate) fn now(&self) -> u64 {
        unix_time()
    }
}

/// Builder for [`Wallet`]
#[derive(Default)]
pub struct WalletBuilder {
    mint_url: Option<MintUrl>,
    unit: Option<CurrencyUnit>,
    connector: Option<Arc<dyn MintConnector>>,
    store: Option<Arc<dyn WalletStore>>,
    xpriv: Option<Xpriv>,
    strategy: SelectionStrategy,
    split_target: SplitTarget,
}

impl std::fmt::Debug for WalletBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletBuilder")
            .field("mint_url", &self.mint_url)
            .field("unit", &self.unit)
            .field("has_seed", &self.xpriv.is_some())
            .finish_non_exhaustive()
    }
}

impl WalletBuilder {
    /// Mint to talk to
    pub fn mint_url(mut self, mint_url: MintUrl) -> Self {
        self.mint_url = Some(mint_url);
        self
    }

    /// Unit of the wallet, default sat
    pub fn unit(mut self, unit: CurrencyUnit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Use a custom connector instead of the HTTP client
    pub fn connector(mut self, connector: Arc<dyn MintConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use a custom store instead of the in-memory one
    pub fn store(mut self, store: Arc<dyn WalletStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Seed from a BIP-39 mnemonic; enables deterministic secrets and
    /// restore
    pub fn mnemonic(mut self, mnemonic: &str, passphrase: &str) -> Result<Self, Error> {
        let mnemonic = Mnemonic::from_str(mnemonic)?;
        self.xpriv = Some(master_xpriv(&mnemonic, passphrase)?);
        Ok(self)
    }

    /// Seed from an already derived master key
    pub fn xpriv(mut self, xpriv: Xpriv) -> Self {
        self.xpriv = Some(xpriv);
        self
    }

    /// Proof selection strategy
    pub fn selection_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Denomination target for new outputs
    pub fn split_target(mut self, target: SplitTarget) -> Self {
        self.split_target = target;
        self
    }

    /// Build the [`Wallet`]
    pub fn build(self) -> Result<Wallet, Error> {
        let mint_url = self
            .mint_url
            .ok_or(cashu_core::mint_url::Error::InvalidUrl)?;

        let connector = match self.connector {
            Some(connector) => connector,
            None => Arc::new(crate::client::HttpClient::new(mint_url.clone())?),
        };

        Ok(Wallet {
            mint_url,
            unit: self.unit.unwrap_or_default(),
            connector,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(crate::store::MemoryStore::new())),
            xpriv: self.xpriv,
            strategy: self.strategy,
            split_target: self.split_target,
            op_lock: Mutex::new(()),
            pending_melts: Mutex::new(HashMap::new()),
        })
    }
}
