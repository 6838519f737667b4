//! In-memory store

use std::collections::HashMap;

use async_trait::async_trait;
use cashu_core::info::MintInfo;
use cashu_core::keys::PublicKey;
use cashu_core::keyset::{Id, KeySet, KeySetInfo, Keys};
use cashu_core::mint_url::MintUrl;
use cashu_core::proofs::{Proof, Proofs};
use tokio::sync::RwLock;

use super::{Error, WalletStore};
use crate::types::{MintQuote, ProofStatus, WalletMeltQuote};

#[derive(Debug, Default)]
struct State {
    mint_info: HashMap<MintUrl, MintInfo>,
    keysets: HashMap<MintUrl, Vec<KeySetInfo>>,
    keys: HashMap<Id, Keys>,
    counters: HashMap<Id, u32>,
    proofs: HashMap<PublicKey, (MintUrl, Proof, ProofStatus)>,
    mint_quotes: HashMap<String, MintQuote>,
    melt_quotes: HashMap<String, WalletMeltQuote>,
}

/// Store keeping everything in process memory
///
/// The default for tests and throwaway wallets; anything that should
/// survive a restart needs a real [`WalletStore`] from the embedder.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create an empty [`MemoryStore`]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn set_mint_info(&self, mint_url: MintUrl, info: MintInfo) -> Result<(), Error> {
        self.state.write().await.mint_info.insert(mint_url, info);
        Ok(())
    }

    async fn get_mint_info(&self, mint_url: &MintUrl) -> Result<Option<MintInfo>, Error> {
        Ok(self.state.read().await.mint_info.get(mint_url).cloned())
    }

    async fn set_keysets(&self, mint_url: MintUrl, keysets: Vec<KeySetInfo>) -> Result<(), Error> {
        self.state.write().await.keysets.insert(mint_url, keysets);
        Ok(())
    }

    async fn get_keysets(&self, mint_url: &MintUrl) -> Result<Option<Vec<KeySetInfo>>, Error> {
        Ok(self.state.read().await.keysets.get(mint_url).cloned())
    }

    async fn add_keys(&self, keyset: KeySet) -> Result<(), Error> {
        self.state.write().await.keys.insert(keyset.id, keyset.keys);
        Ok(())
    }

    async fn get_keys(&self, keyset_id: &Id) -> Result<Option<Keys>, Error> {
        Ok(self.state.read().await.keys.get(keyset_id).cloned())
    }

    async fn reserve_counters(&self, keyset_id: &Id, count: u32) -> Result<u32, Error> {
        let mut state = self.state.write().await;
        let counter = state.counters.entry(*keyset_id).or_insert(0);
        let start = *counter;
        *counter += count;
        Ok(start)
    }

    async fn get_counter(&self, keyset_id: &Id) -> Result<u32, Error> {
        Ok(self
            .state
            .read()
            .await
            .counters
            .get(keyset_id)
            .copied()
            .unwrap_or(0))
    }

    async fn raise_counter(&self, keyset_id: &Id, counter: u32) -> Result<(), Error> {
        let mut state = self.state.write().await;
        let current = state.counters.entry(*keyset_id).or_insert(0);
        if counter > *current {
            *current = counter;
        }
        Ok(())
    }

    async fn add_proofs(
        &self,
        mint_url: MintUrl,
        proofs: Proofs,
        status: ProofStatus,
    ) -> Result<(), Error> {
        let mut state = self.state.write().await;
        for proof in proofs {
            let y = proof
                .y()
                .map_err(|err| Error::Backend(err.to_string()))?;
            state.proofs.insert(y, (mint_url.clone(), proof, status));
        }
        Ok(())
    }

    async fn get_proofs(
        &self,
        mint_url: &MintUrl,
        status: Option<ProofStatus>,
    ) -> Result<Proofs, Error> {
        Ok(self
            .state
            .read()
            .await
            .proofs
            .values()
            .filter(|(url, _, proof_status)| {
                url == mint_url && status.map(|s| s == *proof_status).unwrap_or(true)
            })
            .map(|(_, proof, _)| proof.clone())
            .collect())
    }

    async fn set_proof_status(&self, ys: &[PublicKey], status: ProofStatus) -> Result<(), Error> {
        let mut state = self.state.write().await;
        for y in ys {
            if let Some((_, _, proof_status)) = state.proofs.get_mut(y) {
                *proof_status = status;
            }
        }
        Ok(())
    }

    async fn remove_proofs(&self, ys: &[PublicKey]) -> Result<(), Error> {
        let mut state = self.state.write().await;
        for y in ys {
            state.proofs.remove(y);
        }
        Ok(())
    }

    async fn add_mint_quote(&self, quote: MintQuote) -> Result<(), Error> {
        self.state
            .write()
            .await
            .mint_quotes
            .insert(quote.id.clone(), quote);
        Ok(())
    }

    async fn get_mint_quote(&self, quote_id: &str) -> Result<Option<MintQuote>, Error> {
        Ok(self.state.read().await.mint_quotes.get(quote_id).cloned())
    }

    async fn remove_mint_quote(&self, quote_id: &str) -> Result<(), Error> {
        self.state.write().await.mint_quotes.remove(quote_id);
        Ok(())
    }

    async fn add_melt_quote(&self, quote: WalletMeltQuote) -> Result<(), Error> {
        self.state
            .write()
            .await
            .melt_quotes
            .insert(quote.id.clone(), quote);
        Ok(())
    }

    async fn get_melt_quote(&self, quote_id: &str) -> Result<Option<WalletMeltQuote>, Error> {
        Ok(self.state.read().await.melt_quotes.get(quote_id).cloned())
    }

    async fn remove_melt_quote(&self, quote_id: &str) -> Result<(), Error> {
        self.state.write().await.melt_quotes.remove(quote_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use cashu_core::amount::Amount;
    use cashu_core::secret::Secret;

    use super::*;

    fn proof(amount: u64) -> Proof {
        Proof::new(
            Amount::from(amount),
            Id::from_str("009a1f293253e41e").unwrap(),
            Secret::generate(),
            cashu_core::keys::SecretKey::generate().public_key(),
        )
    }

    #[tokio::test]
    async fn test_counters_are_monotonic() {
        let store = MemoryStore::new();
        let id = Id::from_str("009a1f293253e41e").unwrap();

        assert_eq!(store.reserve_counters(&id, 3).await.unwrap(), 0);
        assert_eq!(store.reserve_counters(&id, 2).await.unwrap(), 3);
        assert_eq!(store.get_counter(&id).await.unwrap(), 5);

        store.raise_counter(&id, 2).await.unwrap();
        assert_eq!(store.get_counter(&id).await.unwrap(), 5, "never lowers");

        store.raise_counter(&id, 10).await.unwrap();
        assert_eq!(store.get_counter(&id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_proof_status_transitions() {
        let store = MemoryStore::new();
        let mint_url = MintUrl::from_str("https://mint.example.com").unwrap();

        let p = proof(8);
        let y = p.y().unwrap();

        store
            .add_proofs(mint_url.clone(), vec![p], ProofStatus::Unspent)
            .await
            .unwrap();

        assert_eq!(
            store
                .get_proofs(&mint_url, Some(ProofStatus::Unspent))
                .await
                .unwrap()
                .len(),
            1
        );

        store
            .set_proof_status(&[y], ProofStatus::Pending)
            .await
            .unwrap();

        assert!(store
            .get_proofs(&mint_url, Some(ProofStatus::Unspent))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .get_proofs(&mint_url, Some(ProofStatus::Pending))
                .await
                .unwrap()
                .len(),
            1
        );

        store.remove_proofs(&[y]).await.unwrap();
        assert!(store.get_proofs(&mint_url, None).await.unwrap().is_empty());
    }
}
