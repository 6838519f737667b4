//! Blind auth token issuance
//!
//! Access tokens are amount-one proofs on the mint's auth keyset, minted
//! in a batch while clear auth is held and spent one per protected call.

use cashu_core::amount::{Amount, SplitTarget};
use cashu_core::dhke::construct_proofs;
use cashu_core::proofs::{CurrencyUnit, PreMintSecrets, Proof};
use tracing::instrument;

use super::Wallet;
use crate::auth::{AuthWallet, BlindAuthToken, MintAuthRequest};
use crate::error::Error;

impl Wallet {
    /// Mint `count` blind auth tokens into `auth`
    ///
    /// Secrets are always random: an access token must not be derivable
    /// from the wallet seed, or a restored wallet could be linked to past
    /// protected calls.
    #[instrument(skip(self, auth))]
    pub async fn mint_blind_auth(&self, count: u64, auth: &AuthWallet) -> Result<u64, Error> {
        let keysets = self.connector.get_blind_auth_keysets().await?.keysets;
        let keyset = keysets
            .into_iter()
            .find(|keyset| keyset.active && keyset.unit == CurrencyUnit::Auth)
            .ok_or(Error::NoActiveKeyset)?;

        let keyset_with_keys = self.connector.get_blind_auth_keyset(keyset.id).await?;
        keyset_with_keys.verify_id()?;

        let premint = PreMintSecrets::random(
            keyset.id,
            Amount::from(count),
            &SplitTarget::Values(vec![Amount::ONE; count as usize]),
        )?;

        let response = self
            .connector
            .post_mint_blind_auth(MintAuthRequest {
                outputs: premint.blinded_messages(),
            })
            .await?;

        self.verify_signatures(&premint.secrets, &response.signatures, &keyset_with_keys.keys)?;

        let proofs = construct_proofs(
            response.signatures,
            premint.rs(),
            premint.secrets(),
            &keyset_with_keys.keys,
        )?;

        let minted = proofs.len() as u64;

        auth.add_blind_tokens(
            proofs
                .into_iter()
                .map(|proof: Proof| BlindAuthToken::new(proof.into()))
                .collect(),
        );

        tracing::debug!("Minted {minted} blind auth tokens");

        Ok(minted)
    }
}
