//! Deterministic secrets
//!
//! With a BIP-39 seed the wallet derives every secret and blinding factor it
//! will ever use, so a lost proof store can be replayed against the mint.
//! Path: `m/129372'/0'/keyset_int'/counter'/{0,1}` where leaf 0 is the
//! secret and leaf 1 the blinding factor.

use bip39::Mnemonic;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::Network;
use thiserror::Error;

use crate::amount::{Amount, SplitTarget};
use crate::keys::SecretKey;
use crate::keyset::Id;
use crate::proofs::{BlindedMessage, PreMint, PreMintSecrets};
use crate::secret::Secret;
use crate::util::hex;
use crate::SECP256K1;

/// Purpose index of the derivation path, from NUT-13
const PURPOSE: u32 = 129372;

/// Derivation error
#[derive(Debug, Error)]
pub enum Error {
    /// Bip32 error
    #[error(transparent)]
    Bip32(#[from] bitcoin::bip32::Error),
    /// Keyset error
    #[error(transparent)]
    Keyset(#[from] crate::keyset::Error),
    /// DHKE error
    #[error(transparent)]
    Dhke(#[from] crate::dhke::Error),
    /// Amount error
    #[error(transparent)]
    Amount(#[from] crate::amount::Error),
}

/// Master private key for a mnemonic and passphrase
pub fn master_xpriv(mnemonic: &Mnemonic, passphrase: &str) -> Result<Xpriv, Error> {
    let seed: [u8; 64] = mnemonic.to_seed(passphrase);
    Ok(Xpriv::new_master(Network::Bitcoin, &seed)?)
}

fn keyset_path(keyset_id: Id) -> Result<DerivationPath, Error> {
    let keyset_index = (u64::try_from(keyset_id)? % (2_u64.pow(31) - 1)) as u32;

    Ok(DerivationPath::from(vec![
        ChildNumber::from_hardened_idx(PURPOSE)?,
        ChildNumber::from_hardened_idx(0)?,
        ChildNumber::from_hardened_idx(keyset_index)?,
    ]))
}

impl Secret {
    /// Secret for proof `counter` of a keyset: leaf 0, hex encoded
    pub fn from_xpriv(xpriv: Xpriv, keyset_id: Id, counter: u32) -> Result<Self, Error> {
        let path = keyset_path(keyset_id)?
            .child(ChildNumber::from_hardened_idx(counter)?)
            .child(ChildNumber::from_normal_idx(0)?);
        let derived = xpriv.derive_priv(&SECP256K1, &path)?;

        Ok(Self::new(hex::encode(derived.private_key.secret_bytes())))
    }
}

impl SecretKey {
    /// Blinding factor for proof `counter` of a keyset: leaf 1
    pub fn from_xpriv(xpriv: Xpriv, keyset_id: Id, counter: u32) -> Result<Self, Error> {
        let path = keyset_path(keyset_id)?
            .child(ChildNumber::from_hardened_idx(counter)?)
            .child(ChildNumber::from_normal_idx(1)?);
        let derived = xpriv.derive_priv(&SECP256K1, &path)?;

        Ok(Self::from(derived.private_key))
    }
}

impl PreMintSecrets {
    /// Deterministic outputs for `amount`, consuming counters from `counter`
    pub fn from_xpriv(
        keyset_id: Id,
        counter: u32,
        xpriv: Xpriv,
        amount: Amount,
        amount_split_target: &SplitTarget,
    ) -> Result<Self, Error> {
        let mut pre_mint_secrets = PreMintSecrets::default();

        let mut counter = counter;

        for amount in amount.split_targeted(amount_split_target)? {
            let secret = Secret::from_xpriv(xpriv, keyset_id, counter)?;
            let blinding_factor = SecretKey::from_xpriv(xpriv, keyset_id, counter)?;

            let (blinded, r) =
                crate::dhke::blind_message(&secret.to_bytes(), Some(blinding_factor))?;

            pre_mint_secrets.secrets.push(PreMint {
                blinded_message: BlindedMessage::new(amount, keyset_id, blinded),
                secret,
                r,
                amount,
            });
            counter += 1;
        }

        Ok(pre_mint_secrets)
    }

    /// Outputs for a restore scan over `start_count..=end_count`
    ///
    /// Restore outputs carry amount zero; the signatures the mint returns
    /// name the real amounts.
    pub fn restore_batch(
        keyset_id: Id,
        xpriv: Xpriv,
        start_count: u32,
        end_count: u32,
    ) -> Result<Self, Error> {
        let mut pre_mint_secrets = PreMintSecrets::default();

        for counter in start_count..=end_count {
            let secret = Secret::from_xpriv(xpriv, keyset_id, counter)?;
            let blinding_factor = SecretKey::from_xpriv(xpriv, keyset_id, counter)?;

            let (blinded, r) =
                crate::dhke::blind_message(&secret.to_bytes(), Some(blinding_factor))?;

            pre_mint_secrets.secrets.push(PreMint {
                blinded_message: BlindedMessage::new(Amount::ZERO, keyset_id, blinded),
                secret,
                r,
                amount: Amount::ZERO,
            });
        }

        Ok(pre_mint_secrets)
    }
}
