//! Receiving: redeem a token into own proofs
//!
//! A received token is immediately swapped into secrets only this wallet
//! knows; until that swap settles the sender can still double-spend it.
//! Locked proofs get their witnesses completed here, and any carried DLEQ
//! is verified so a forwarded proof cannot be a mint-forgery.

use std::collections::HashMap;
use std::str::FromStr;

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;
use cashu_core::amount::Amount;
use cashu_core::dhke::construct_proofs;
use cashu_core::fees::proofs_fee;
use cashu_core::keys::{PublicKey, SecretKey};
use cashu_core::messages::SwapRequest;
use cashu_core::proofs::Proof;
use cashu_core::spend::p2pk::sig_all_msg;
use cashu_core::spend::{Kind, SigFlag, SpendingConditions, WellKnownSecret};
use cashu_core::token::Token;
use tracing::instrument;

use super::Wallet;
use crate::error::Error;
use crate::types::ProofStatus;

/// Keys and preimages available for unlocking received proofs
#[derive(Debug, Clone, Default)]
pub struct ReceiveOptions {
    /// Keys to satisfy P2PK (and HTLC signature) conditions with
    pub signing_keys: Vec<SecretKey>,
    /// Preimages to satisfy HTLC hash locks with
    pub preimages: Vec<String>,
}

impl Wallet {
    /// Redeem a serialized token
    ///
    /// Returns the amount credited: the token's value minus the swap's
    /// input fee.
    #[instrument(skip_all)]
    pub async fn receive(&self, token: &str, options: ReceiveOptions) -> Result<Amount, Error> {
        let token = Token::from_str(token).map_err(|_| Error::InvalidToken)?;

        if token.mint_url()? != self.mint_url {
            return Err(Error::IncorrectMint);
        }
        if let Some(unit) = token.unit() {
            if unit != &self.unit {
                return Err(Error::UnitMismatch);
            }
        }

        let mut proofs = token
            .proofs()
            .remove(&self.mint_url)
            .ok_or(Error::InvalidToken)?;
        if proofs.is_empty() {
            return Err(Error::InvalidToken);
        }

        // preimages indexed by the hash they open
        let preimages: HashMap<String, String> = options
            .preimages
            .iter()
            .map(|preimage| {
                (
                    Sha256Hash::hash(preimage.as_bytes()).to_string(),
                    preimage.clone(),
                )
            })
            .collect();

        let mut sig_all = false;

        for proof in proofs.iter_mut() {
            self.verify_incoming_dleq(proof).await?;

            let Ok(well_known) = WellKnownSecret::try_from(&proof.secret) else {
                continue;
            };
            let lock = SpendingConditions::try_from(&well_known)?;

            if let Kind::HTLC = well_known.kind {
                let hash = match &lock {
                    SpendingConditions::Htlc { data, .. } => data.to_string(),
                    _ => unreachable!("kind checked above"),
                };
                let preimage = preimages
                    .get(&hash)
                    .ok_or(cashu_core::spend::Error::Preimage)?;
                proof.add_preimage(preimage.clone());
            }

            let sig_flag = match &lock {
                SpendingConditions::P2pk { conditions, .. }
                | SpendingConditions::Htlc { conditions, .. } => conditions
                    .as_ref()
                    .map(|c| c.sig_flag)
                    .unwrap_or_default(),
            };

            if sig_flag == SigFlag::SigAll {
                sig_all = true;
                continue;
            }

            for key in
                matching_keys(&options.signing_keys, &lock, self.now())
            {
                match well_known.kind {
                    Kind::P2PK => proof.sign_p2pk(&key)?,
                    Kind::HTLC => proof.sign_htlc(&key)?,
                }
            }
        }

        let fees = {
            if self.keyset_fees().await?.is_empty() {
                self.refresh_keysets().await?;
            }
            self.keyset_fees().await?
        };

        let input_total = Amount::try_sum(proofs.iter().map(|p| p.amount))?;
        let fee = proofs_fee(&proofs, &fees)?;
        let output_total = input_total
            .checked_sub(fee)
            .ok_or(cashu_core::amount::Error::AmountOverflow)?;

        let active = self.active_keyset().await?;
        let premint = {
            let _guard = self.op_lock.lock().await;
            self.premint_secrets(active.id, output_total, &self.split_target)
                .await?
        };

        let outputs = premint.blinded_messages();

        // one signature over the whole transcript, carried on the first input
        if sig_all {
            let msg = sig_all_msg(&proofs, &outputs);
            let mut signatures = Vec::new();
            for key in &options.signing_keys {
                signatures.push(key.sign(&msg)?.to_string());
            }
            if signatures.is_empty() {
                return Err(cashu_core::spend::Error::SignaturesNotProvided.into());
            }
            if let Some(first) = proofs.first_mut() {
                match first.witness.as_mut() {
                    Some(witness) => witness.add_signatures(signatures),
                    None => {
                        first.witness = Some(cashu_core::proofs::Witness::P2pk(
                            cashu_core::spend::p2pk::P2pkWitness { signatures },
                        ))
                    }
                }
            }
        }

        let request = SwapRequest::new(proofs, outputs);
        let response = self.connector.post_swap(request).await?;

        let keys = self.keyset_keys(active.id).await?;
        self.verify_signatures(&premint.secrets, &response.signatures, &keys)?;

        let new_proofs = construct_proofs(
            response.signatures,
            premint.rs(),
            premint.secrets(),
            &keys,
        )?;

        {
            let _guard = self.op_lock.lock().await;
            self.store
                .add_proofs(self.mint_url.clone(), new_proofs, ProofStatus::Unspent)
                .await?;
        }

        Ok(output_total)
    }

    /// Carol-side DLEQ verification on a received proof
    async fn verify_incoming_dleq(&self, proof: &Proof) -> Result<(), Error> {
        if proof.dleq.is_none() {
            return Ok(());
        }

        let keys = self.keyset_keys(proof.keyset_id).await?;
        let key = keys
            .amount_key(proof.amount)
            .ok_or(Error::CouldNotVerifyDleq)?;

        proof
            .verify_dleq(key)
            .map_err(|_| Error::CouldNotVerifyDleq)
    }
}

/// The provided keys that can currently satisfy the lock: the lock's
/// signing keys before any locktime, its refund keys after
fn matching_keys(
    keys: &[SecretKey],
    lock: &SpendingConditions,
    now: u64,
) -> Vec<SecretKey> {
    let locktime_passed = lock.locktime().map(|t| t < now).unwrap_or(false);

    let eligible: Vec<PublicKey> = if locktime_passed {
        lock.refund_keys().unwrap_or_default()
    } else {
        lock.pubkeys().unwrap_or_default()
    };

    keys.iter()
        .filter(|key| eligible.contains(&key.public_key()))
        .cloned()
        .collect()
}
