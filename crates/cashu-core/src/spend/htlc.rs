//! Hashed time-lock contract locks
//!
//! The secret's `data` is the SHA-256 of a preimage. Redemption presents the
//! preimage in the witness; tags can additionally require signatures, and a
//! locktime with refund keys gives the sender a way back.

use std::str::FromStr;

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::schnorr::Signature;
use serde::{Deserialize, Serialize};

use super::p2pk::valid_signatures;
use super::{Error, Kind, SpendingConditions, WellKnownSecret};
use crate::keys::SecretKey;
use crate::proofs::{Proof, Witness};
use crate::util::unix_time;

/// HTLC witness: the preimage, plus signatures when the lock requires them
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HtlcWitness {
    /// Preimage of the hash lock
    pub preimage: String,
    /// BIP-340 signatures, hex encoded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<String>>,
}

impl Proof {
    /// Verify the HTLC witness on this proof
    pub fn verify_htlc(&self) -> Result<(), Error> {
        let well_known = WellKnownSecret::try_from(&self.secret)?;
        if well_known.kind != Kind::HTLC {
            return Err(Error::KindMismatch);
        }
        let lock = SpendingConditions::try_from(&well_known)?;

        let hash_lock = match &lock {
            SpendingConditions::Htlc { data, .. } => *data,
            _ => return Err(Error::KindMismatch),
        };

        let witness = match &self.witness {
            Some(Witness::Htlc(witness)) => witness,
            _ => return Err(Error::SignaturesNotProvided),
        };

        let signatures: Vec<Signature> = witness
            .signatures
            .clone()
            .unwrap_or_default()
            .iter()
            .filter_map(|s| Signature::from_str(s).ok())
            .collect();

        let preimage_hash = Sha256Hash::hash(witness.preimage.as_bytes());

        if preimage_hash != hash_lock {
            // The hash path is closed; the refund path may still be open.
            if let Some(locktime) = lock.locktime() {
                if locktime < unix_time() {
                    return match lock.refund_keys() {
                        None => Ok(()),
                        Some(refund_keys) => {
                            let msg = self.secret.as_bytes();
                            if valid_signatures(msg, &refund_keys, &signatures) >= 1 {
                                Ok(())
                            } else {
                                Err(Error::Preimage)
                            }
                        }
                    };
                }
            }
            return Err(Error::Preimage);
        }

        if let Some(pubkeys) = lock.pubkeys() {
            let required = match &lock {
                SpendingConditions::Htlc { conditions, .. } => conditions
                    .as_ref()
                    .and_then(|c| c.num_sigs)
                    .unwrap_or(1),
                _ => 1,
            };

            let msg = self.secret.as_bytes();
            if valid_signatures(msg, &pubkeys, &signatures) < required {
                return Err(Error::ConditionsNotMet);
            }
        }

        Ok(())
    }

    /// Attach the preimage, keeping any signatures already present
    pub fn add_preimage(&mut self, preimage: String) {
        let signatures = self.witness.as_ref().and_then(Witness::signatures);
        self.witness = Some(Witness::Htlc(HtlcWitness {
            preimage,
            signatures,
        }));
    }

    /// Sign this proof's secret and append to the HTLC witness
    pub fn sign_htlc(&mut self, secret_key: &SecretKey) -> Result<(), Error> {
        let signature: Signature = secret_key.sign(self.secret.as_bytes())?;

        match self.witness.as_mut() {
            Some(witness) => witness.add_signatures(vec![signature.to_string()]),
            None => {
                self.witness = Some(Witness::Htlc(HtlcWitness {
                    preimage: String::new(),
                    signatures: Some(vec![signature.to_string()]),
                }));
            }
        }

        Ok(())
    }
}
