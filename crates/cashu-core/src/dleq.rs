//! Discrete-log-equality proofs
//!
//! A DLEQ proof lets anyone holding the mint key `K` check that the `k` used
//! to sign a blinded message is the same `k` committed in `K = kG`, without
//! talking to the mint. Alice checks the blind signature straight off the
//! wire; Carol, receiving a proof second hand, additionally needs the
//! blinding factor `r` to reconstruct what Alice saw.

use bitcoin::secp256k1::Scalar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dhke::{hash_e, hash_to_curve};
use crate::keys::{PublicKey, SecretKey};
use crate::proofs::{BlindSignature, Proof};

/// DLEQ error
#[derive(Debug, Error)]
pub enum Error {
    /// No DLEQ proof attached
    #[error("No DLEQ proof provided")]
    MissingDleqProof,
    /// DLEQ proof did not verify
    #[error("Invalid DLEQ proof")]
    InvalidDleqProof,
    /// DHKE error
    #[error(transparent)]
    Dhke(#[from] crate::dhke::Error),
    /// Key error
    #[error(transparent)]
    Keys(#[from] crate::keys::Error),
}

/// DLEQ attached to a blind signature: `{e, s}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindSignatureDleq {
    /// Challenge
    pub e: SecretKey,
    /// Response
    pub s: SecretKey,
}

/// DLEQ carried on a proof: `{e, s, r}`
///
/// `r` lets the receiver rebuild the blinded pair. It also links the proof
/// to its issuance, so it must never be shown to anyone who does not already
/// hold the proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofDleq {
    /// Challenge
    pub e: SecretKey,
    /// Response
    pub s: SecretKey,
    /// Blinding factor
    pub r: SecretKey,
}

impl ProofDleq {
    /// Create new [`ProofDleq`]
    pub fn new(e: SecretKey, s: SecretKey, r: SecretKey) -> Self {
        Self { e, s, r }
    }
}

/// Core verification shared by the Alice and Carol paths
///
/// ```text
/// R1 = s*G - e*K
/// R2 = s*B_ - e*C_
/// e == hash(R1, R2, K, C_)
/// ```
fn verify_dleq(
    blinded_message: PublicKey,   // B_
    blinded_signature: PublicKey, // C_
    e: &SecretKey,
    s: &SecretKey,
    mint_pubkey: PublicKey, // K
) -> Result<(), Error> {
    let e_bytes: [u8; 32] = e.to_secret_bytes();
    let e_scalar: Scalar = e.as_scalar();

    // R1 = s*G - e*K
    let ek: PublicKey = mint_pubkey.mul_tweak(&e_scalar)?;
    let r1: PublicKey = s.public_key().sub(&ek)?;

    // R2 = s*B_ - e*C_
    let sb: PublicKey = blinded_message.mul_tweak(&s.as_scalar())?;
    let ec: PublicKey = blinded_signature.mul_tweak(&e_scalar)?;
    let r2: PublicKey = sb.sub(&ec)?;

    let expected: [u8; 32] = hash_e([r1, r2, mint_pubkey, blinded_signature]);

    if e_bytes != expected {
        tracing::warn!("DLEQ verification failed");
        return Err(Error::InvalidDleqProof);
    }

    Ok(())
}

/// Generate a DLEQ proof for `C_ = k * B_`
///
/// Mint side; kept as the oracle for tests and for checking our own math.
///
/// ```text
/// r' = random nonce
/// e  = hash(r'G, r'B_, K, C_)
/// s  = r' + e*k
/// ```
pub fn generate_dleq(
    blinded_signature: PublicKey, // C_
    blinded_message: &PublicKey,  // B_
    mint_secret_key: &SecretKey,  // k
) -> Result<BlindSignatureDleq, Error> {
    let nonce: SecretKey = SecretKey::generate();

    let r1 = nonce.public_key();
    let r2: PublicKey = blinded_message.mul_tweak(&nonce.as_scalar())?;

    let e: [u8; 32] = hash_e([r1, r2, mint_secret_key.public_key(), blinded_signature]);
    let e_sk: SecretKey = SecretKey::from_slice(&e)?;

    // s = r' + e*k mod n
    let ek: SecretKey = e_sk.mul_tweak(&mint_secret_key.as_scalar())?;
    let s: SecretKey = nonce.add_tweak(&ek.as_scalar())?;

    Ok(BlindSignatureDleq { e: e_sk, s })
}

impl BlindSignature {
    /// Alice-side DLEQ check, right after minting
    ///
    /// The wallet still holds `B_`, so no reconstruction is needed.
    pub fn verify_dleq(
        &self,
        mint_pubkey: PublicKey,
        blinded_message: PublicKey,
    ) -> Result<(), Error> {
        match &self.dleq {
            Some(dleq) => verify_dleq(blinded_message, self.c, &dleq.e, &dleq.s, mint_pubkey),
            None => Err(Error::MissingDleqProof),
        }
    }
}

impl Proof {
    /// Carol-side DLEQ check, on receipt of a proof
    ///
    /// Rebuilds `B_ = Y + rG` and `C_ = C + rK` from the carried `r`, then
    /// runs the Alice check.
    pub fn verify_dleq(&self, mint_pubkey: PublicKey) -> Result<(), Error> {
        match &self.dleq {
            Some(dleq) => {
                let y = hash_to_curve(self.secret.as_bytes())?;

                let rk: PublicKey = mint_pubkey.mul_tweak(&dleq.r.as_scalar())?;
                let blinded_signature: PublicKey = self.c.combine(&rk)?;
                let blinded_message: PublicKey = y.combine(&dleq.r.public_key())?;

                verify_dleq(
                    blinded_message,
                    blinded_signature,
                    &dleq.e,
                    &dleq.s,
                    mint_pubkey,
                )
            }
            None => Err(Error::MissingDleqProof),
        }
    }

    /// Drop the DLEQ from a retained proof
    ///
    /// The `r` inside links the proof to its issuance; once verified there
    /// is no reason to keep carrying it.
    pub fn strip_dleq(&mut self) {
        self.dleq = None;
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::dhke::{blind_message, sign_message};

    #[test]
    fn test_blind_signature_dleq_vector() {
        let blinded_sig = r#"{"amount":8,"id":"00882760bfa2eb41","C_":"02a9acc1e48c25eeeb9289b5031cc57da9fe72f3fe2861d264bdc074209b107ba2","dleq":{"e":"9818e061ee51d5c8edc3342369a554998ff7b4381c8652d724cdf46429be73d9","s":"9818e061ee51d5c8edc3342369a554998ff7b4381c8652d724cdf46429be73da"}}"#;

        let blinded: BlindSignature = serde_json::from_str(blinded_sig).unwrap();

        let secret_key =
            SecretKey::from_hex("0000000000000000000000000000000000000000000000000000000000000001")
                .unwrap();

        let blinded_secret = PublicKey::from_str(
            "02a9acc1e48c25eeeb9289b5031cc57da9fe72f3fe2861d264bdc074209b107ba2",
        )
        .unwrap();

        blinded
            .verify_dleq(secret_key.public_key(), blinded_secret)
            .unwrap()
    }

    #[test]
    fn test_proof_dleq_vector() {
        let proof = r#"{"amount": 1,"id": "00882760bfa2eb41","secret": "daf4dd00a2b68a0858a80450f52c8a7d2ccf87d375e43e216e0c571f089f63e9","C": "024369d2d22a80ecf78f3937da9d5f30c1b9f74f0c32684d583cca0fa6a61cdcfc","dleq": {"e": "b31e58ac6527f34975ffab13e70a48b6d2b0d35abc4b03f0151f09ee1a9763d4","s": "8fbae004c59e754d71df67e392b6ae4e29293113ddc2ec86592a0431d16306d8","r": "a6d13fcd7a18442e6076f5e1e7c887ad5de40a019824bdfa9fe740d302e8d861"}}"#;

        let proof: Proof = serde_json::from_str(proof).unwrap();

        // K
        let k: PublicKey = PublicKey::from_str(
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();

        assert!(proof.verify_dleq(k).is_ok());
    }

    #[test]
    fn test_generate_then_verify() {
        let mint_key = SecretKey::generate();
        let (blinded, _r) = blind_message(b"some-secret", None).unwrap();
        let signed = sign_message(&mint_key, &blinded).unwrap();

        let dleq = generate_dleq(signed, &blinded, &mint_key).unwrap();

        let signature = BlindSignature {
            amount: 1.into(),
            keyset_id: crate::keyset::Id::from_str("009a1f293253e41e").unwrap(),
            c: signed,
            dleq: Some(dleq.clone()),
        };

        assert!(signature
            .verify_dleq(mint_key.public_key(), blinded)
            .is_ok());

        // a flipped challenge or response must not verify
        let bad = BlindSignature {
            dleq: Some(BlindSignatureDleq {
                e: dleq.s.clone(),
                s: dleq.e.clone(),
            }),
            ..signature.clone()
        };
        assert!(bad.verify_dleq(mint_key.public_key(), blinded).is_err());

        let tampered = BlindSignature {
            dleq: Some(BlindSignatureDleq {
                e: dleq.e.clone(),
                s: SecretKey::generate(),
            }),
            ..signature
        };
        assert!(tampered
            .verify_dleq(mint_key.public_key(), blinded)
            .is_err());
    }
}
