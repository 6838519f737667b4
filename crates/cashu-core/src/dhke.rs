//! Blind Diffie-Hellman key exchange
//!
//! The blind-signature primitive the whole protocol rests on:
//!
//! ```text
//! Y  = hash_to_curve(x)
//! B_ = Y + rG                    (wallet blinds)
//! C_ = kB_                       (mint signs)
//! C  = C_ - rK = kY              (wallet unblinds)
//! ```

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Parity, PublicKey as RawPublicKey, XOnlyPublicKey};
use thiserror::Error;

use crate::dleq::ProofDleq;
use crate::keys::{PublicKey, SecretKey};
use crate::keyset::Keys;
use crate::proofs::{BlindSignature, Proof, Proofs};
use crate::secret::Secret;
use crate::util::hex;

const DOMAIN_SEPARATOR: &[u8; 28] = b"Secp256k1_HashToCurve_Cashu_";

/// The counter bound after which hash_to_curve gives up. Each attempt
/// succeeds with probability ~1/2, so reaching this implies a broken digest.
const MAX_HASH_TO_CURVE_ATTEMPTS: u32 = 1 << 16;

/// DHKE error
#[derive(Debug, Error)]
pub enum Error {
    /// hash_to_curve exhausted its counter without finding a point
    #[error("No valid point found")]
    NoValidPoint,
    /// Mint did not publish a key for the amount
    #[error("No key for amount")]
    MissingAmountKey,
    /// Signature count does not line up with the outputs sent
    #[error("Signatures do not match outputs")]
    LengthMismatch,
    /// Unblinded signature failed verification against the mint key
    #[error("Signature is not valid for secret")]
    InvalidSignature,
    /// Key error
    #[error(transparent)]
    Keys(#[from] crate::keys::Error),
}

/// Map a message to a curve point, domain separated
///
/// `m = SHA256("Secp256k1_HashToCurve_Cashu_" || msg)`, then for counter
/// c = 0,1,… (little-endian u32) the first `0x02 || SHA256(m || c)` that
/// parses as a compressed point wins.
pub fn hash_to_curve(message: &[u8]) -> Result<PublicKey, Error> {
    let msg_to_hash: Vec<u8> = [DOMAIN_SEPARATOR, message].concat();
    let msg_hash: [u8; 32] = Sha256Hash::hash(&msg_to_hash).to_byte_array();

    let mut bytes_to_hash: Vec<u8> = Vec::with_capacity(36);
    for counter in 0..MAX_HASH_TO_CURVE_ATTEMPTS {
        bytes_to_hash.clear();
        bytes_to_hash.extend_from_slice(&msg_hash);
        bytes_to_hash.extend_from_slice(&counter.to_le_bytes());
        let hash: [u8; 32] = Sha256Hash::hash(&bytes_to_hash).to_byte_array();

        if let Ok(pk) = XOnlyPublicKey::from_slice(&hash) {
            return Ok(RawPublicKey::from_x_only_public_key(pk, Parity::Even).into());
        }
    }

    Err(Error::NoValidPoint)
}

/// Challenge hash for DLEQ proofs
///
/// SHA256 over the concatenated hex of the uncompressed encodings, as ASCII.
pub fn hash_e<I>(public_keys: I) -> [u8; 32]
where
    I: IntoIterator<Item = PublicKey>,
{
    let mut e: String = String::new();

    for public_key in public_keys.into_iter() {
        let uncompressed: [u8; 65] = public_key.to_uncompressed_bytes();
        e.push_str(&hex::encode(uncompressed));
    }

    Sha256Hash::hash(e.as_bytes()).to_byte_array()
}

/// Blind a secret: `B_ = Y + rG`
///
/// A fresh `r` is drawn from the OS rng unless the caller derived one
/// deterministically.
pub fn blind_message(
    secret: &[u8],
    blinding_factor: Option<SecretKey>,
) -> Result<(PublicKey, SecretKey), Error> {
    let y: PublicKey = hash_to_curve(secret)?;
    let r: SecretKey = blinding_factor.unwrap_or_else(SecretKey::generate);
    Ok((y.combine(&r.public_key())?, r))
}

/// Unblind a signature: `C = C_ - rK`
pub fn unblind_message(
    blinded_signature: &PublicKey,
    r: &SecretKey,
    mint_pubkey: &PublicKey,
) -> Result<PublicKey, Error> {
    let rk: PublicKey = mint_pubkey.mul_tweak(&r.as_scalar())?;
    Ok(blinded_signature.sub(&rk)?)
}

/// Unblind a batch of signatures into proofs
///
/// Signatures, blinding factors and secrets must be parallel, in the order
/// the outputs were sent. A DLEQ carried on a signature is completed with
/// the blinding factor so the proof stays verifiable by a receiver.
pub fn construct_proofs(
    signatures: Vec<BlindSignature>,
    rs: Vec<SecretKey>,
    secrets: Vec<Secret>,
    keys: &Keys,
) -> Result<Proofs, Error> {
    if signatures.len() != rs.len() || signatures.len() != secrets.len() {
        return Err(Error::LengthMismatch);
    }

    let mut proofs = Vec::with_capacity(signatures.len());
    for ((signature, r), secret) in signatures.into_iter().zip(rs).zip(secrets) {
        let mint_pubkey = keys
            .amount_key(signature.amount)
            .ok_or(Error::MissingAmountKey)?;

        let c = unblind_message(&signature.c, &r, &mint_pubkey)?;
        let dleq = signature
            .dleq
            .map(|d| ProofDleq::new(d.e, d.s, r.clone()));

        proofs.push(Proof {
            amount: signature.amount,
            keyset_id: signature.keyset_id,
            secret,
            c,
            witness: None,
            dleq,
        });
    }

    Ok(proofs)
}

/// Mint-side signing: `C_ = k * B_`
///
/// Lives here as the oracle for round-trip tests; the wallet never signs.
pub fn sign_message(k: &SecretKey, blinded_message: &PublicKey) -> Result<PublicKey, Error> {
    Ok(blinded_message.mul_tweak(&k.as_scalar())?)
}

/// Mint-side verification: `C == k * hash_to_curve(msg)`
pub fn verify_message(k: &SecretKey, c: PublicKey, msg: &[u8]) -> Result<(), Error> {
    let y: PublicKey = hash_to_curve(msg)?;

    if c == y.mul_tweak(&k.as_scalar())? {
        return Ok(());
    }

    Err(Error::InvalidSignature)
}
