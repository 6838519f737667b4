//! Notation and models
//!
//! Blinded messages (outputs), blind signatures (promises) and proofs
//! (notes), together with the pre-mint bookkeeping a wallet keeps between
//! blinding its secrets and unblinding the mint's signatures.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::amount::{Amount, SplitTarget};
use crate::dhke::blind_message;
use crate::dleq::ProofDleq;
use crate::keys::{PublicKey, SecretKey};
use crate::keyset::Id;
use crate::secret::Secret;
use crate::spend::htlc::HtlcWitness;
use crate::spend::p2pk::P2pkWitness;
use crate::spend::SpendingConditions;

/// List of [Proof]
pub type Proofs = Vec<Proof>;

/// Model error
#[derive(Debug, Error)]
pub enum Error {
    /// Unsupported unit
    #[error("Unsupported unit")]
    UnsupportedUnit,
    /// DHKE error
    #[error(transparent)]
    Dhke(#[from] crate::dhke::Error),
    /// Amount error
    #[error(transparent)]
    Amount(#[from] crate::amount::Error),
    /// Secret error
    #[error(transparent)]
    Secret(#[from] crate::secret::Error),
    /// Spending condition error
    #[error(transparent)]
    Spend(#[from] crate::spend::Error),
}

/// Blinded message, an `output` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlindedMessage {
    /// Amount of the requested signature
    pub amount: Amount,
    /// Keyset the signature is expected from
    #[serde(rename = "id")]
    pub keyset_id: Id,
    /// Blinded secret `B_ = Y + rG`
    #[serde(rename = "B_")]
    pub blinded_secret: PublicKey,
    /// Witness for output signing (SIG_ALL)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness: Option<Witness>,
}

impl BlindedMessage {
    /// Compose new [`BlindedMessage`]
    #[inline]
    pub fn new(amount: Amount, keyset_id: Id, blinded_secret: PublicKey) -> Self {
        Self {
            amount,
            keyset_id,
            blinded_secret,
            witness: None,
        }
    }
}

/// Blind signature, a `promise` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindSignature {
    /// Amount the signature is worth
    pub amount: Amount,
    /// Keyset that signed
    #[serde(rename = "id")]
    pub keyset_id: Id,
    /// Blinded signature `C_ = k * B_`
    #[serde(rename = "C_")]
    pub c: PublicKey,
    /// DLEQ proof of correct signing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dleq: Option<crate::dleq::BlindSignatureDleq>,
}

/// Witness carried on a proof (or output), out of the secret
///
/// On the wire the witness is a JSON string holding the witness object, so
/// redemption never mutates the secret itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Witness {
    /// P2PK witness
    P2pk(P2pkWitness),
    /// HTLC witness
    Htlc(HtlcWitness),
}

impl Witness {
    /// Append signatures
    pub fn add_signatures(&mut self, signatures: Vec<String>) {
        match self {
            Self::P2pk(witness) => witness.signatures.extend(signatures),
            Self::Htlc(witness) => witness
                .signatures
                .get_or_insert_with(Vec::new)
                .extend(signatures),
        }
    }

    /// Signatures on the witness
    pub fn signatures(&self) -> Option<Vec<String>> {
        match self {
            Self::P2pk(witness) => Some(witness.signatures.clone()),
            Self::Htlc(witness) => witness.signatures.clone(),
        }
    }

    /// Hash-lock preimage, when present
    pub fn preimage(&self) -> Option<String> {
        match self {
            Self::P2pk(_) => None,
            Self::Htlc(witness) => Some(witness.preimage.clone()),
        }
    }
}

impl Serialize for Witness {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let json = match self {
            Self::P2pk(witness) => serde_json::to_string(witness),
            Self::Htlc(witness) => serde_json::to_string(witness),
        }
        .map_err(serde::ser::Error::custom)?;

        serializer.serialize_str(&json)
    }
}

impl<'de> Deserialize<'de> for Witness {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;

        if let Ok(htlc) = serde_json::from_str::<HtlcWitness>(&s) {
            return Ok(Self::Htlc(htlc));
        }

        serde_json::from_str::<P2pkWitness>(&s)
            .map(Self::P2pk)
            .map_err(serde::de::Error::custom)
    }
}

impl From<P2pkWitness> for Witness {
    fn from(witness: P2pkWitness) -> Self {
        Self::P2pk(witness)
    }
}

impl From<HtlcWitness> for Witness {
    fn from(witness: HtlcWitness) -> Self {
        Self::Htlc(witness)
    }
}

/// A spendable note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Amount
    pub amount: Amount,
    /// Keyset the note was signed by
    #[serde(rename = "id")]
    pub keyset_id: Id,
    /// Secret message
    pub secret: Secret,
    /// Unblinded signature `C = k * hash_to_curve(secret)`
    #[serde(rename = "C")]
    pub c: PublicKey,
    /// Witness
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness: Option<Witness>,
    /// DLEQ proof
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dleq: Option<ProofDleq>,
}

impl Proof {
    /// Create new [`Proof`]
    pub fn new(amount: Amount, keyset_id: Id, secret: Secret, c: PublicKey) -> Self {
        Proof {
            amount,
            keyset_id,
            secret,
            c,
            witness: None,
            dleq: None,
        }
    }

    /// `Y = hash_to_curve(secret)`, the stable identifier the mint tracks
    pub fn y(&self) -> Result<PublicKey, Error> {
        Ok(crate::dhke::hash_to_curve(self.secret.as_bytes())?)
    }
}

impl Hash for Proof {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.secret.hash(state);
    }
}

impl Ord for Proof {
    fn cmp(&self, other: &Self) -> Ordering {
        self.amount.cmp(&other.amount)
    }
}

impl PartialOrd for Proof {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Currency unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum CurrencyUnit {
    /// Satoshi
    #[default]
    Sat,
    /// Millisatoshi
    Msat,
    /// US dollar cent
    Usd,
    /// Euro cent
    Eur,
    /// Blind auth token unit
    Auth,
    /// Unit this library has no special handling for
    Custom(String),
}

impl FromStr for CurrencyUnit {
    type Err = Error;
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sat" => Ok(Self::Sat),
            "msat" => Ok(Self::Msat),
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            "auth" => Ok(Self::Auth),
            other => Ok(Self::Custom(other.to_string())),
        }
    }
}

impl fmt::Display for CurrencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrencyUnit::Sat => write!(f, "sat"),
            CurrencyUnit::Msat => write!(f, "msat"),
            CurrencyUnit::Usd => write!(f, "usd"),
            CurrencyUnit::Eur => write!(f, "eur"),
            CurrencyUnit::Auth => write!(f, "auth"),
            CurrencyUnit::Custom(unit) => write!(f, "{}", unit),
        }
    }
}

impl Serialize for CurrencyUnit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CurrencyUnit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let currency: String = String::deserialize(deserializer)?;
        Self::from_str(&currency).map_err(|_| serde::de::Error::custom("Unsupported unit"))
    }
}

/// Payment method
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum PaymentMethod {
    /// BOLT-11 invoice
    #[default]
    Bolt11,
    /// Method this library has no special handling for
    Custom(String),
}

impl FromStr for PaymentMethod {
    type Err = Error;
    fn from_str(method: &str) -> Result<Self, Self::Err> {
        match method {
            "bolt11" => Ok(Self::Bolt11),
            other => Ok(Self::Custom(other.to_string())),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Bolt11 => write!(f, "bolt11"),
            PaymentMethod::Custom(method) => write!(f, "{}", method),
        }
    }
}

impl Serialize for PaymentMethod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PaymentMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let method: String = String::deserialize(deserializer)?;
        Self::from_str(&method).map_err(serde::de::Error::custom)
    }
}

/// One blinded output with the material needed to unblind it later
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreMint {
    /// Blinded message
    pub blinded_message: BlindedMessage,
    /// Secret
    pub secret: Secret,
    /// Blinding factor
    pub r: SecretKey,
    /// Amount
    pub amount: Amount,
}

impl Ord for PreMint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.amount.cmp(&other.amount)
    }
}

impl PartialOrd for PreMint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The wallet's side of a pending mint or swap: every output it sent
/// together with the secrets and blinding factors to unblind the answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreMintSecrets {
    /// Secrets
    pub secrets: Vec<PreMint>,
}

impl PreMintSecrets {
    /// Outputs for an amount with random secrets
    pub fn random(
        keyset_id: Id,
        amount: Amount,
        amount_split_target: &SplitTarget,
    ) -> Result<Self, Error> {
        let amount_split = amount.split_targeted(amount_split_target)?;

        let mut output = Vec::with_capacity(amount_split.len());

        for amount in amount_split {
            let secret = Secret::generate();
            let (blinded, r) = blind_message(&secret.to_bytes(), None)?;

            output.push(PreMint {
                blinded_message: BlindedMessage::new(amount, keyset_id, blinded),
                secret,
                r,
                amount,
            });
        }

        Ok(PreMintSecrets { secrets: output })
    }

    /// Outputs from predetermined secrets
    pub fn from_secrets(
        keyset_id: Id,
        amounts: Vec<Amount>,
        secrets: Vec<Secret>,
    ) -> Result<Self, Error> {
        let mut output = Vec::with_capacity(secrets.len());

        for (secret, amount) in secrets.into_iter().zip(amounts) {
            let (blinded, r) = blind_message(&secret.to_bytes(), None)?;

            output.push(PreMint {
                blinded_message: BlindedMessage::new(amount, keyset_id, blinded),
                secret,
                r,
                amount,
            });
        }

        Ok(PreMintSecrets { secrets: output })
    }

    /// Blank outputs for melt fee return
    ///
    /// `max(ceil(log2(fee_reserve)), 1)` outputs with placeholder amount
    /// zero; the mint picks the change denominations.
    pub fn blank(keyset_id: Id, fee_reserve: Amount) -> Result<Self, Error> {
        if fee_reserve == Amount::ZERO {
            return Ok(PreMintSecrets::default());
        }

        let count = ((u64::from(fee_reserve) as f64).log2().ceil() as u64).max(1);

        let mut output = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let secret = Secret::generate();
            let (blinded, r) = blind_message(&secret.to_bytes(), None)?;

            output.push(PreMint {
                blinded_message: BlindedMessage::new(Amount::ZERO, keyset_id, blinded),
                secret,
                r,
                amount: Amount::ZERO,
            });
        }

        Ok(PreMintSecrets { secrets: output })
    }

    /// Outputs locked by spending conditions
    pub fn with_conditions(
        keyset_id: Id,
        amount: Amount,
        amount_split_target: &SplitTarget,
        conditions: &SpendingConditions,
    ) -> Result<Self, Error> {
        let amount_split = amount.split_targeted(amount_split_target)?;

        let mut output = Vec::with_capacity(amount_split.len());

        for amount in amount_split {
            let secret: Secret = conditions.clone().to_secret()?;
            let (blinded, r) = blind_message(&secret.to_bytes(), None)?;

            output.push(PreMint {
                blinded_message: BlindedMessage::new(amount, keyset_id, blinded),
                secret,
                r,
                amount,
            });
        }

        Ok(PreMintSecrets { secrets: output })
    }

    /// Iterate over the pre-mints
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &PreMint> {
        self.secrets.iter()
    }

    /// Number of outputs
    #[inline]
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Whether there are no outputs
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Total amount of the outputs
    pub fn total_amount(&self) -> Result<Amount, Error> {
        Ok(Amount::try_sum(
            self.secrets.iter().map(|PreMint { amount, .. }| *amount),
        )?)
    }

    /// The blinded messages, in output order
    #[inline]
    pub fn blinded_messages(&self) -> Vec<BlindedMessage> {
        self.iter().map(|pm| pm.blinded_message.clone()).collect()
    }

    /// The secrets, in output order
    #[inline]
    pub fn secrets(&self) -> Vec<Secret> {
        self.iter().map(|pm| pm.secret.clone()).collect()
    }

    /// The blinding factors, in output order
    #[inline]
    pub fn rs(&self) -> Vec<SecretKey> {
        self.iter().map(|pm| pm.r.clone()).collect()
    }

    /// Append another batch
    #[inline]
    pub fn combine(&mut self, mut other: Self) {
        self.secrets.append(&mut other.secrets)
    }

    /// Sort outputs by amount ascending, the order they go on the wire
    #[inline]
    pub fn sort_secrets(&mut self) {
        self.secrets.sort();
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_proofs_deserialize() {
        let proof = "[{\"id\":\"009a1f293253e41e\",\"amount\":2,\"secret\":\"407915bc212be61a77e3e6d2aeb4c727980bda51cd06a6afc29e2861768a7837\",\"C\":\"02bc9097997d81afb2cc7346b5e4345a9346bd2a506eb7958598a72f0cf85163ea\"},{\"id\":\"009a1f293253e41e\",\"amount\":8,\"secret\":\"fe15109314e61d7756b0f8ee0f23a624acaa3f4e042f61433c728c7057b931be\",\"C\":\"029e8e5050b890a7d6c0968db16bc1d5d5fa040ea1de284f6ec69d61299f671059\"}]";
        let proofs: Proofs = serde_json::from_str(proof).unwrap();

        assert_eq!(proofs.len(), 2);
        assert_eq!(
            proofs[0].keyset_id,
            Id::from_str("009a1f293253e41e").unwrap()
        );
    }

    #[test]
    fn test_blank_output_count() {
        let keyset_id = Id::from_str("009a1f293253e41e").unwrap();

        assert_eq!(
            PreMintSecrets::blank(keyset_id, Amount::from(1000))
                .unwrap()
                .len(),
            10
        );
        // ceil(log2(64)) = 6
        assert_eq!(
            PreMintSecrets::blank(keyset_id, Amount::from(64))
                .unwrap()
                .len(),
            6
        );
        assert_eq!(
            PreMintSecrets::blank(keyset_id, Amount::from(1))
                .unwrap()
                .len(),
            1
        );
        assert!(PreMintSecrets::blank(keyset_id, Amount::ZERO)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_random_outputs_cover_amount() {
        let keyset_id = Id::from_str("009a1f293253e41e").unwrap();
        let premint =
            PreMintSecrets::random(keyset_id, Amount::from(1000), &SplitTarget::None).unwrap();

        assert_eq!(premint.total_amount().unwrap(), Amount::from(1000));
        for pm in premint.iter() {
            assert!(u64::from(pm.amount).is_power_of_two());
        }
    }

    #[test]
    fn test_sorted_outputs_ascending() {
        let keyset_id = Id::from_str("009a1f293253e41e").unwrap();
        let mut premint =
            PreMintSecrets::random(keyset_id, Amount::from(77), &SplitTarget::None).unwrap();
        premint.sort_secrets();

        let amounts: Vec<Amount> = premint.iter().map(|pm| pm.amount).collect();
        let mut sorted = amounts.clone();
        sorted.sort();
        assert_eq!(amounts, sorted);
    }

    #[test]
    fn test_unit_round_trip() {
        for unit in ["sat", "msat", "usd", "eur", "auth", "wat"] {
            let parsed = CurrencyUnit::from_str(unit).unwrap();
            assert_eq!(parsed.to_string(), unit);
        }
    }
}
