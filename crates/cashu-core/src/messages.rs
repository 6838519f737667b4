//! Mint protocol request and response bodies
//!
//! The JSON shapes exchanged with a mint over `/v1`: quotes, minting,
//! swapping, melting, state checks and restore. Field names follow the wire
//! (snake_case, `B_`, `C_`, `Ys`).

use core::fmt;
use std::str::FromStr;

use lightning_invoice::Bolt11Invoice;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::amount::Amount;
use crate::keys::{PublicKey, SecretKey};
use crate::proofs::{BlindSignature, BlindedMessage, CurrencyUnit, Proofs};

/// Message error
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown quote state
    #[error("Unknown quote state")]
    UnknownState,
    /// Amount overflow
    #[error("Amount overflow")]
    AmountOverflow,
    /// Invoice has no amount and no option supplied one
    #[error("Amount of payment request undefined")]
    AmountUndefined,
    /// Quote signature missing
    #[error("Quote signature not provided")]
    SignatureMissing,
    /// Quote signature invalid
    #[error("Quote signature invalid")]
    InvalidSignature,
    /// Key error
    #[error(transparent)]
    Keys(#[from] crate::keys::Error),
}

/// States of a mint quote
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MintQuoteState {
    /// Invoice not yet paid
    #[default]
    Unpaid,
    /// Invoice paid, ecash can be issued
    Paid,
    /// Ecash issued, terminal
    Issued,
}

impl fmt::Display for MintQuoteState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unpaid => write!(f, "UNPAID"),
            Self::Paid => write!(f, "PAID"),
            Self::Issued => write!(f, "ISSUED"),
        }
    }
}

impl FromStr for MintQuoteState {
    type Err = Error;

    fn from_str(state: &str) -> Result<Self, Self::Err> {
        match state {
            "UNPAID" => Ok(Self::Unpaid),
            "PAID" => Ok(Self::Paid),
            "ISSUED" => Ok(Self::Issued),
            _ => Err(Error::UnknownState),
        }
    }
}

/// Request for a mint quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuoteRequest {
    /// Amount to mint
    pub amount: Amount,
    /// Unit to mint in
    pub unit: CurrencyUnit,
    /// Memo for the invoice
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Key the issuance must be authorized by
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<PublicKey>,
}

/// Mint quote, as the mint reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuoteResponse {
    /// Quote id
    pub quote: String,
    /// Payment request to fulfil
    pub request: String,
    /// Amount
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    /// Unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<CurrencyUnit>,
    /// State of the quote
    pub state: MintQuoteState,
    /// Unix timestamp the quote is valid until
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
    /// Key the issuance must be authorized by
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<PublicKey>,
}

/// Request to issue ecash for a paid quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRequest {
    /// Quote id
    pub quote: String,
    /// Outputs to sign, sorted ascending by amount
    pub outputs: Vec<BlindedMessage>,
    /// BIP-340 signature authorizing the issuance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl MintRequest {
    /// The message a quote signature covers: the quote id followed by the
    /// hex of every `B_`, concatenated as ASCII. Byte-for-byte the NUT-20
    /// reference format.
    pub fn msg_to_sign(&self) -> String {
        let mut msg = String::with_capacity(self.quote.len() + self.outputs.len() * 66);

        msg.push_str(&self.quote);
        for output in &self.outputs {
            msg.push_str(&output.blinded_secret.to_hex());
        }
        msg
    }

    /// Sign the request with the key the quote was locked to
    pub fn sign(&mut self, secret_key: &SecretKey) -> Result<(), Error> {
        let msg = self.msg_to_sign();
        let signature = secret_key.sign(msg.as_bytes())?;
        self.signature = Some(signature.to_string());
        Ok(())
    }

    /// Verify the signature against the quote's key
    pub fn verify_signature(&self, pubkey: PublicKey) -> Result<(), Error> {
        let signature = self.signature.as_ref().ok_or(Error::SignatureMissing)?;

        let signature = bitcoin::secp256k1::schnorr::Signature::from_str(signature)
            .map_err(|_| Error::InvalidSignature)?;

        pubkey
            .verify(self.msg_to_sign().as_bytes(), &signature)
            .map_err(|_| Error::InvalidSignature)
    }

    /// Total amount requested
    pub fn total_amount(&self) -> Result<Amount, Error> {
        Amount::try_sum(self.outputs.iter().map(|output| output.amount))
            .map_err(|_| Error::AmountOverflow)
    }
}

/// Response to a mint request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintResponse {
    /// Signatures, in the order the outputs were sent
    pub signatures: Vec<BlindSignature>,
}

/// Swap request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    /// Proofs being spent
    pub inputs: Proofs,
    /// Outputs to sign, sorted ascending by amount
    pub outputs: Vec<BlindedMessage>,
}

impl SwapRequest {
    /// Create new [`SwapRequest`]
    pub fn new(inputs: Proofs, outputs: Vec<BlindedMessage>) -> Self {
        Self { inputs, outputs }
    }

    /// Total input amount
    pub fn input_amount(&self) -> Result<Amount, Error> {
        Amount::try_sum(self.inputs.iter().map(|proof| proof.amount))
            .map_err(|_| Error::AmountOverflow)
    }

    /// Total output amount
    pub fn output_amount(&self) -> Result<Amount, Error> {
        Amount::try_sum(self.outputs.iter().map(|output| output.amount))
            .map_err(|_| Error::AmountOverflow)
    }
}

/// Response to a swap request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapResponse {
    /// Signatures, in the order the outputs were sent
    pub signatures: Vec<BlindSignature>,
}

/// States of a melt quote
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeltQuoteState {
    /// Not yet paid
    #[default]
    Unpaid,
    /// Payment in flight; inputs are committed
    Pending,
    /// Payment settled
    Paid,
}

impl fmt::Display for MeltQuoteState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unpaid => write!(f, "UNPAID"),
            Self::Pending => write!(f, "PENDING"),
            Self::Paid => write!(f, "PAID"),
        }
    }
}

impl FromStr for MeltQuoteState {
    type Err = Error;

    fn from_str(state: &str) -> Result<Self, Self::Err> {
        match state {
            "UNPAID" => Ok(Self::Unpaid),
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            _ => Err(Error::UnknownState),
        }
    }
}

/// Multi-path payment option: the part of the invoice this mint pays
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mpp {
    /// Partial amount, in msat
    pub amount: Amount,
}

/// Amountless-invoice option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amountless {
    /// Amount to pay, in msat
    pub amount_msat: Amount,
}

/// Options on a melt quote request
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeltOptions {
    /// Pay part of an invoice (NUT-15)
    Mpp {
        /// MPP
        mpp: Mpp,
    },
    /// Supply the amount for an amountless invoice
    Amountless {
        /// Amountless
        amountless: Amountless,
    },
}

impl MeltOptions {
    /// New MPP option
    pub fn new_mpp<A>(amount_msat: A) -> Self
    where
        A: Into<Amount>,
    {
        Self::Mpp {
            mpp: Mpp {
                amount: amount_msat.into(),
            },
        }
    }

    /// Amount carried by the option, msat
    pub fn amount_msat(&self) -> Amount {
        match self {
            Self::Mpp { mpp } => mpp.amount,
            Self::Amountless { amountless } => amountless.amount_msat,
        }
    }
}

/// Request for a melt quote
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltQuoteRequest {
    /// BOLT-11 invoice to pay
    pub request: Bolt11Invoice,
    /// Unit to pay from
    pub unit: CurrencyUnit,
    /// Payment options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<MeltOptions>,
}

impl MeltQuoteRequest {
    /// Amount to pay in msat, from the option or the invoice itself
    pub fn amount_msat(&self) -> Result<Amount, Error> {
        match self.options {
            Some(options) => Ok(options.amount_msat()),
            None => self
                .request
                .amount_milli_satoshis()
                .map(Amount::from)
                .ok_or(Error::AmountUndefined),
        }
    }
}

/// Melt quote, as the mint reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeltQuoteResponse {
    /// Quote id
    pub quote: String,
    /// Amount that will be paid out
    pub amount: Amount,
    /// Fee the mint reserves on top; unspent reserve comes back as change
    pub fee_reserve: Amount,
    /// State of the quote
    pub state: MeltQuoteState,
    /// Unix timestamp the quote is valid until
    pub expiry: u64,
    /// Preimage of the settled payment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_preimage: Option<String>,
    /// Change for overpaid fees, signed blanks in output order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<Vec<BlindSignature>>,
}

// Mints that predate the `state` field report only a boolean `paid`;
// accept both spellings.
impl<'de> Deserialize<'de> for MeltQuoteResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        fn field<T: DeserializeOwned>(value: &Value, name: &'static str) -> Option<T> {
            value
                .get(name)
                .and_then(|raw| serde_json::from_value(raw.clone()).ok())
        }

        let quote: String =
            field(&value, "quote").ok_or_else(|| serde::de::Error::missing_field("quote"))?;
        let amount: Amount =
            field(&value, "amount").ok_or_else(|| serde::de::Error::missing_field("amount"))?;
        let fee_reserve: Amount = field(&value, "fee_reserve")
            .ok_or_else(|| serde::de::Error::missing_field("fee_reserve"))?;
        let expiry: u64 = field(&value, "expiry").unwrap_or_default();

        let state = match field::<String>(&value, "state") {
            Some(state) => MeltQuoteState::from_str(&state)
                .map_err(|_| serde::de::Error::custom("Unknown melt quote state"))?,
            None => match field::<bool>(&value, "paid") {
                Some(true) => MeltQuoteState::Paid,
                Some(false) => MeltQuoteState::Unpaid,
                None => return Err(serde::de::Error::custom("State or paid must be defined")),
            },
        };

        Ok(MeltQuoteResponse {
            quote,
            amount,
            fee_reserve,
            state,
            expiry,
            payment_preimage: field(&value, "payment_preimage"),
            change: field(&value, "change"),
        })
    }
}

/// Request to pay a melt quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltRequest {
    /// Quote id
    pub quote: String,
    /// Proofs covering amount + fee reserve + input fees
    pub inputs: Proofs,
    /// Blank outputs for fee change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<BlindedMessage>>,
}

impl MeltRequest {
    /// Total input amount
    pub fn input_amount(&self) -> Result<Amount, Error> {
        Amount::try_sum(self.inputs.iter().map(|proof| proof.amount))
            .map_err(|_| Error::AmountOverflow)
    }
}

/// State of a proof at the mint
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProofState {
    /// Never seen spent
    Unspent,
    /// Committed to an in-flight transaction
    Pending,
    /// Spent, terminal
    Spent,
}

impl fmt::Display for ProofState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspent => write!(f, "UNSPENT"),
            Self::Pending => write!(f, "PENDING"),
            Self::Spent => write!(f, "SPENT"),
        }
    }
}

/// Request to check proof states by Y
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStateRequest {
    /// `hash_to_curve(secret)` of each proof to check
    #[serde(rename = "Ys")]
    pub ys: Vec<PublicKey>,
}

/// State of one checked proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStateEntry {
    /// Y of the proof
    #[serde(rename = "Y")]
    pub y: PublicKey,
    /// State
    pub state: ProofState,
    /// Witness the proof was spent with, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness: Option<String>,
}

/// Response to a state check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStateResponse {
    /// States, in request order
    pub states: Vec<ProofStateEntry>,
}

/// Restore request: deterministic outputs to look up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequest {
    /// Blinded messages to look up
    pub outputs: Vec<BlindedMessage>,
}

/// Restore response: the subset of outputs the mint has signed, with their
/// signatures, in matching order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResponse {
    /// Outputs the mint recognized
    pub outputs: Vec<BlindedMessage>,
    /// Signatures for those outputs
    #[serde(alias = "promises")]
    pub signatures: Vec<BlindSignature>,
}
