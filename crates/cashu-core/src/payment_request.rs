//! Payment requests
//!
//! A payment request asks a counterparty for ecash: amount, unit, acceptable
//! mints, an optional lock, and how to deliver the payment (nostr DM or an
//! HTTP POST). Encoded as `creqA` + base64url(CBOR). The same encoding rides
//! the `X-Cashu` header when a server answers 402.

use std::fmt;
use std::str::FromStr;

use bitcoin::base64::engine::{general_purpose, GeneralPurpose};
use bitcoin::base64::{alphabet, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::Amount;
use crate::mint_url::MintUrl;
use crate::proofs::{CurrencyUnit, Proofs};
use crate::spend::{Kind, SpendingConditions, WellKnownSecret};

const PAYMENT_REQUEST_PREFIX: &str = "creqA";

/// Header carrying a payment request on a 402 response, and the paying
/// token on the retry
pub const X_CASHU: &str = "X-Cashu";

/// Payment request error
#[derive(Debug, Error)]
pub enum Error {
    /// Prefix not understood
    #[error("Invalid prefix")]
    InvalidPrefix,
    /// Transport type not understood
    #[error("Invalid transport type")]
    InvalidTransportType,
    /// Base64 error
    #[error(transparent)]
    Base64(#[from] bitcoin::base64::DecodeError),
    /// CBOR decode error
    #[error(transparent)]
    CborDe(#[from] ciborium::de::Error<std::io::Error>),
    /// CBOR encode error
    #[error(transparent)]
    CborSer(#[from] ciborium::ser::Error<std::io::Error>),
}

/// How a payment should be delivered
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportType {
    /// Nostr DM to an nprofile
    #[serde(rename = "nostr")]
    Nostr,
    /// HTTP POST to a url
    #[serde(rename = "post")]
    HttpPost,
}

impl FromStr for TransportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nostr" => Ok(Self::Nostr),
            "post" => Ok(Self::HttpPost),
            _ => Err(Error::InvalidTransportType),
        }
    }
}

/// A delivery transport
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transport {
    /// Type
    #[serde(rename = "t")]
    pub transport_type: TransportType,
    /// Target: an nprofile or a url
    #[serde(rename = "a")]
    pub target: String,
    /// Tags, e.g. the accepted nostr NIPs
    #[serde(rename = "g")]
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tags: Option<Vec<Vec<String>>>,
}

/// A lock the payer should apply, carried without a nonce: the payer picks
/// the nonce when building the outputs
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    /// Condition data
    pub data: String,
    /// Condition tags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Vec<String>>>,
}

/// Kind plus lock data, tuple-encoded like a well-known secret
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Nut10LockRequest {
    /// Kind of the lock
    pub kind: Kind,
    /// The lock
    pub lock: LockRequest,
}

impl Serialize for Nut10LockRequest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeTuple;
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.kind)?;
        tuple.serialize_element(&self.lock)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Nut10LockRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (kind, lock): (Kind, LockRequest) = Deserialize::deserialize(deserializer)?;
        Ok(Self { kind, lock })
    }
}

impl From<SpendingConditions> for Nut10LockRequest {
    fn from(conditions: SpendingConditions) -> Self {
        let well_known: WellKnownSecret = conditions.into();
        Self {
            kind: well_known.kind,
            lock: LockRequest {
                data: well_known.secret_data.data,
                tags: well_known.secret_data.tags,
            },
        }
    }
}

/// Payment request
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Payment id, echoed back in the payload
    #[serde(rename = "i")]
    pub payment_id: Option<String>,
    /// Amount
    #[serde(rename = "a")]
    pub amount: Option<Amount>,
    /// Unit
    #[serde(rename = "u")]
    pub unit: Option<CurrencyUnit>,
    /// Whether the request may be paid only once
    #[serde(rename = "s")]
    pub single_use: Option<bool>,
    /// Mints the payee accepts
    #[serde(rename = "m")]
    pub mints: Option<Vec<MintUrl>>,
    /// Description
    #[serde(rename = "d")]
    pub description: Option<String>,
    /// Transports, any one of which may be used
    #[serde(rename = "t")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<Transport>>,
    /// Lock the payer should apply to the proofs
    pub nut10: Option<Nut10LockRequest>,
}

impl PaymentRequest {
    /// Create a new [`PaymentRequestBuilder`]
    pub fn builder() -> PaymentRequestBuilder {
        PaymentRequestBuilder::default()
    }
}

impl fmt::Display for PaymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut data = Vec::new();
        ciborium::into_writer(self, &mut data).map_err(|_| fmt::Error)?;
        let encoded = general_purpose::URL_SAFE.encode(data);
        write!(f, "{PAYMENT_REQUEST_PREFIX}{encoded}")
    }
}

impl FromStr for PaymentRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s
            .strip_prefix(PAYMENT_REQUEST_PREFIX)
            .ok_or(Error::InvalidPrefix)?;

        let config = general_purpose::GeneralPurposeConfig::new()
            .with_decode_padding_mode(bitcoin::base64::engine::DecodePaddingMode::Indifferent);
        let decoded = GeneralPurpose::new(&alphabet::URL_SAFE, config).decode(s)?;

        Ok(ciborium::from_reader(&decoded[..])?)
    }
}

/// Builder for [`PaymentRequest`]
#[derive(Debug, Default, Clone)]
pub struct PaymentRequestBuilder {
    payment_id: Option<String>,
    amount: Option<Amount>,
    unit: Option<CurrencyUnit>,
    single_use: Option<bool>,
    mints: Option<Vec<MintUrl>>,
    description: Option<String>,
    transports: Vec<Transport>,
    nut10: Option<Nut10LockRequest>,
}

impl PaymentRequestBuilder {
    /// Set payment id
    pub fn payment_id<S>(mut self, payment_id: S) -> Self
    where
        S: Into<String>,
    {
        self.payment_id = Some(payment_id.into());
        self
    }

    /// Set amount
    pub fn amount<A>(mut self, amount: A) -> Self
    where
        A: Into<Amount>,
    {
        self.amount = Some(amount.into());
        self
    }

    /// Set unit
    pub fn unit(mut self, unit: CurrencyUnit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Set single-use flag
    pub fn single_use(mut self, single_use: bool) -> Self {
        self.single_use = Some(single_use);
        self
    }

    /// Add an acceptable mint
    pub fn add_mint(mut self, mint_url: MintUrl) -> Self {
        self.mints.get_or_insert_with(Vec::new).push(mint_url);
        self
    }

    /// Set description
    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a transport
    pub fn add_transport(mut self, transport: Transport) -> Self {
        self.transports.push(transport);
        self
    }

    /// Set the lock
    pub fn nut10<L>(mut self, lock: L) -> Self
    where
        L: Into<Nut10LockRequest>,
    {
        self.nut10 = Some(lock.into());
        self
    }

    /// Build the [`PaymentRequest`]
    pub fn build(self) -> PaymentRequest {
        let transports = (!self.transports.is_empty()).then_some(self.transports);

        PaymentRequest {
            payment_id: self.payment_id,
            amount: self.amount,
            unit: self.unit,
            single_use: self.single_use,
            mints: self.mints,
            description: self.description,
            transports,
            nut10: self.nut10,
        }
    }
}

/// The payload delivered over a transport in settlement of a request
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequestPayload {
    /// Payment id being settled
    pub id: Option<String>,
    /// Memo
    pub memo: Option<String>,
    /// Mint the proofs are from
    pub mint: MintUrl,
    /// Unit
    pub unit: CurrencyUnit,
    /// The payment itself
    pub proofs: Proofs,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYMENT_REQUEST: &str = "creqApWF0gaNhdGVub3N0cmFheKlucHJvZmlsZTFxeTI4d3VtbjhnaGo3dW45ZDNzaGp0bnl2OWtoMnVld2Q5aHN6OW1od2RlbjV0ZTB3ZmprY2N0ZTljdXJ4dmVuOWVlaHFjdHJ2NWhzenJ0aHdkZW41dGUwZGVoaHh0bnZkYWtxcWd5ZGFxeTdjdXJrNDM5eWtwdGt5c3Y3dWRoZGh1NjhzdWNtMjk1YWtxZWZkZWhrZjBkNDk1Y3d1bmw1YWeBgmFuYjE3YWloYjdhOTAxNzZhYQphdWNzYXRhbYF4Imh0dHBzOi8vbm9mZWVzLnRlc3RudXQuY2FzaHUuc3BhY2U=";

    #[test]
    fn test_decode_reference_request() {
        let req = PaymentRequest::from_str(PAYMENT_REQUEST).unwrap();

        assert_eq!(req.payment_id.as_deref(), Some("b7a90176"));
        assert_eq!(req.amount, Some(10.into()));
        assert_eq!(req.unit.clone().unwrap(), CurrencyUnit::Sat);
        assert_eq!(
            req.mints.unwrap(),
            vec![MintUrl::from_str("https://nofees.testnut.cashu.space").unwrap()]
        );

        let transports = req.transports.unwrap();
        let transport = transports.first().unwrap();

        assert_eq!(transport.transport_type, TransportType::Nostr);
        assert!(transport.target.starts_with("nprofile1"));
        assert_eq!(
            transport.tags,
            Some(vec![vec!["n".to_string(), "17".to_string()]])
        );
    }

    #[test]
    fn test_round_trip() {
        let transport = Transport {
            transport_type: TransportType::HttpPost,
            target: "https://pay.example.com/callback".to_string(),
            tags: None,
        };

        let request = PaymentRequest::builder()
            .payment_id("b7a90176")
            .amount(Amount::from(10))
            .unit(CurrencyUnit::Sat)
            .single_use(true)
            .add_mint(MintUrl::from_str("https://mint.example.com").unwrap())
            .add_transport(transport.clone())
            .build();

        let encoded = request.to_string();
        assert!(encoded.starts_with("creqA"));

        let decoded = PaymentRequest::from_str(&encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_request_with_lock_round_trip() {
        let pubkey = crate::keys::SecretKey::generate().public_key();
        let lock = SpendingConditions::new_p2pk(pubkey, None);

        let request = PaymentRequest::builder()
            .unit(CurrencyUnit::Sat)
            .amount(Amount::from(10))
            .nut10(lock)
            .build();

        let decoded = PaymentRequest::from_str(&request.to_string()).unwrap();

        let nut10 = decoded.nut10.unwrap();
        assert_eq!(nut10.kind, Kind::P2PK);
        assert_eq!(nut10.lock.data, pubkey.to_hex());
    }

    #[test]
    fn test_x_cashu_header_carries_request() {
        // what a 402 handler would put in the header, and the client read back
        let request = PaymentRequest::builder()
            .amount(Amount::from(1))
            .unit(CurrencyUnit::Sat)
            .build();

        let header_value = request.to_string();
        let parsed = PaymentRequest::from_str(&header_value).unwrap();

        assert_eq!(parsed, request);
        assert_eq!(X_CASHU, "X-Cashu");
    }

    #[test]
    fn test_bad_prefix_rejected() {
        assert!(PaymentRequest::from_str("creqBAAAA").is_err());
    }
}
