//! Token serialization
//!
//! A token is a bundle of proofs plus the mint they are from. V3 is
//! base64url JSON behind `cashuA`; V4 is base64url CBOR behind `cashuB`
//! with single-letter keys and byte-encoded ids and points. V4 is what we
//! emit; both are accepted.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bitcoin::base64::engine::{general_purpose, GeneralPurpose};
use bitcoin::base64::{alphabet, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::Amount;
use crate::dleq::ProofDleq;
use crate::keys::{PublicKey, SecretKey};
use crate::keyset::Id;
use crate::mint_url::MintUrl;
use crate::proofs::{CurrencyUnit, Proof, Proofs, Witness};
use crate::secret::Secret;

pub mod fragment;

/// Token error
#[derive(Debug, Error)]
pub enum Error {
    /// Token had no proofs
    #[error("Proofs required in token")]
    ProofsRequired,
    /// Prefix or version not understood
    #[error("Unsupported token")]
    UnsupportedToken,
    /// Tokens of more than one mint cannot be converted to V4
    #[error("Token cannot span multiple mints")]
    MultipleMints,
    /// Serde Json error
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    /// Utf8 parse error
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    /// Base64 error
    #[error(transparent)]
    Base64(#[from] bitcoin::base64::DecodeError),
    /// CBOR decode error
    #[error(transparent)]
    CborDe(#[from] ciborium::de::Error<std::io::Error>),
    /// CBOR encode error
    #[error(transparent)]
    CborSer(#[from] ciborium::ser::Error<std::io::Error>),
    /// Mint url error
    #[error(transparent)]
    MintUrl(#[from] crate::mint_url::Error),
    /// Keyset error
    #[error(transparent)]
    Keyset(#[from] crate::keyset::Error),
    /// Amount error
    #[error(transparent)]
    Amount(#[from] crate::amount::Error),
}

fn base64_decode(s: &str) -> Result<Vec<u8>, Error> {
    // tokens circulate with and without padding; accept both
    let config = general_purpose::GeneralPurposeConfig::new()
        .with_decode_padding_mode(bitcoin::base64::engine::DecodePaddingMode::Indifferent);
    Ok(GeneralPurpose::new(&alphabet::URL_SAFE, config).decode(s)?)
}

/// Token of either version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Token {
    /// V3, JSON
    TokenV3(TokenV3),
    /// V4, CBOR
    TokenV4(TokenV4),
}

impl Token {
    /// Create a new (V4) token
    pub fn new(
        mint_url: MintUrl,
        proofs: Proofs,
        memo: Option<String>,
        unit: Option<CurrencyUnit>,
    ) -> Self {
        Token::TokenV4(TokenV4::new(mint_url, proofs, memo, unit))
    }

    /// Proofs grouped by mint
    pub fn proofs(&self) -> HashMap<MintUrl, Proofs> {
        match self {
            Self::TokenV3(token) => token.proofs(),
            Self::TokenV4(token) => token.proofs(),
        }
    }

    /// Total value
    pub fn value(&self) -> Result<Amount, Error> {
        match self {
            Self::TokenV3(token) => token.value(),
            Self::TokenV4(token) => token.value(),
        }
    }

    /// Memo
    pub fn memo(&self) -> &Option<String> {
        match self {
            Self::TokenV3(token) => &token.memo,
            Self::TokenV4(token) => &token.memo,
        }
    }

    /// Unit
    pub fn unit(&self) -> &Option<CurrencyUnit> {
        match self {
            Self::TokenV3(token) => &token.unit,
            Self::TokenV4(token) => &token.unit,
        }
    }

    /// Url of the (single) mint
    pub fn mint_url(&self) -> Result<MintUrl, Error> {
        match self {
            Self::TokenV3(token) => {
                let mut urls = token.token.iter().map(|entry| &entry.mint);
                let url = urls.next().ok_or(Error::ProofsRequired)?;
                if urls.any(|other| other != url) {
                    return Err(Error::MultipleMints);
                }
                Ok(url.clone())
            }
            Self::TokenV4(token) => Ok(token.mint_url.clone()),
        }
    }

    /// Serialize as V3, for mints and wallets that predate V4
    pub fn to_v3_string(&self) -> Result<String, Error> {
        let v3: TokenV3 = match self {
            Self::TokenV3(token) => token.clone(),
            Self::TokenV4(token) => token.clone().try_into()?,
        };
        Ok(v3.to_string())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenV3(token) => token.fmt(f),
            Self::TokenV4(token) => token.fmt(f),
        }
    }
}

impl FromStr for Token {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("cashuA") {
            Ok(Token::TokenV3(TokenV3::from_str(s)?))
        } else if s.starts_with("cashuB") {
            Ok(Token::TokenV4(TokenV4::from_str(s)?))
        } else {
            Err(Error::UnsupportedToken)
        }
    }
}

/// One mint's proofs inside a V3 token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenV3Entry {
    /// Url of the mint
    pub mint: MintUrl,
    /// Proofs from that mint
    pub proofs: Proofs,
}

/// V3 token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenV3 {
    /// Proofs by mint
    pub token: Vec<TokenV3Entry>,
    /// Memo
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<CurrencyUnit>,
}

impl TokenV3 {
    /// Create new [`TokenV3`]
    pub fn new(
        mint_url: MintUrl,
        proofs: Proofs,
        memo: Option<String>,
        unit: Option<CurrencyUnit>,
    ) -> Result<Self, Error> {
        if proofs.is_empty() {
            return Err(Error::ProofsRequired);
        }

        Ok(Self {
            token: vec![TokenV3Entry {
                mint: mint_url,
                proofs,
            }],
            memo,
            unit,
        })
    }

    fn proofs(&self) -> HashMap<MintUrl, Proofs> {
        let mut proofs: HashMap<MintUrl, Proofs> = HashMap::new();

        for entry in &self.token {
            proofs
                .entry(entry.mint.clone())
                .or_default()
                .extend(entry.proofs.clone());
        }

        proofs
    }

    fn value(&self) -> Result<Amount, Error> {
        Ok(Amount::try_sum(
            self.token
                .iter()
                .flat_map(|entry| entry.proofs.iter().map(|proof| proof.amount)),
        )?)
    }
}

impl FromStr for TokenV3 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("cashuA").ok_or(Error::UnsupportedToken)?;
        let decoded = base64_decode(s)?;
        let decoded_str = String::from_utf8(decoded)?;
        Ok(serde_json::from_str(&decoded_str)?)
    }
}

impl fmt::Display for TokenV3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        write!(f, "cashuA{}", general_purpose::URL_SAFE.encode(json))
    }
}

/// V4 token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenV4 {
    /// Mint url
    #[serde(rename = "m")]
    pub mint_url: MintUrl,
    /// Unit
    #[serde(rename = "u", skip_serializing_if = "Option::is_none")]
    pub unit: Option<CurrencyUnit>,
    /// Memo
    #[serde(rename = "d", skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Proofs grouped by keyset
    #[serde(rename = "t")]
    pub token: Vec<TokenV4Entry>,
}

impl TokenV4 {
    /// Create new [`TokenV4`], grouping proofs by keyset
    pub fn new(
        mint_url: MintUrl,
        proofs: Proofs,
        memo: Option<String>,
        unit: Option<CurrencyUnit>,
    ) -> Self {
        let mut by_keyset: HashMap<Id, Proofs> = HashMap::new();
        for proof in proofs {
            by_keyset.entry(proof.keyset_id).or_default().push(proof);
        }

        Self {
            mint_url,
            unit,
            memo,
            token: by_keyset
                .into_iter()
                .map(|(keyset_id, proofs)| TokenV4Entry::new(keyset_id, proofs))
                .collect(),
        }
    }

    fn proofs(&self) -> HashMap<MintUrl, Proofs> {
        let proofs = self
            .token
            .iter()
            .flat_map(|entry| {
                entry
                    .proofs
                    .iter()
                    .map(|proof| proof.to_proof(&entry.keyset_id))
            })
            .collect();

        HashMap::from([(self.mint_url.clone(), proofs)])
    }

    fn value(&self) -> Result<Amount, Error> {
        Ok(Amount::try_sum(
            self.token
                .iter()
                .flat_map(|entry| entry.proofs.iter().map(|proof| proof.amount)),
        )?)
    }
}

impl fmt::Display for TokenV4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut data = Vec::new();
        ciborium::into_writer(self, &mut data).map_err(|_| fmt::Error)?;
        write!(f, "cashuB{}", general_purpose::URL_SAFE.encode(data))
    }
}

impl FromStr for TokenV4 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("cashuB").ok_or(Error::UnsupportedToken)?;
        let decoded = base64_decode(s)?;
        Ok(ciborium::from_reader(&decoded[..])?)
    }
}

impl TryFrom<TokenV3> for TokenV4 {
    type Error = Error;

    fn try_from(token: TokenV3) -> Result<Self, Self::Error> {
        let proofs = token.proofs();
        if proofs.len() != 1 {
            return Err(Error::MultipleMints);
        }

        let (mint_url, proofs) = proofs.into_iter().next().ok_or(Error::ProofsRequired)?;

        Ok(TokenV4::new(mint_url, proofs, token.memo, token.unit))
    }
}

impl TryFrom<TokenV4> for TokenV3 {
    type Error = Error;

    fn try_from(token: TokenV4) -> Result<Self, Self::Error> {
        let (mint_url, proofs) = token
            .proofs()
            .into_iter()
            .next()
            .ok_or(Error::ProofsRequired)?;

        TokenV3::new(mint_url, proofs, token.memo, token.unit)
    }
}

/// One keyset's proofs inside a V4 token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenV4Entry {
    /// Keyset id, byte encoded
    #[serde(
        rename = "i",
        serialize_with = "serialize_bytes_id",
        deserialize_with = "deserialize_bytes_id"
    )]
    pub keyset_id: Id,
    /// Proofs
    #[serde(rename = "p")]
    pub proofs: Vec<ProofV4>,
}

impl TokenV4Entry {
    /// Create new [`TokenV4Entry`]
    pub fn new(keyset_id: Id, proofs: Proofs) -> Self {
        Self {
            keyset_id,
            proofs: proofs.into_iter().map(ProofV4::from).collect(),
        }
    }
}

/// Proof inside a V4 token: no keyset id (the entry carries it), points and
/// scalars as bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofV4 {
    /// Amount
    #[serde(rename = "a")]
    pub amount: Amount,
    /// Secret
    #[serde(rename = "s")]
    pub secret: Secret,
    /// Unblinded signature, byte encoded
    #[serde(
        rename = "c",
        serialize_with = "serialize_bytes_pubkey",
        deserialize_with = "deserialize_bytes_pubkey"
    )]
    pub c: PublicKey,
    /// Witness
    #[serde(rename = "w", default, skip_serializing_if = "Option::is_none")]
    pub witness: Option<Witness>,
    /// DLEQ, byte encoded
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub dleq: Option<DleqV4>,
}

impl ProofV4 {
    /// Rebuild a [`Proof`] under `keyset_id`
    pub fn to_proof(&self, keyset_id: &Id) -> Proof {
        Proof {
            amount: self.amount,
            keyset_id: *keyset_id,
            secret: self.secret.clone(),
            c: self.c,
            witness: self.witness.clone(),
            dleq: self.dleq.clone().map(ProofDleq::from),
        }
    }
}

impl From<Proof> for ProofV4 {
    fn from(proof: Proof) -> ProofV4 {
        ProofV4 {
            amount: proof.amount,
            secret: proof.secret,
            c: proof.c,
            witness: proof.witness,
            dleq: proof.dleq.map(DleqV4::from),
        }
    }
}

/// DLEQ in V4 byte form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DleqV4 {
    /// Challenge
    #[serde(
        rename = "e",
        serialize_with = "serialize_bytes_scalar",
        deserialize_with = "deserialize_bytes_scalar"
    )]
    pub e: SecretKey,
    /// Response
    #[serde(
        rename = "s",
        serialize_with = "serialize_bytes_scalar",
        deserialize_with = "deserialize_bytes_scalar"
    )]
    pub s: SecretKey,
    /// Blinding factor
    #[serde(
        rename = "r",
        serialize_with = "serialize_bytes_scalar",
        deserialize_with = "deserialize_bytes_scalar"
    )]
    pub r: SecretKey,
}

impl From<ProofDleq> for DleqV4 {
    fn from(dleq: ProofDleq) -> Self {
        Self {
            e: dleq.e,
            s: dleq.s,
            r: dleq.r,
        }
    }
}

impl From<DleqV4> for ProofDleq {
    fn from(dleq: DleqV4) -> Self {
        Self {
            e: dleq.e,
            s: dleq.s,
            r: dleq.r,
        }
    }
}

fn serialize_bytes_id<S>(id: &Id, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_bytes(&id.to_bytes())
}

fn deserialize_bytes_id<'de, D>(deserializer: D) -> Result<Id, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let bytes = Vec::<u8>::deserialize(deserializer)?;
    Id::from_bytes(&bytes).map_err(serde::de::Error::custom)
}

fn serialize_bytes_pubkey<S>(key: &PublicKey, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_bytes(&key.to_bytes())
}

fn deserialize_bytes_pubkey<'de, D>(deserializer: D) -> Result<PublicKey, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let bytes = Vec::<u8>::deserialize(deserializer)?;
    PublicKey::from_slice(&bytes).map_err(serde::de::Error::custom)
}

fn serialize_bytes_scalar<S>(key: &SecretKey, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_bytes(&key.to_secret_bytes())
}

fn deserialize_bytes_scalar<'de, D>(deserializer: D) -> Result<SecretKey, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let bytes = Vec::<u8>::deserialize(deserializer)?;
    SecretKey::from_slice(&bytes).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v3_round_trip_vector() {
        let token_str = "cashuAeyJ0b2tlbiI6W3sibWludCI6Imh0dHBzOi8vODMzMy5zcGFjZTozMzM4IiwicHJvb2ZzIjpbeyJhbW91bnQiOjIsImlkIjoiMDA5YTFmMjkzMjUzZTQxZSIsInNlY3JldCI6IjQwNzkxNWJjMjEyYmU2MWE3N2UzZTZkMmFlYjRjNzI3OTgwYmRhNTFjZDA2YTZhZmMyOWUyODYxNzY4YTc4MzciLCJDIjoiMDJiYzkwOTc5OTdkODFhZmIyY2M3MzQ2YjVlNDM0NWE5MzQ2YmQyYTUwNmViNzk1ODU5OGE3MmYwY2Y4NTE2M2VhIn0seyJhbW91bnQiOjgsImlkIjoiMDA5YTFmMjkzMjUzZTQxZSIsInNlY3JldCI6ImZlMTUxMDkzMTRlNjFkNzc1NmIwZjhlZTBmMjNhNjI0YWNhYTNmNGUwNDJmNjE0MzNjNzI4YzcwNTdiOTMxYmUiLCJDIjoiMDI5ZThlNTA1MGI4OTBhN2Q2YzA5NjhkYjE2YmMxZDVkNWZhMDQwZWExZGUyODRmNmVjNjlkNjEyOTlmNjcxMDU5In1dfV0sInVuaXQiOiJzYXQiLCJtZW1vIjoiVGhhbmsgeW91LiJ9";

        let token = TokenV3::from_str(token_str).unwrap();

        assert_eq!(
            token.token[0].mint,
            MintUrl::from_str("https://8333.space:3338").unwrap()
        );
        assert_eq!(
            token.token[0].proofs[0].keyset_id,
            Id::from_str("009a1f293253e41e").unwrap()
        );
        assert_eq!(token.unit.clone().unwrap(), CurrencyUnit::Sat);

        let encoded = token.to_string();
        let round_tripped = TokenV3::from_str(&encoded).unwrap();

        assert_eq!(round_tripped, token);
    }

    #[test]
    fn test_v3_padding_indifferent() {
        let with_padding = "cashuAeyJ0b2tlbiI6W3sibWludCI6Imh0dHBzOi8vODMzMy5zcGFjZTozMzM4IiwicHJvb2ZzIjpbeyJhbW91bnQiOjIsImlkIjoiMDA5YTFmMjkzMjUzZTQxZSIsInNlY3JldCI6IjQwNzkxNWJjMjEyYmU2MWE3N2UzZTZkMmFlYjRjNzI3OTgwYmRhNTFjZDA2YTZhZmMyOWUyODYxNzY4YTc4MzciLCJDIjoiMDJiYzkwOTc5OTdkODFhZmIyY2M3MzQ2YjVlNDM0NWE5MzQ2YmQyYTUwNmViNzk1ODU5OGE3MmYwY2Y4NTE2M2VhIn0seyJhbW91bnQiOjgsImlkIjoiMDA5YTFmMjkzMjUzZTQxZSIsInNlY3JldCI6ImZlMTUxMDkzMTRlNjFkNzc1NmIwZjhlZTBmMjNhNjI0YWNhYTNmNGUwNDJmNjE0MzNjNzI4YzcwNTdiOTMxYmUiLCJDIjoiMDI5ZThlNTA1MGI4OTBhN2Q2YzA5NjhkYjE2YmMxZDVkNWZhMDQwZWExZGUyODRmNmVjNjlkNjEyOTlmNjcxMDU5In1dfV0sInVuaXQiOiJzYXQiLCJtZW1vIjoiVGhhbmsgeW91IHZlcnkgbXVjaC4ifQ==";
        let without_padding = &with_padding[..with_padding.len() - 2];

        let a = TokenV3::from_str(with_padding).unwrap();
        let b = TokenV3::from_str(without_padding).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_v4_round_trip_vector() {
        let token_str = "cashuBpGF0gaJhaUgArSaMTR9YJmFwgaNhYQFhc3hAOWE2ZGJiODQ3YmQyMzJiYTc2ZGIwZGYxOTcyMTZiMjlkM2I4Y2MxNDU1M2NkMjc4MjdmYzFjYzk0MmZlZGI0ZWFjWCEDhhhUP_trhpXfStS6vN6So0qWvc2X3O4NfM-Y1HISZ5JhZGlUaGFuayB5b3VhbXVodHRwOi8vbG9jYWxob3N0OjMzMzhhdWNzYXQ=";
        let token = TokenV4::from_str(token_str).unwrap();

        assert_eq!(
            token.mint_url,
            MintUrl::from_str("http://localhost:3338").unwrap()
        );
        assert_eq!(
            token.token[0].keyset_id,
            Id::from_str("00ad268c4d1f5826").unwrap()
        );
        assert_eq!(token.memo.clone().unwrap(), "Thank you");

        let encoded = token.to_string();
        let round_tripped = TokenV4::from_str(&encoded).unwrap();

        assert_eq!(round_tripped, token);
    }

    #[test]
    fn test_v4_multi_keyset_vector() {
        let token_str = "cashuBo2F0gqJhaUgA_9SLj17PgGFwgaNhYQFhc3hAYWNjMTI0MzVlN2I4NDg0YzNjZjE4NTAxNDkyMThhZjkwZjcxNmE1MmJmNGE1ZWQzNDdlNDhlY2MxM2Y3NzM4OGFjWCECRFODGd5IXVW-07KaZCvuWHk3WrnnpiDhHki6SCQh88-iYWlIAK0mjE0fWCZhcIKjYWECYXN4QDEzMjNkM2Q0NzA3YTU4YWQyZTIzYWRhNGU5ZjFmNDlmNWE1YjRhYzdiNzA4ZWIwZDYxZjczOGY0ODMwN2U4ZWVhY1ghAjRWqhENhLSsdHrr2Cw7AFrKUL9Ffr1XN6RBT6w659lNo2FhAWFzeEA1NmJjYmNiYjdjYzY0MDZiM2ZhNWQ1N2QyMTc0ZjRlZmY4YjQ0MDJiMTc2OTI2ZDNhNTdkM2MzZGNiYjU5ZDU3YWNYIQJzEpxXGeWZN5qXSmJjY8MzxWyvwObQGr5G1YCCgHicY2FtdWh0dHA6Ly9sb2NhbGhvc3Q6MzMzOGF1Y3NhdA==";

        let token = Token::from_str(token_str).unwrap();

        assert_eq!(token.value().unwrap(), Amount::from(4));
        assert_eq!(token.unit().clone().unwrap(), CurrencyUnit::Sat);

        match token {
            Token::TokenV4(token) => {
                let ids: Vec<Id> = token.token.iter().map(|t| t.keyset_id).collect();
                assert_eq!(ids.len(), 2);
                assert!(ids.contains(&Id::from_str("00ffd48b8f5ecf80").unwrap()));
                assert!(ids.contains(&Id::from_str("00ad268c4d1f5826").unwrap()));
            }
            Token::TokenV3(_) => panic!("expected a v4 token"),
        }
    }

    #[test]
    fn test_emit_v4_by_default() {
        let proofs: Proofs = serde_json::from_str(
            "[{\"id\":\"009a1f293253e41e\",\"amount\":2,\"secret\":\"407915bc212be61a77e3e6d2aeb4c727980bda51cd06a6afc29e2861768a7837\",\"C\":\"02bc9097997d81afb2cc7346b5e4345a9346bd2a506eb7958598a72f0cf85163ea\"}]",
        )
        .unwrap();

        let token = Token::new(
            MintUrl::from_str("https://mint.example.com").unwrap(),
            proofs,
            None,
            Some(CurrencyUnit::Sat),
        );

        assert!(token.to_string().starts_with("cashuB"));

        // and the V3 form is still reachable
        assert!(token.to_v3_string().unwrap().starts_with("cashuA"));
    }

    #[test]
    fn test_token_with_dleq_round_trips() {
        let proof_json = r#"{"amount": 1,"id": "00882760bfa2eb41","secret": "daf4dd00a2b68a0858a80450f52c8a7d2ccf87d375e43e216e0c571f089f63e9","C": "024369d2d22a80ecf78f3937da9d5f30c1b9f74f0c32684d583cca0fa6a61cdcfc","dleq": {"e": "b31e58ac6527f34975ffab13e70a48b6d2b0d35abc4b03f0151f09ee1a9763d4","s": "8fbae004c59e754d71df67e392b6ae4e29293113ddc2ec86592a0431d16306d8","r": "a6d13fcd7a18442e6076f5e1e7c887ad5de40a019824bdfa9fe740d302e8d861"}}"#;
        let proof: Proof = serde_json::from_str(proof_json).unwrap();

        let token = Token::new(
            MintUrl::from_str("https://mint.example.com").unwrap(),
            vec![proof.clone()],
            None,
            Some(CurrencyUnit::Sat),
        );

        let parsed = Token::from_str(&token.to_string()).unwrap();
        let proofs = parsed.proofs();
        let restored = &proofs
            .get(&MintUrl::from_str("https://mint.example.com").unwrap())
            .unwrap()[0];

        assert_eq!(restored.dleq, proof.dleq);
        assert_eq!(restored.c, proof.c);
    }

    #[test]
    fn test_bad_prefix_rejected() {
        assert!(Token::from_str("casshuA2342").is_err());
        assert!(TokenV3::from_str("eyJ0b2tlbiI6").is_err());
    }
}
