//! Spending conditions
//!
//! A proof's secret may carry a script instead of an opaque preimage: a
//! two-element JSON array `[kind, {nonce, data, tags}]`. The mint enforces
//! the script; the wallet builds locks and completes witnesses. P2PK and
//! HTLC are the two kinds.

use core::fmt;
use std::collections::HashMap;
use std::str::FromStr;

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::keys::PublicKey;
use crate::secret::Secret;
use crate::util::hex;

pub mod htlc;
pub mod p2pk;

/// Spending condition error
#[derive(Debug, Error)]
pub enum Error {
    /// Secret is not of the expected kind
    #[error("Secret kind mismatch")]
    KindMismatch,
    /// Locktime is already in the past when building a lock
    #[error("Locktime in past")]
    LocktimeInPast,
    /// A tag vector had no kind element
    #[error("Tag kind not found")]
    TagKindNotFound,
    /// Tag carried by the secret is not understood
    #[error("Unknown tag")]
    UnknownTag,
    /// Witness signature is not valid
    #[error("Invalid signature")]
    InvalidSignature,
    /// Script conditions were not met
    #[error("Spend conditions are not met")]
    ConditionsNotMet,
    /// Witness did not provide signatures
    #[error("Witness did not provide signatures")]
    SignaturesNotProvided,
    /// Hash lock is not a valid SHA-256 digest
    #[error("Invalid hash lock")]
    InvalidHash,
    /// Preimage does not hash to the lock
    #[error("Preimage does not match")]
    Preimage,
    /// Parse int error
    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),
    /// Hex error
    #[error(transparent)]
    Hex(#[from] hex::Error),
    /// Serde Json error
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    /// Key error
    #[error(transparent)]
    Keys(#[from] crate::keys::Error),
    /// Secp256k1 error
    #[error(transparent)]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
    /// Secret error
    #[error(transparent)]
    Secret(#[from] crate::secret::Error),
}

/// Kind of a structured secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// Pay to public key
    P2PK,
    /// Hashed time-lock contract
    HTLC,
}

/// Payload of a structured secret
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretData {
    /// Unique random string, keeps equal scripts from colliding on Y
    pub nonce: String,
    /// The spending condition: pubkey hex for P2PK, hash-lock hex for HTLC
    pub data: String,
    /// Additional committed data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Vec<String>>>,
}

/// A structured "well-known" secret
///
/// Serialized as the two-element array the mint hashes, with fields in
/// declaration order so the encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct WellKnownSecret {
    /// Kind of the spending condition
    pub kind: Kind,
    /// Secret payload
    pub secret_data: SecretData,
}

impl WellKnownSecret {
    /// Create new [`WellKnownSecret`] with a fresh nonce
    pub fn new<S>(kind: Kind, data: S, tags: Option<Vec<Vec<String>>>) -> Self
    where
        S: Into<String>,
    {
        Self {
            kind,
            secret_data: SecretData {
                nonce: Secret::generate().to_string(),
                data: data.into(),
                tags,
            },
        }
    }

    /// Encode as a proof secret
    pub fn to_secret(&self) -> Result<Secret, Error> {
        Ok(Secret::new(serde_json::to_string(self)?))
    }
}

impl Serialize for WellKnownSecret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.kind)?;
        tuple.serialize_element(&self.secret_data)?;
        tuple.end()
    }
}

/// Signature flag: what a witness signature must cover
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigFlag {
    /// Sign each input's secret
    #[default]
    SigInputs,
    /// Sign all inputs' secrets and all outputs' blinded messages
    SigAll,
}

impl fmt::Display for SigFlag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SigAll => write!(f, "SIG_ALL"),
            Self::SigInputs => write!(f, "SIG_INPUTS"),
        }
    }
}

impl FromStr for SigFlag {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "SIG_ALL" => Ok(Self::SigAll),
            "SIG_INPUTS" => Ok(Self::SigInputs),
            _ => Err(Error::UnknownTag),
        }
    }
}

/// Tag kinds carried in a secret
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagKind {
    /// Signature flag
    SigFlag,
    /// Required signature threshold
    NSigs,
    /// Unix-seconds locktime
    Locktime,
    /// Refund keys
    Refund,
    /// Additional signer keys
    Pubkeys,
    /// Tag this library does not interpret
    Custom(String),
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SigFlag => write!(f, "sigflag"),
            Self::NSigs => write!(f, "n_sigs"),
            Self::Locktime => write!(f, "locktime"),
            Self::Refund => write!(f, "refund"),
            Self::Pubkeys => write!(f, "pubkeys"),
            Self::Custom(kind) => write!(f, "{}", kind),
        }
    }
}

impl<S> From<S> for TagKind
where
    S: AsRef<str>,
{
    fn from(tag: S) -> Self {
        match tag.as_ref() {
            "sigflag" => Self::SigFlag,
            "n_sigs" => Self::NSigs,
            "locktime" => Self::Locktime,
            "refund" => Self::Refund,
            "pubkeys" => Self::Pubkeys,
            t => Self::Custom(t.to_owned()),
        }
    }
}

/// Parse a condition key: compressed 33-byte hex, or 32-byte x-only hex
/// assumed even
pub(crate) fn parse_condition_key(s: &str) -> Result<PublicKey, Error> {
    let bytes = hex::decode(s)?;

    match bytes.len() {
        33 => Ok(PublicKey::from_slice(&bytes)?),
        32 => {
            let xonly = bitcoin::secp256k1::XOnlyPublicKey::from_slice(&bytes)?;
            Ok(bitcoin::secp256k1::PublicKey::from_x_only_public_key(
                xonly,
                bitcoin::secp256k1::Parity::Even,
            )
            .into())
        }
        _ => Err(Error::InvalidSignature),
    }
}

/// The optional conditions shared by P2PK and HTLC secrets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditions {
    /// Unix-seconds locktime
    pub locktime: Option<u64>,
    /// Additional signer keys beyond the data key
    pub pubkeys: Option<Vec<PublicKey>>,
    /// Keys that may spend once the locktime passed
    pub refund_keys: Option<Vec<PublicKey>>,
    /// Required signature threshold, default 1
    pub num_sigs: Option<u64>,
    /// What signatures must cover
    pub sig_flag: SigFlag,
}

impl Conditions {
    /// Create new [`Conditions`], rejecting a locktime already in the past
    pub fn new(
        locktime: Option<u64>,
        pubkeys: Option<Vec<PublicKey>>,
        refund_keys: Option<Vec<PublicKey>>,
        num_sigs: Option<u64>,
        sig_flag: Option<SigFlag>,
    ) -> Result<Self, Error> {
        if let Some(locktime) = locktime {
            if locktime < crate::util::unix_time() {
                return Err(Error::LocktimeInPast);
            }
        }

        Ok(Self {
            locktime,
            pubkeys,
            refund_keys,
            num_sigs,
            sig_flag: sig_flag.unwrap_or_default(),
        })
    }

    /// Encode as tag vectors
    pub fn to_tags(&self) -> Vec<Vec<String>> {
        let mut tags = Vec::new();

        if let Some(pubkeys) = &self.pubkeys {
            let mut tag = vec![TagKind::Pubkeys.to_string()];
            tag.extend(pubkeys.iter().map(|p| p.to_hex()));
            tags.push(tag);
        }

        if let Some(locktime) = self.locktime {
            tags.push(vec![TagKind::Locktime.to_string(), locktime.to_string()]);
        }

        if let Some(num_sigs) = self.num_sigs {
            tags.push(vec![TagKind::NSigs.to_string(), num_sigs.to_string()]);
        }

        if let Some(refund_keys) = &self.refund_keys {
            let mut tag = vec![TagKind::Refund.to_string()];
            tag.extend(refund_keys.iter().map(|p| p.to_hex()));
            tags.push(tag);
        }

        tags.push(vec![
            TagKind::SigFlag.to_string(),
            self.sig_flag.to_string(),
        ]);

        tags
    }
}

impl TryFrom<Vec<Vec<String>>> for Conditions {
    type Error = Error;

    fn try_from(tags: Vec<Vec<String>>) -> Result<Self, Self::Error> {
        let mut by_kind: HashMap<TagKind, Vec<String>> = HashMap::new();
        for tag in tags {
            let kind = TagKind::from(tag.first().ok_or(Error::TagKindNotFound)?);
            by_kind.insert(kind, tag);
        }

        let pubkeys = by_kind
            .get(&TagKind::Pubkeys)
            .map(|tag| {
                tag.iter()
                    .skip(1)
                    .map(|p| parse_condition_key(p))
                    .collect::<Result<Vec<PublicKey>, Error>>()
            })
            .transpose()?;

        let refund_keys = by_kind
            .get(&TagKind::Refund)
            .map(|tag| {
                tag.iter()
                    .skip(1)
                    .map(|p| parse_condition_key(p))
                    .collect::<Result<Vec<PublicKey>, Error>>()
            })
            .transpose()?;

        let locktime = by_kind
            .get(&TagKind::Locktime)
            .and_then(|tag| tag.get(1))
            .map(|raw| raw.parse())
            .transpose()?;

        let num_sigs = by_kind
            .get(&TagKind::NSigs)
            .and_then(|tag| tag.get(1))
            .map(|raw| raw.parse())
            .transpose()?;

        let sig_flag = by_kind
            .get(&TagKind::SigFlag)
            .and_then(|tag| tag.get(1))
            .map(|raw| SigFlag::from_str(raw))
            .transpose()?
            .unwrap_or_default();

        Ok(Conditions {
            locktime,
            pubkeys,
            refund_keys,
            num_sigs,
            sig_flag,
        })
    }
}

/// A lock the wallet can put on new outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpendingConditions {
    /// Pay to public key
    P2pk {
        /// The receiving key
        data: PublicKey,
        /// Extra conditions
        conditions: Option<Conditions>,
    },
    /// Hashed time-lock contract
    Htlc {
        /// Hash lock
        data: Sha256Hash,
        /// Extra conditions
        conditions: Option<Conditions>,
    },
}

impl SpendingConditions {
    /// P2PK lock on `pubkey`
    pub fn new_p2pk(pubkey: PublicKey, conditions: Option<Conditions>) -> Self {
        Self::P2pk {
            data: pubkey,
            conditions,
        }
    }

    /// HTLC lock on the SHA-256 of `preimage`
    pub fn new_htlc(preimage: &str, conditions: Option<Conditions>) -> Self {
        Self::Htlc {
            data: Sha256Hash::hash(preimage.as_bytes()),
            conditions,
        }
    }

    /// Kind of the lock
    pub fn kind(&self) -> Kind {
        match self {
            Self::P2pk { .. } => Kind::P2PK,
            Self::Htlc { .. } => Kind::HTLC,
        }
    }

    /// Keys that can satisfy the lock before any locktime
    pub fn pubkeys(&self) -> Option<Vec<PublicKey>> {
        match self {
            Self::P2pk { data, conditions } => {
                let mut pubkeys = vec![*data];
                if let Some(conditions) = conditions {
                    pubkeys.extend(conditions.pubkeys.clone().unwrap_or_default());
                }
                Some(pubkeys)
            }
            Self::Htlc { conditions, .. } => conditions.as_ref().and_then(|c| c.pubkeys.clone()),
        }
    }

    /// Locktime, if any
    pub fn locktime(&self) -> Option<u64> {
        match self {
            Self::P2pk { conditions, .. } | Self::Htlc { conditions, .. } => {
                conditions.as_ref().and_then(|c| c.locktime)
            }
        }
    }

    /// Refund keys, if any
    pub fn refund_keys(&self) -> Option<Vec<PublicKey>> {
        match self {
            Self::P2pk { conditions, .. } | Self::Htlc { conditions, .. } => {
                conditions.as_ref().and_then(|c| c.refund_keys.clone())
            }
        }
    }

    /// Encode as a fresh proof secret
    pub fn to_secret(self) -> Result<Secret, Error> {
        let well_known: WellKnownSecret = self.into();
        well_known.to_secret()
    }
}

impl From<SpendingConditions> for WellKnownSecret {
    fn from(conditions: SpendingConditions) -> Self {
        match conditions {
            SpendingConditions::P2pk { data, conditions } => WellKnownSecret::new(
                Kind::P2PK,
                data.to_hex(),
                conditions.map(|c| c.to_tags()),
            ),
            SpendingConditions::Htlc { data, conditions } => WellKnownSecret::new(
                Kind::HTLC,
                data.to_string(),
                conditions.map(|c| c.to_tags()),
            ),
        }
    }
}

impl TryFrom<&WellKnownSecret> for SpendingConditions {
    type Error = Error;

    fn try_from(secret: &WellKnownSecret) -> Result<Self, Self::Error> {
        let conditions = secret
            .secret_data
            .tags
            .clone()
            .map(Conditions::try_from)
            .transpose()?;

        match secret.kind {
            Kind::P2PK => Ok(Self::P2pk {
                data: parse_condition_key(&secret.secret_data.data)?,
                conditions,
            }),
            Kind::HTLC => Ok(Self::Htlc {
                data: Sha256Hash::from_str(&secret.secret_data.data)
                    .map_err(|_| Error::InvalidHash)?,
                conditions,
            }),
        }
    }
}
