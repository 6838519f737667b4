//! Keysets and keyset identifiers
//!
//! A keyset is the mint's bundle of per-amount public keys for one unit and
//! epoch. Its id is derivable by anyone holding the keys, so a wallet can
//! check that a mint is not handing out per-user keys.

use core::fmt;
use core::str::FromStr;
use std::array::TryFromSliceError;
use std::collections::{BTreeMap, HashSet};

use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::Hash;
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{serde_as, VecSkipError};
use thiserror::Error;

use crate::amount::Amount;
use crate::keys::PublicKey;
use crate::proofs::CurrencyUnit;
use crate::util::hex;

/// Keyset error
#[derive(Debug, Error)]
pub enum Error {
    /// Hex Error
    #[error(transparent)]
    Hex(#[from] hex::Error),
    /// Keyset id length invalid
    #[error("Invalid keyset id length")]
    Length,
    /// Keyset id version unknown
    #[error("Unknown keyset id version")]
    UnknownVersion,
    /// Published id does not match the id derived from the keys
    #[error("Keyset id `{expected}` does not match derived id `{derived}`")]
    IdMismatch {
        /// Id the mint published
        expected: Id,
        /// Id derived from the published keys
        derived: Id,
    },
    /// Slice Error
    #[error(transparent)]
    Slice(#[from] TryFromSliceError),
}

/// Keyset id version byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeySetVersion {
    /// Version 00, the current format
    Version00,
}

impl KeySetVersion {
    /// Version as byte
    pub fn to_byte(&self) -> u8 {
        match self {
            Self::Version00 => 0,
        }
    }

    /// Version from byte
    pub fn from_byte(byte: &u8) -> Result<Self, Error> {
        match byte {
            0 => Ok(Self::Version00),
            _ => Err(Error::UnknownVersion),
        }
    }
}

impl fmt::Display for KeySetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySetVersion::Version00 => f.write_str("00"),
        }
    }
}

/// Keyset id: version byte plus the first seven bytes of the hash of the
/// keyset's public keys. 16 lowercase hex chars on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id {
    version: KeySetVersion,
    id: [u8; Self::BYTELEN],
}

impl Id {
    const STRLEN: usize = 14;
    const BYTELEN: usize = 7;

    /// [`Id`] to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        [vec![self.version.to_byte()], self.id.to_vec()].concat()
    }

    /// [`Id`] from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::BYTELEN + 1 {
            return Err(Error::Length);
        }
        Ok(Self {
            version: KeySetVersion::from_byte(&bytes[0])?,
            id: bytes[1..].try_into()?,
        })
    }

    /// Derive the id of a map of keys
    ///
    /// Concatenate the compressed public keys sorted by amount ascending,
    /// SHA-256, keep the first 14 hex chars, prefix the version byte.
    pub fn from_keys(keys: &Keys) -> Self {
        let pubkeys_concat: Vec<u8> = keys
            .iter()
            .map(|(_, pubkey)| pubkey.to_bytes())
            .collect::<Vec<[u8; 33]>>()
            .concat();

        let hash = Sha256::hash(&pubkeys_concat);
        let hex_of_hash = hex::encode(hash.to_byte_array());

        Self {
            version: KeySetVersion::Version00,
            id: hex::decode(&hex_of_hash[0..Self::STRLEN])
                .expect("hex of hash is hex")
                .try_into()
                .expect("seven bytes"),
        }
    }
}

/// Integer form of an id, used as a derivation-path index:
/// big-endian u64 of the eight id bytes, mod 2^31 - 1.
impl TryFrom<Id> for u64 {
    type Error = Error;
    fn try_from(value: Id) -> Result<Self, Self::Error> {
        let bytes: [u8; 8] = value.to_bytes().try_into().map_err(|_| Error::Length)?;
        let int = u64::from_be_bytes(bytes);
        Ok(int % (2_u64.pow(31) - 1))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format!("{}{}", self.version, hex::encode(self.id)))
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::STRLEN + 2 {
            return Err(Error::Length);
        }

        Ok(Self {
            version: KeySetVersion::from_byte(&hex::decode(&s[..2])?[0])?,
            id: hex::decode(&s[2..])?
                .try_into()
                .map_err(|_| Error::Length)?,
        })
    }
}

impl From<&Keys> for Id {
    fn from(keys: &Keys) -> Self {
        Self::from_keys(keys)
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id: String = String::deserialize(deserializer)?;
        Id::from_str(&id).map_err(serde::de::Error::custom)
    }
}

/// Map of amount to the mint public key signing that amount
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Keys(BTreeMap<Amount, PublicKey>);

impl Keys {
    /// Create new [`Keys`]
    #[inline]
    pub fn new(keys: BTreeMap<Amount, PublicKey>) -> Self {
        Self(keys)
    }

    /// Key for `amount`
    #[inline]
    pub fn amount_key(&self, amount: Amount) -> Option<PublicKey> {
        self.0.get(&amount).copied()
    }

    /// Iterate entries sorted by amount ascending
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&Amount, &PublicKey)> {
        self.0.iter()
    }

    /// Number of amounts in the keyset
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the keyset has no keys
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Keyset with full keys, as served by `/v1/keys`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeySet {
    /// Keyset [`Id`]
    pub id: Id,
    /// Keyset [`CurrencyUnit`]
    pub unit: CurrencyUnit,
    /// Keyset [`Keys`]
    pub keys: Keys,
}

impl KeySet {
    /// Check the published id matches the keys
    pub fn verify_id(&self) -> Result<(), Error> {
        let derived = Id::from_keys(&self.keys);

        if derived != self.id {
            return Err(Error::IdMismatch {
                expected: self.id,
                derived,
            });
        }

        Ok(())
    }
}

/// Keyset summary, as served by `/v1/keysets`
#[derive(Debug, Clone, Hash, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeySetInfo {
    /// Keyset [`Id`]
    pub id: Id,
    /// Keyset [`CurrencyUnit`]
    pub unit: CurrencyUnit,
    /// Whether the mint still signs with this keyset
    pub active: bool,
    /// Input fee, parts per thousand proofs
    #[serde(default)]
    pub input_fee_ppk: u64,
}

/// Response to `/v1/keys`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysResponse {
    /// Keysets with full keys
    pub keysets: Vec<KeySet>,
}

/// Response to `/v1/keysets`
///
/// Unknown or malformed entries (e.g. ids of future versions) are skipped
/// rather than failing the whole listing.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysetResponse {
    /// Keyset summaries
    #[serde_as(as = "VecSkipError<_>")]
    pub keysets: Vec<KeySetInfo>,
}

/// Outcome of diffing a stored keyset snapshot against a fresh listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeysetDiff {
    /// Ids that flipped inactive -> active
    pub newly_active: Vec<Id>,
    /// Ids that flipped active -> inactive
    pub newly_inactive: Vec<Id>,
    /// Ids not present in the stored snapshot
    pub unseen: Vec<Id>,
}

impl KeysetDiff {
    /// Diff `current` (fresh from the mint) against `known`
    pub fn between(known: &[KeySetInfo], current: &[KeySetInfo]) -> Self {
        let known_by_id: BTreeMap<Id, &KeySetInfo> =
            known.iter().map(|info| (info.id, info)).collect();

        let mut diff = KeysetDiff::default();

        for info in current {
            match known_by_id.get(&info.id) {
                None => diff.unseen.push(info.id),
                Some(prev) if prev.active && !info.active => diff.newly_inactive.push(info.id),
                Some(prev) if !prev.active && info.active => diff.newly_active.push(info.id),
                Some(_) => (),
            }
        }

        diff
    }

    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        self.newly_active.is_empty() && self.newly_inactive.is_empty() && self.unseen.is_empty()
    }
}

/// Ids of proofs whose keyset is no longer active
pub fn inactive_keyset_ids(keysets: &[KeySetInfo]) -> HashSet<Id> {
    keysets
        .iter()
        .filter(|info| !info.active)
        .map(|info| info.id)
        .collect()
}
