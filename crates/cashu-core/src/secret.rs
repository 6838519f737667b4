//! Proof secrets
//!
//! The secret is the preimage a note commits to. On the wire it is an opaque
//! UTF-8 string; structured spending conditions (see [`crate::spend`]) ride
//! inside it as JSON.

use std::fmt;
use std::str::FromStr;

use bitcoin::secp256k1::rand::{self, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::hex;

/// Secret error
#[derive(Debug, Error)]
pub enum Error {
    /// Secrets must not be empty
    #[error("Secret is empty")]
    EmptySecret,
    /// Secret is not a structured spending-condition secret
    #[error("Secret is not a spending-condition secret")]
    NotConditional,
    /// Serde Json error
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

/// Secret of a proof
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Default for Secret {
    fn default() -> Self {
        Self::generate()
    }
}

impl Secret {
    /// Create secret from an existing string
    pub fn new<S>(secret: S) -> Self
    where
        S: Into<String>,
    {
        Self(secret.into())
    }

    /// Generate a random secret: 32 bytes, hex encoded
    pub fn generate() -> Self {
        let mut random_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut random_bytes);
        Self(hex::encode(random_bytes))
    }

    /// Secret as bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Secret as owned bytes
    #[inline]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }

    /// Whether this secret carries a spending condition
    pub fn is_conditional(&self) -> bool {
        self.conditional_kind().is_some()
    }

    /// Kind of the spending condition, if any
    pub fn conditional_kind(&self) -> Option<crate::spend::Kind> {
        let parsed: crate::spend::WellKnownSecret = serde_json::from_str(&self.0).ok()?;
        Some(parsed.kind)
    }
}

impl FromStr for Secret {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::EmptySecret);
        }

        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Secret> for crate::spend::WellKnownSecret {
    type Error = Error;

    fn try_from(secret: Secret) -> Result<Self, Self::Error> {
        serde_json::from_str(&secret.0).map_err(|_| Error::NotConditional)
    }
}

impl TryFrom<&Secret> for crate::spend::WellKnownSecret {
    type Error = Error;

    fn try_from(secret: &Secret) -> Result<Self, Self::Error> {
        serde_json::from_str(&secret.0).map_err(|_| Error::NotConditional)
    }
}
