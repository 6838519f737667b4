//! Mint auth
//!
//! Two schemes, both declared per-endpoint by the mint. Clear auth is a
//! plain OIDC bearer token in the `Clear-auth` header. Blind auth spends
//! one single-use token per call: the tokens are themselves ecash proofs of
//! amount one on the mint's auth keyset, minted in batches while clear
//! auth is held, so later calls do not link back to the user's identity.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use bitcoin::base64::engine::general_purpose;
use bitcoin::base64::Engine as _;
use cashu_core::dhke::hash_to_curve;
use cashu_core::dleq::ProofDleq;
use cashu_core::keys::PublicKey;
use cashu_core::keyset::Id;
use cashu_core::proofs::{BlindedMessage, Proof};
use cashu_core::secret::Secret;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tokio::sync::RwLock;

use crate::oidc::OidcClient;

/// Auth error
#[derive(Debug, ThisError)]
pub enum Error {
    /// Token prefix not understood
    #[error("Invalid prefix")]
    InvalidPrefix,
    /// Base64 error
    #[error(transparent)]
    Base64(#[from] bitcoin::base64::DecodeError),
    /// JSON error
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    /// Utf8 error
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    /// DHKE error
    #[error(transparent)]
    Dhke(#[from] cashu_core::dhke::Error),
}

/// A token attached to a protected request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthToken {
    /// OIDC bearer token
    ClearAuth(String),
    /// Single-use blind auth token
    BlindAuth(BlindAuthToken),
}

impl AuthToken {
    /// Header the token rides in
    pub fn header_key(&self) -> &'static str {
        match self {
            Self::ClearAuth(_) => "Clear-auth",
            Self::BlindAuth(_) => "Blind-auth",
        }
    }

    /// Header value
    pub fn to_header_value(&self) -> String {
        match self {
            Self::ClearAuth(cat) => cat.clone(),
            Self::BlindAuth(bat) => bat.to_string(),
        }
    }
}

/// An auth proof: a proof of amount one on the auth keyset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthProof {
    /// Keyset the proof was signed by
    #[serde(rename = "id")]
    pub keyset_id: Id,
    /// Secret
    pub secret: Secret,
    /// Unblinded signature
    #[serde(rename = "C")]
    pub c: PublicKey,
    /// DLEQ, kept locally, stripped before sending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dleq: Option<ProofDleq>,
}

impl AuthProof {
    /// Y of this proof
    pub fn y(&self) -> Result<PublicKey, Error> {
        Ok(hash_to_curve(self.secret.as_bytes())?)
    }
}

impl From<AuthProof> for Proof {
    fn from(value: AuthProof) -> Self {
        Self {
            amount: 1.into(),
            keyset_id: value.keyset_id,
            secret: value.secret,
            c: value.c,
            witness: None,
            dleq: value.dleq,
        }
    }
}

impl From<Proof> for AuthProof {
    fn from(value: Proof) -> Self {
        Self {
            keyset_id: value.keyset_id,
            secret: value.secret,
            c: value.c,
            dleq: value.dleq,
        }
    }
}

/// Wire form of a blind auth token: `authA` + base64url(JSON of the proof)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindAuthToken {
    /// The proof being spent
    pub auth_proof: AuthProof,
}

impl BlindAuthToken {
    /// Create new [`BlindAuthToken`]
    pub fn new(auth_proof: AuthProof) -> Self {
        BlindAuthToken { auth_proof }
    }

    /// Strip the DLEQ before sending
    ///
    /// The carried `r` would let the mint link this redemption to the mint
    /// request that created the token.
    pub fn without_dleq(&self) -> Self {
        Self {
            auth_proof: AuthProof {
                dleq: None,
                ..self.auth_proof.clone()
            },
        }
    }
}

impl fmt::Display for BlindAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.auth_proof).map_err(|_| fmt::Error)?;
        write!(f, "authA{}", general_purpose::URL_SAFE.encode(json))
    }
}

impl FromStr for BlindAuthToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded = s.strip_prefix("authA").ok_or(Error::InvalidPrefix)?;
        let json = String::from_utf8(general_purpose::URL_SAFE.decode(encoded)?)?;
        let auth_proof: AuthProof = serde_json::from_str(&json)?;
        Ok(BlindAuthToken { auth_proof })
    }
}

/// Request to mint blind auth tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintAuthRequest {
    /// Outputs, amount one each
    pub outputs: Vec<BlindedMessage>,
}

impl MintAuthRequest {
    /// Number of tokens requested
    pub fn amount(&self) -> u64 {
        self.outputs.len() as u64
    }
}

/// Holds the wallet's auth material
///
/// Shared by the connector (which reads tokens to attach) and the wallet
/// (which logs in and restocks blind tokens).
#[derive(Debug, Default)]
pub struct AuthWallet {
    oidc: Option<OidcClient>,
    client_id: Option<String>,
    cat: RwLock<Option<String>>,
    refresh_token: RwLock<Option<String>>,
    blind_tokens: Mutex<VecDeque<BlindAuthToken>>,
}

impl AuthWallet {
    /// Auth wallet for a mint that declared clear auth
    pub fn new(openid_discovery: String, client_id: String) -> Self {
        Self {
            oidc: Some(OidcClient::new(openid_discovery)),
            client_id: Some(client_id),
            ..Self::default()
        }
    }

    /// The OIDC client, when clear auth is configured
    pub fn oidc(&self) -> Option<&OidcClient> {
        self.oidc.as_ref()
    }

    /// Adopt externally obtained tokens (e.g. from an authorization-code
    /// flow run by the embedder)
    pub async fn set_tokens(&self, cat: String, refresh_token: Option<String>) {
        *self.cat.write().await = Some(cat);
        *self.refresh_token.write().await = refresh_token;
    }

    /// Current clear auth token
    pub async fn clear_auth_token(&self) -> Option<String> {
        self.cat.read().await.clone()
    }

    /// Log in with the device-code grant, blocking until approved
    pub async fn device_login(&self) -> Result<(), crate::error::Error> {
        let (oidc, client_id) = self.oidc_parts()?;

        let device = oidc.start_device_flow(client_id.clone()).await?;
        tracing::info!(
            "Complete login at {} with code {}",
            device.verification_uri,
            device.user_code
        );

        let token = oidc.wait_for_device_token(client_id, &device).await?;
        oidc.verify_token(&token.access_token).await?;

        self.set_tokens(token.access_token, token.refresh_token)
            .await;
        Ok(())
    }

    /// Refresh the clear auth token
    pub async fn refresh(&self) -> Result<(), crate::error::Error> {
        let (oidc, client_id) = self.oidc_parts()?;

        let refresh_token = self
            .refresh_token
            .read()
            .await
            .clone()
            .ok_or(crate::error::Error::AuthExpired)?;

        let token = oidc.refresh_access_token(client_id, refresh_token).await?;
        oidc.verify_token(&token.access_token).await?;

        self.set_tokens(token.access_token, token.refresh_token)
            .await;
        Ok(())
    }

    fn oidc_parts(&self) -> Result<(OidcClient, String), crate::error::Error> {
        let oidc = self
            .oidc
            .clone()
            .ok_or(crate::error::Error::AuthRequired)?;
        let client_id = self
            .client_id
            .clone()
            .ok_or(crate::error::Error::AuthRequired)?;
        Ok((oidc, client_id))
    }

    /// Stock freshly minted blind tokens
    pub fn add_blind_tokens(&self, tokens: Vec<BlindAuthToken>) {
        if let Ok(mut queue) = self.blind_tokens.lock() {
            queue.extend(tokens);
        }
    }

    /// Take one blind token for a protected call, consuming it
    pub fn next_blind_token(&self) -> Option<BlindAuthToken> {
        self.blind_tokens
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
    }

    /// Blind tokens remaining
    pub fn blind_token_count(&self) -> usize {
        self.blind_tokens.lock().map(|queue| queue.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use cashu_core::keys::SecretKey;

    use super::*;

    fn auth_proof() -> AuthProof {
        AuthProof {
            keyset_id: Id::from_str("009a1f293253e41e").unwrap(),
            secret: Secret::generate(),
            c: SecretKey::generate().public_key(),
            dleq: None,
        }
    }

    #[test]
    fn test_blind_auth_token_round_trip() {
        let token = BlindAuthToken::new(auth_proof());

        let encoded = token.to_string();
        assert!(encoded.starts_with("authA"));

        let decoded = BlindAuthToken::from_str(&encoded).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn test_without_dleq() {
        let mut proof = auth_proof();
        proof.dleq = Some(ProofDleq::new(
            SecretKey::generate(),
            SecretKey::generate(),
            SecretKey::generate(),
        ));

        let token = BlindAuthToken::new(proof);
        assert!(token.without_dleq().auth_proof.dleq.is_none());
    }

    #[test]
    fn test_tokens_consumed_once() {
        let wallet = AuthWallet::default();

        wallet.add_blind_tokens(vec![
            BlindAuthToken::new(auth_proof()),
            BlindAuthToken::new(auth_proof()),
        ]);

        assert_eq!(wallet.blind_token_count(), 2);
        let first = wallet.next_blind_token().unwrap();
        let second = wallet.next_blind_token().unwrap();
        assert_ne!(first, second);
        assert!(wallet.next_blind_token().is_none());
    }

    #[test]
    fn test_header_keys() {
        assert_eq!(
            AuthToken::ClearAuth("jwt".to_string()).header_key(),
            "Clear-auth"
        );
        assert_eq!(
            AuthToken::BlindAuth(BlindAuthToken::new(auth_proof())).header_key(),
            "Blind-auth"
        );
    }
}
