//! OpenID Connect client
//!
//! The clear-auth side of mint auth: discovery, the device-code and
//! refresh-token grants, and local validation of the bearer token against
//! the issuer's JWKS before it is ever sent.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

/// OIDC error
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP error
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// JWT error
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    /// Token has no kid header
    #[error("Missing kid header")]
    MissingKidHeader,
    /// No JWK matches the token's kid
    #[error("No key for kid")]
    UnknownKid,
    /// Signing algorithm not supported
    #[error("Unsupported signing algorithm")]
    UnsupportedSigningAlgo,
    /// User has not approved the device yet
    #[error("Authorization pending")]
    AuthorizationPending,
    /// Polling faster than the server allows
    #[error("Slow down")]
    SlowDown,
    /// Device code expired before approval
    #[error("Device code expired")]
    Expired,
    /// User denied the request
    #[error("Access denied")]
    AccessDenied,
    /// Token endpoint returned an error this client does not know
    #[error("Token endpoint error: {0}")]
    TokenEndpoint(String),
}

/// Discovery document, the subset this client uses
#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    /// JWKS url
    pub jwks_uri: String,
    /// Issuer, validated against the token's `iss`
    pub issuer: String,
    /// Token endpoint
    pub token_endpoint: String,
    /// Device authorization endpoint
    pub device_authorization_endpoint: String,
}

#[derive(Debug, Clone, Serialize)]
struct RefreshTokenRequest {
    grant_type: &'static str,
    client_id: String,
    refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
struct DeviceCodeRequest {
    client_id: String,
}

#[derive(Debug, Clone, Serialize)]
struct DeviceTokenRequest {
    grant_type: &'static str,
    client_id: String,
    device_code: String,
}

/// Token endpoint success response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The bearer token
    pub access_token: String,
    /// Refresh token, when granted
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct TokenErrorResponse {
    error: String,
}

/// Device authorization response
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthResponse {
    /// Code this device polls with
    pub device_code: String,
    /// Code the user types in
    pub user_code: String,
    /// Where the user goes to approve
    pub verification_uri: String,
    /// Seconds until the codes expire
    pub expires_in: u64,
    /// Seconds between polls
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

/// OIDC client bound to one discovery url
#[derive(Debug, Clone)]
pub struct OidcClient {
    client: Client,
    openid_discovery: String,
    oidc_config: Arc<RwLock<Option<OidcConfig>>>,
    jwks_set: Arc<RwLock<Option<JwkSet>>>,
}

impl OidcClient {
    /// Create new [`OidcClient`]
    pub fn new(openid_discovery: String) -> Self {
        Self {
            client: Client::new(),
            openid_discovery,
            oidc_config: Arc::new(RwLock::new(None)),
            jwks_set: Arc::new(RwLock::new(None)),
        }
    }

    /// Fetch (and remember) the discovery document
    #[instrument(skip(self))]
    pub async fn get_oidc_config(&self) -> Result<OidcConfig, Error> {
        let oidc_config = self
            .client
            .get(&self.openid_discovery)
            .send()
            .await?
            .error_for_status()?
            .json::<OidcConfig>()
            .await?;

        *self.oidc_config.write().await = Some(oidc_config.clone());

        Ok(oidc_config)
    }

    async fn cached_oidc_config(&self) -> Result<OidcConfig, Error> {
        {
            let locked = self.oidc_config.read().await;
            if let Some(config) = locked.deref() {
                return Ok(config.clone());
            }
        }
        self.get_oidc_config().await
    }

    /// Fetch (and remember) the JWKS
    #[instrument(skip(self))]
    pub async fn get_jwkset(&self, jwks_uri: &str) -> Result<JwkSet, Error> {
        let jwks_set = self
            .client
            .get(jwks_uri)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;

        *self.jwks_set.write().await = Some(jwks_set.clone());

        Ok(jwks_set)
    }

    /// Validate a bearer token: signature against the JWKS, `iss`, `exp`
    #[instrument(skip_all)]
    pub async fn verify_token(&self, jwt: &str) -> Result<(), Error> {
        let header = decode_header(jwt)?;
        let kid = header.kid.ok_or(Error::MissingKidHeader)?;

        let oidc_config = self.cached_oidc_config().await?;

        let jwks = {
            let locked = self.jwks_set.read().await;
            match locked.deref() {
                Some(set) => set.clone(),
                None => {
                    drop(locked);
                    self.get_jwkset(&oidc_config.jwks_uri).await?
                }
            }
        };

        // an unknown kid may just mean the issuer rotated keys
        let jwk = match jwks.find(&kid) {
            Some(jwk) => jwk.clone(),
            None => {
                let refreshed = self.get_jwkset(&oidc_config.jwks_uri).await?;
                refreshed.find(&kid).ok_or(Error::UnknownKid)?.clone()
            }
        };

        let decoding_key = match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)?,
            AlgorithmParameters::EllipticCurve(ec) => {
                DecodingKey::from_ec_components(&ec.x, &ec.y)?
            }
            _ => return Err(Error::UnsupportedSigningAlgo),
        };

        let validation = {
            let mut validation = Validation::new(header.alg);
            validation.validate_exp = true;
            validation.validate_aud = false;
            validation.set_issuer(&[oidc_config.issuer]);
            validation
        };

        decode::<HashMap<String, serde_json::Value>>(jwt, &decoding_key, &validation)?;

        Ok(())
    }

    /// Trade a refresh token for a fresh access token
    #[instrument(skip_all)]
    pub async fn refresh_access_token(
        &self,
        client_id: String,
        refresh_token: String,
    ) -> Result<TokenResponse, Error> {
        let token_url = self.cached_oidc_config().await?.token_endpoint;

        let request = RefreshTokenRequest {
            grant_type: "refresh_token",
            client_id,
            refresh_token,
        };

        let response = self.client.post(token_url).form(&request).send().await?;

        if response.status().is_success() {
            return Ok(response.json::<TokenResponse>().await?);
        }

        let error = response.json::<TokenErrorResponse>().await?;
        Err(token_error(&error.error))
    }

    /// Start a device-code login
    #[instrument(skip_all)]
    pub async fn start_device_flow(&self, client_id: String) -> Result<DeviceAuthResponse, Error> {
        let device_url = self.cached_oidc_config().await?.device_authorization_endpoint;

        Ok(self
            .client
            .post(device_url)
            .form(&DeviceCodeRequest { client_id })
            .send()
            .await?
            .error_for_status()?
            .json::<DeviceAuthResponse>()
            .await?)
    }

    /// Poll the token endpoint once for a device-code grant
    #[instrument(skip_all)]
    pub async fn poll_device_token(
        &self,
        client_id: String,
        device_code: String,
    ) -> Result<TokenResponse, Error> {
        let token_url = self.cached_oidc_config().await?.token_endpoint;

        let request = DeviceTokenRequest {
            grant_type: "urn:ietf:params:oauth:grant-type:device_code",
            client_id,
            device_code,
        };

        let response = self.client.post(token_url).form(&request).send().await?;

        if response.status().is_success() {
            return Ok(response.json::<TokenResponse>().await?);
        }

        let error = response.json::<TokenErrorResponse>().await?;
        Err(token_error(&error.error))
    }

    /// Poll the device-code grant until approval, expiry or denial
    ///
    /// `pending` keeps polling at the server's interval; `slow_down` backs
    /// the interval off as the server demands.
    pub async fn wait_for_device_token(
        &self,
        client_id: String,
        device: &DeviceAuthResponse,
    ) -> Result<TokenResponse, Error> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(device.expires_in);
        let mut interval = Duration::from_secs(device.interval);

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Expired);
            }

            tokio::time::sleep(interval).await;

            match self
                .poll_device_token(client_id.clone(), device.device_code.clone())
                .await
            {
                Ok(token) => return Ok(token),
                Err(Error::AuthorizationPending) => continue,
                Err(Error::SlowDown) => {
                    interval += Duration::from_secs(5);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn token_error(error: &str) -> Error {
    match error {
        "authorization_pending" => Error::AuthorizationPending,
        "slow_down" => Error::SlowDown,
        "expired_token" => Error::Expired,
        "access_denied" => Error::AccessDenied,
        other => Error::TokenEndpoint(other.to_string()),
    }
}

impl From<Error> for crate::error::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::AuthorizationPending => Self::AuthorizationPending,
            Error::SlowDown => Self::AuthSlowDown,
            Error::Expired | Error::AccessDenied => Self::AuthExpired,
            Error::Reqwest(err) => Self::Http(err),
            _ => {
                tracing::debug!("Clear auth failure: {err}");
                Self::ClearAuthFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_error_mapping() {
        assert!(matches!(
            token_error("authorization_pending"),
            Error::AuthorizationPending
        ));
        assert!(matches!(token_error("slow_down"), Error::SlowDown));
        assert!(matches!(token_error("expired_token"), Error::Expired));
        assert!(matches!(token_error("access_denied"), Error::AccessDenied));
        assert!(matches!(token_error("burned"), Error::TokenEndpoint(_)));
    }

    #[test]
    fn test_device_interval_default() {
        let json = r#"{
            "device_code": "dc",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://auth.example.com/device",
            "expires_in": 600
        }"#;

        let response: DeviceAuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.interval, 5);
    }
}
