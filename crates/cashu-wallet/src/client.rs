//! HTTP mint connector
//!
//! [`HttpClient`] speaks `/v1` JSON over `reqwest`. Safe GETs retry with
//! jittered exponential backoff; mutating POSTs to endpoints the mint
//! declares cached retry freely up to the deadline, because the mint-side
//! NUT-19 cache makes the replay idempotent. Cashu 4xx errors are never
//! retried. Auth headers are attached per the mint's declared protected
//! endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::secp256k1::rand::{thread_rng, Rng};
use cashu_core::info::{AuthRequired, HttpMethod, MintInfo};
use cashu_core::keyset::{Id, KeySet, KeysResponse, KeysetResponse};
use cashu_core::messages::{
    CheckStateRequest, CheckStateResponse, MeltQuoteRequest, MeltQuoteResponse, MeltRequest,
    MintQuoteRequest, MintQuoteResponse, MintRequest, MintResponse, RestoreRequest,
    RestoreResponse, SwapRequest, SwapResponse,
};
use cashu_core::mint_url::MintUrl;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::auth::{AuthWallet, MintAuthRequest};
use crate::cache::{cache_key, ResponseCache};
use crate::connector::MintConnector;
use crate::error::{Error, ErrorResponse};

/// Per-attempt deadline
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Retry budget for POSTs covered by the mint's response cache. Well above
/// the per-attempt timeout, so even attempts that hang until their own
/// deadline leave room for several replays.
const CACHED_POST_DEADLINE: Duration = Duration::from_secs(300);
/// Attempts for safe GETs
const GET_ATTEMPTS: u32 = 3;

const BACKOFF_INITIAL_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 30_000;

fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_INITIAL_MS.saturating_mul(2_u64.saturating_pow(attempt));
    let capped = exp.min(BACKOFF_CAP_MS);
    // 20% jitter so a fleet of retries does not align
    let jittered = (capped as f64 * thread_rng().gen_range(0.8..1.2)) as u64;
    Duration::from_millis(jittered)
}

/// HTTP connector for one mint
#[derive(Debug)]
pub struct HttpClient {
    mint_url: MintUrl,
    inner: Client,
    cache: ResponseCache,
    mint_info: RwLock<Option<MintInfo>>,
    auth: RwLock<Option<Arc<AuthWallet>>>,
}

impl HttpClient {
    /// Create new [`HttpClient`] for `mint_url`
    pub fn new(mint_url: MintUrl) -> Result<Self, Error> {
        let inner = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            mint_url,
            inner,
            cache: ResponseCache::default(),
            mint_info: RwLock::new(None),
            auth: RwLock::new(None),
        })
    }

    /// Attach an auth wallet for mints with protected endpoints
    pub async fn set_auth_wallet(&self, auth: Arc<AuthWallet>) {
        *self.auth.write().await = Some(auth);
    }

    /// Url of the mint this client talks to
    pub fn mint_url(&self) -> &MintUrl {
        &self.mint_url
    }

    async fn auth_header(
        &self,
        method: HttpMethod,
        path: &str,
    ) -> Result<Option<(&'static str, String)>, Error> {
        let required = {
            let info = self.mint_info.read().await;
            match info.as_ref() {
                Some(info) => info.auth_required(method, path),
                None => None,
            }
        };

        let Some(required) = required else {
            return Ok(None);
        };

        let auth = self
            .auth
            .read()
            .await
            .clone()
            .ok_or(Error::AuthRequired)?;

        match required {
            AuthRequired::Clear => {
                let cat = auth
                    .clear_auth_token()
                    .await
                    .ok_or(Error::AuthRequired)?;
                Ok(Some(("Clear-auth", cat)))
            }
            AuthRequired::Blind => {
                let token = auth
                    .next_blind_token()
                    .ok_or(Error::BlindAuthTokenMissing)?;
                Ok(Some(("Blind-auth", token.without_dleq().to_string())))
            }
        }
    }

    fn parse_body<R: DeserializeOwned>(bytes: &[u8]) -> Result<R, Error> {
        match serde_json::from_slice::<R>(bytes) {
            Ok(response) => Ok(response),
            Err(_) => {
                let value: serde_json::Value = serde_json::from_slice(bytes)
                    .map_err(|_| {
                        Error::MalformedResponse(String::from_utf8_lossy(bytes).into_owned())
                    })?;
                Err(ErrorResponse::from_value(value).into())
            }
        }
    }

    async fn http_get<R: DeserializeOwned>(&self, segments: &[&str]) -> Result<R, Error> {
        let url = self.mint_url.join_paths(segments)?;
        let path = format!("/{}", segments.join("/"));

        let mut attempt = 0;
        loop {
            let mut request = self.inner.get(url.clone());
            if let Some((header, value)) = self.auth_header(HttpMethod::Get, &path).await? {
                request = request.header(header, value);
            }

            let result = async {
                let response = request.send().await?;
                let bytes = response.bytes().await?;
                Self::parse_body::<R>(&bytes)
            }
            .await;

            match result {
                Err(err) if err.is_transient() && attempt + 1 < GET_ATTEMPTS => {
                    tracing::debug!("GET {path} failed ({err}), retrying");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn http_post<B: Serialize, R: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<R, Error> {
        let url = self.mint_url.join_paths(segments)?;
        let path = format!("/{}", segments.join("/"));
        let body_bytes = serde_json::to_vec(body)?;

        let (is_cached, ttl) = {
            let info = self.mint_info.read().await;
            match info.as_ref() {
                Some(info) => (
                    info.is_cached_endpoint(HttpMethod::Post, &path),
                    info.cache_ttl(),
                ),
                None => (false, None),
            }
        };

        let key = cache_key("POST", &path, &body_bytes);
        if is_cached {
            if let Some(entry) = self.cache.get(&key) {
                tracing::debug!("POST {path} served from response cache");
                return Self::parse_body(&entry.body);
            }
        }

        let deadline = tokio::time::Instant::now() + CACHED_POST_DEADLINE;
        let mut attempt = 0;

        loop {
            let mut request = self
                .inner
                .post(url.clone())
                .header("Content-Type", "application/json")
                .body(body_bytes.clone());
            if let Some((header, value)) = self.auth_header(HttpMethod::Post, &path).await? {
                request = request.header(header, value);
            }

            let result = async {
                let response = request.send().await?;
                let status = response.status().as_u16();
                let bytes = response.bytes().await?;
                Ok::<_, Error>((status, bytes))
            }
            .await;

            match result {
                Ok((status, bytes)) => {
                    let parsed = Self::parse_body::<R>(&bytes);
                    if parsed.is_ok() && is_cached {
                        self.cache.put(key, bytes.to_vec(), status, ttl);
                    }
                    return parsed;
                }
                // the mint-side cache guarantees a replay has at most one
                // effect, so transport failures on cached POSTs retry until
                // the deadline
                Err(err)
                    if err.is_transient()
                        && is_cached
                        && tokio::time::Instant::now() < deadline =>
                {
                    tracing::debug!("POST {path} failed ({err}), replaying");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl MintConnector for HttpClient {
    #[instrument(skip(self))]
    async fn get_mint_keys(&self) -> Result<Vec<KeySet>, Error> {
        let response: KeysResponse = self.http_get(&["v1", "keys"]).await?;
        Ok(response.keysets)
    }

    #[instrument(skip(self))]
    async fn get_mint_keyset(&self, keyset_id: Id) -> Result<KeySet, Error> {
        let response: KeysResponse = self
            .http_get(&["v1", "keys", &keyset_id.to_string()])
            .await?;
        response
            .keysets
            .into_iter()
            .next()
            .ok_or(Error::UnknownKeySet)
    }

    #[instrument(skip(self))]
    async fn get_mint_keysets(&self) -> Result<KeysetResponse, Error> {
        self.http_get(&["v1", "keysets"]).await
    }

    #[instrument(skip(self))]
    async fn get_mint_info(&self) -> Result<MintInfo, Error> {
        let info: MintInfo = self.http_get(&["v1", "info"]).await?;

        // the snapshot steers caching and auth for subsequent calls
        *self.mint_info.write().await = Some(info.clone());

        Ok(info)
    }

    #[instrument(skip_all)]
    async fn post_mint_quote(
        &self,
        request: MintQuoteRequest,
    ) -> Result<MintQuoteResponse, Error> {
        self.http_post(&["v1", "mint", "quote", "bolt11"], &request)
            .await
    }

    #[instrument(skip(self))]
    async fn get_mint_quote_state(&self, quote_id: &str) -> Result<MintQuoteResponse, Error> {
        self.http_get(&["v1", "mint", "quote", "bolt11", quote_id])
            .await
    }

    #[instrument(skip_all)]
    async fn post_mint(&self, request: MintRequest) -> Result<MintResponse, Error> {
        self.http_post(&["v1", "mint", "bolt11"], &request).await
    }

    #[instrument(skip_all)]
    async fn post_swap(&self, request: SwapRequest) -> Result<SwapResponse, Error> {
        self.http_post(&["v1", "swap"], &request).await
    }

    #[instrument(skip_all)]
    async fn post_melt_quote(
        &self,
        request: MeltQuoteRequest,
    ) -> Result<MeltQuoteResponse, Error> {
        self.http_post(&["v1", "melt", "quote", "bolt11"], &request)
            .await
    }

    #[instrument(skip(self))]
    async fn get_melt_quote_state(&self, quote_id: &str) -> Result<MeltQuoteResponse, Error> {
        self.http_get(&["v1", "melt", "quote", "bolt11", quote_id])
            .await
    }

    #[instrument(skip_all)]
    async fn post_melt(&self, request: MeltRequest) -> Result<MeltQuoteResponse, Error> {
        self.http_post(&["v1", "melt", "bolt11"], &request).await
    }

    #[instrument(skip_all)]
    async fn post_check_state(
        &self,
        request: CheckStateRequest,
    ) -> Result<CheckStateResponse, Error> {
        self.http_post(&["v1", "checkstate"], &request).await
    }

    #[instrument(skip_all)]
    async fn post_restore(&self, request: RestoreRequest) -> Result<RestoreResponse, Error> {
        self.http_post(&["v1", "restore"], &request).await
    }

    #[instrument(skip(self))]
    async fn get_blind_auth_keysets(&self) -> Result<KeysetResponse, Error> {
        self.http_get(&["v1", "auth", "blind", "keysets"]).await
    }

    #[instrument(skip(self))]
    async fn get_blind_auth_keyset(&self, keyset_id: Id) -> Result<KeySet, Error> {
        let response: KeysResponse = self
            .http_get(&["v1", "auth", "blind", "keys", &keyset_id.to_string()])
            .await?;
        response
            .keysets
            .into_iter()
            .next()
            .ok_or(Error::UnknownKeySet)
    }

    #[instrument(skip_all)]
    async fn post_mint_blind_auth(&self, request: MintAuthRequest) -> Result<MintResponse, Error> {
        self.http_post(&["v1", "auth", "blind", "mint"], &request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        for attempt in 0..12 {
            let delay = backoff_delay(attempt).as_millis() as u64;
            // within jitter bounds of the capped exponential
            let expected = (BACKOFF_INITIAL_MS * 2_u64.saturating_pow(attempt)).min(BACKOFF_CAP_MS);
            assert!(delay >= expected * 8 / 10, "attempt {attempt}: {delay}");
            assert!(delay <= expected * 12 / 10, "attempt {attempt}: {delay}");
        }
    }

    #[test]
    fn test_parse_body_error_response() {
        let err = HttpClient::parse_body::<SwapResponse>(
            br#"{"code":11001,"error":"Token already spent"}"#,
        )
        .unwrap_err();

        assert!(matches!(err, Error::TokenAlreadySpent));
    }

    #[test]
    fn test_parse_body_garbage() {
        let err = HttpClient::parse_body::<SwapResponse>(b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }
}
