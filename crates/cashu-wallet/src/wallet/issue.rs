//! Minting: quote, await payment, issue
//!
//! `Idle -> QuotePending -> AwaitingPayment -> Minting -> Done`, with the
//! quote record in the store carrying the machine across restarts. Issue
//! is replay-safe: outputs are deterministic under a seed and the call is
//! covered by the mint's response cache.

use std::time::Duration;

use cashu_core::amount::{Amount, SplitTarget};
use cashu_core::dhke::construct_proofs;
use cashu_core::keys::SecretKey;
use cashu_core::messages::{MintQuoteRequest, MintQuoteState, MintRequest};
use cashu_core::proofs::Proofs;
use cashu_core::spend::SpendingConditions;
use tracing::instrument;

use super::Wallet;
use crate::error::Error;
use crate::types::{MintQuote, ProofStatus};

impl Wallet {
    /// Request a quote to mint `amount`
    ///
    /// When the mint supports quote signatures the issuance is locked to a
    /// fresh key, so a leaked quote id alone cannot claim the ecash.
    #[instrument(skip(self))]
    pub async fn mint_quote(
        &self,
        amount: Amount,
        description: Option<String>,
    ) -> Result<MintQuote, Error> {
        let info = self.mint_info().await.ok();
        let supports_quote_signatures = info
            .map(|info| info.nuts.nut20.supported)
            .unwrap_or(false);

        let secret_key = supports_quote_signatures.then(SecretKey::generate);

        let request = MintQuoteRequest {
            amount,
            unit: self.unit.clone(),
            description,
            pubkey: secret_key.as_ref().map(|key| key.public_key()),
        };

        let response = self.connector.post_mint_quote(request).await?;

        let quote = MintQuote {
            id: response.quote,
            mint_url: self.mint_url.clone(),
            amount,
            unit: self.unit.clone(),
            request: response.request,
            state: response.state,
            expiry: response.expiry,
            secret_key,
        };

        self.store.add_mint_quote(quote.clone()).await?;

        Ok(quote)
    }

    /// Current state of a mint quote, updating the stored record
    #[instrument(skip(self))]
    pub async fn mint_quote_state(&self, quote_id: &str) -> Result<MintQuoteState, Error> {
        let response = self.connector.get_mint_quote_state(quote_id).await?;

        if let Some(mut quote) = self.store.get_mint_quote(quote_id).await? {
            quote.state = response.state;
            self.store.add_mint_quote(quote).await?;
        }

        Ok(response.state)
    }

    /// Poll until the quote is paid, then issue
    ///
    /// Cancelling between polls leaves nothing committed; the quote stays
    /// in the store and `mint` can be called later.
    #[instrument(skip(self))]
    pub async fn wait_and_mint(
        &self,
        quote_id: &str,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Result<Proofs, Error> {
        let timeout = tokio::time::Instant::now() + deadline;

        loop {
            match self.mint_quote_state(quote_id).await? {
                MintQuoteState::Paid => break,
                MintQuoteState::Issued => return Err(Error::QuoteAlreadyIssued),
                MintQuoteState::Unpaid => {
                    if tokio::time::Instant::now() >= timeout {
                        return Err(Error::Timeout);
                    }
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }

        self.mint(quote_id, SplitTarget::default(), None).await
    }

    /// Issue ecash for a paid quote
    #[instrument(skip(self, conditions))]
    pub async fn mint(
        &self,
        quote_id: &str,
        target: SplitTarget,
        conditions: Option<SpendingConditions>,
    ) -> Result<Proofs, Error> {
        let quote = self
            .store
            .get_mint_quote(quote_id)
            .await?
            .ok_or(Error::UnknownQuote)?;

        if quote.is_expired(self.now()) {
            return Err(Error::QuoteExpired);
        }

        let active = self.active_keyset().await?;

        // counters are reserved inside the guard; the network call happens
        // after, against an already-committed range
        let premint = {
            let _guard = self.op_lock.lock().await;
            match &conditions {
                Some(conditions) => {
                    self.condition_outputs(active.id, quote.amount, &target, conditions)?
                }
                None => self.premint_secrets(active.id, quote.amount, &target).await?,
            }
        };

        let mut request = MintRequest {
            quote: quote.id.clone(),
            outputs: premint.blinded_messages(),
            signature: None,
        };

        if let Some(secret_key) = &quote.secret_key {
            request.sign(secret_key)?;
        }

        let response = self.connector.post_mint(request).await?;

        let keys = self.keyset_keys(active.id).await?;
        self.verify_signatures(&premint.secrets, &response.signatures, &keys)?;

        let proofs = construct_proofs(
            response.signatures,
            premint.rs(),
            premint.secrets(),
            &keys,
        )?;

        {
            let _guard = self.op_lock.lock().await;
            self.store
                .add_proofs(self.mint_url.clone(), proofs.clone(), ProofStatus::Unspent)
                .await?;

            let mut quote = quote;
            quote.state = MintQuoteState::Issued;
            self.store.add_mint_quote(quote).await?;
        }

        tracing::debug!("Minted {} proofs for quote {quote_id}", proofs.len());

        Ok(proofs)
    }
}
