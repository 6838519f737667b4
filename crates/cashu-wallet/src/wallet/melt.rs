//! Melting: pay a Lightning invoice with ecash
//!
//! `Idle -> QuotePending -> Submitting -> AwaitingSettlement`, ending paid,
//! rolled back, or parked pending. While the mint reports the quote
//! pending the inputs stay committed and must not be selected by anything
//! else; `resume_melt` picks the machine back up. Overpaid fee reserve
//! comes back through blank outputs.

use std::str::FromStr;
use std::time::Duration;

use cashu_core::amount::Amount;
use cashu_core::dhke::construct_proofs;
use cashu_core::keys::PublicKey;
use cashu_core::messages::{
    MeltOptions, MeltQuoteRequest, MeltQuoteResponse, MeltQuoteState, MeltRequest,
};
use cashu_core::proofs::{PreMintSecrets, Proofs};
use lightning_invoice::Bolt11Invoice;
use tracing::instrument;

use super::selection::select_proofs;
use super::Wallet;
use crate::error::Error;
use crate::types::{Melted, ProofStatus, WalletMeltQuote};

/// Deadline over all paths of a multi-path payment
const MPP_DEADLINE: Duration = Duration::from_secs(60);

impl Wallet {
    /// Request a quote to pay `invoice`
    #[instrument(skip(self))]
    pub async fn melt_quote(
        &self,
        invoice: &str,
        options: Option<MeltOptions>,
    ) -> Result<WalletMeltQuote, Error> {
        let request = Bolt11Invoice::from_str(invoice)?;

        let response = self
            .connector
            .post_melt_quote(MeltQuoteRequest {
                request,
                unit: self.unit.clone(),
                options,
            })
            .await?;

        let quote = WalletMeltQuote {
            id: response.quote,
            mint_url: self.mint_url.clone(),
            amount: response.amount,
            unit: self.unit.clone(),
            request: invoice.to_string(),
            fee_reserve: response.fee_reserve,
            state: response.state,
            expiry: response.expiry,
            payment_preimage: response.payment_preimage,
        };

        self.store.add_melt_quote(quote.clone()).await?;

        Ok(quote)
    }

    /// Pay a melt quote
    #[instrument(skip(self))]
    pub async fn melt(&self, quote_id: &str) -> Result<Melted, Error> {
        let quote = self
            .store
            .get_melt_quote(quote_id)
            .await?
            .ok_or(Error::UnknownQuote)?;

        match quote.state {
            MeltQuoteState::Paid => return Err(Error::RequestAlreadyPaid),
            MeltQuoteState::Pending => return Err(Error::QuotePending),
            MeltQuoteState::Unpaid => (),
        }
        if quote.expiry != 0 && quote.expiry < self.now() {
            return Err(Error::QuoteExpired);
        }

        let needed = quote
            .amount
            .checked_add(quote.fee_reserve)
            .ok_or(cashu_core::amount::Error::AmountOverflow)?;

        let inputs = self.prepare_melt_inputs(needed).await?;
        let input_ys: Vec<PublicKey> =
            inputs.iter().map(|p| p.y()).collect::<Result<_, _>>()?;

        let active = self.active_keyset().await?;
        let blanks = self.blank_outputs(active.id, quote.fee_reserve)?;

        // keep the unblinding material reachable while the quote may still
        // resolve out-of-band
        self.pending_melts
            .lock()
            .await
            .insert(quote.id.clone(), (blanks.clone(), input_ys.clone()));

        let request = MeltRequest {
            quote: quote.id.clone(),
            inputs: inputs.clone(),
            outputs: (!blanks.is_empty()).then(|| blanks.blinded_messages()),
        };

        let response = match self.connector.post_melt(request).await {
            Ok(response) => response,
            Err(err) if err.is_transient() => {
                // the mint may have accepted the melt; the quote decides
                tracing::warn!("Melt submit failed in flight, quote {quote_id} left pending");
                return Err(err);
            }
            Err(err) => {
                self.pending_melts.lock().await.remove(&quote.id);
                return self.release_proofs(&inputs, err).await;
            }
        };

        self.finalize_melt(quote, inputs, input_ys, blanks, response)
            .await
    }

    /// Poll a pending melt until it leaves the pending state
    ///
    /// Default deadline for settlement polling is five minutes; while
    /// pending the inputs stay committed, and cancelling the poll changes
    /// nothing on the wire.
    #[instrument(skip(self))]
    pub async fn await_melt_settlement(
        &self,
        quote_id: &str,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Result<Melted, Error> {
        let timeout = tokio::time::Instant::now() + deadline;

        loop {
            match self.resume_melt(quote_id).await {
                Ok(melted) if melted.state == MeltQuoteState::Pending => {
                    if tokio::time::Instant::now() >= timeout {
                        return Err(Error::Timeout);
                    }
                    tokio::time::sleep(poll_interval).await;
                }
                other => return other,
            }
        }
    }

    /// Re-check a quote left pending and settle the local state
    #[instrument(skip(self))]
    pub async fn resume_melt(&self, quote_id: &str) -> Result<Melted, Error> {
        let quote = self
            .store
            .get_melt_quote(quote_id)
            .await?
            .ok_or(Error::UnknownQuote)?;

        let response = self.connector.get_melt_quote_state(quote_id).await?;

        let stashed = self.pending_melts.lock().await.get(quote_id).cloned();
        let (blanks, input_ys) = stashed.unwrap_or_default();

        let inputs = {
            let stored = self
                .store
                .get_proofs(&self.mint_url, Some(ProofStatus::Pending))
                .await?;
            stored
                .into_iter()
                .filter(|proof| {
                    proof
                        .y()
                        .map(|y| input_ys.contains(&y))
                        .unwrap_or(false)
                })
                .collect::<Proofs>()
        };

        self.finalize_melt(quote, inputs, input_ys, blanks, response)
            .await
    }

    async fn finalize_melt(
        &self,
        mut quote: WalletMeltQuote,
        inputs: Proofs,
        input_ys: Vec<PublicKey>,
        blanks: PreMintSecrets,
        response: MeltQuoteResponse,
    ) -> Result<Melted, Error> {
        match response.state {
            MeltQuoteState::Paid => {
                let change = match &response.change {
                    Some(signatures) if !blanks.is_empty() => {
                        // signatures arrive in blank order; unused blanks
                        // are simply absent from the tail
                        let n = signatures.len().min(blanks.len());
                        let keys = self.keyset_keys(blanks.secrets[0].blinded_message.keyset_id)
                            .await?;

                        Some(construct_proofs(
                            signatures[..n].to_vec(),
                            blanks.rs()[..n].to_vec(),
                            blanks.secrets()[..n].to_vec(),
                            &keys,
                        )?)
                    }
                    _ => None,
                };

                let change_total = match &change {
                    Some(change) => Amount::try_sum(change.iter().map(|p| p.amount))?,
                    None => Amount::ZERO,
                };
                let input_total = Amount::try_sum(inputs.iter().map(|p| p.amount))?;

                {
                    let _guard = self.op_lock.lock().await;
                    self.store.remove_proofs(&input_ys).await?;
                    if let Some(change) = change.clone() {
                        self.store
                            .add_proofs(self.mint_url.clone(), change, ProofStatus::Unspent)
                            .await?;
                    }
                }

                quote.state = MeltQuoteState::Paid;
                quote.payment_preimage = response.payment_preimage.clone();
                self.store.add_melt_quote(quote.clone()).await?;
                self.pending_melts.lock().await.remove(&quote.id);

                Ok(Melted {
                    state: MeltQuoteState::Paid,
                    preimage: response.payment_preimage,
                    change,
                    amount: quote.amount,
                    fee_paid: input_total
                        .checked_sub(quote.amount + change_total)
                        .unwrap_or(Amount::ZERO),
                })
            }
            MeltQuoteState::Pending => {
                // nothing to undo on the wire; inputs stay committed
                quote.state = MeltQuoteState::Pending;
                self.store.add_melt_quote(quote.clone()).await?;

                Ok(Melted {
                    state: MeltQuoteState::Pending,
                    preimage: None,
                    change: None,
                    amount: quote.amount,
                    fee_paid: Amount::ZERO,
                })
            }
            MeltQuoteState::Unpaid => {
                // payment failed: the quote is back where it started and
                // the inputs return to spendable
                quote.state = MeltQuoteState::Unpaid;
                self.store.add_melt_quote(quote).await?;

                self.store
                    .set_proof_status(&input_ys, ProofStatus::Unspent)
                    .await?;
                self.pending_melts.lock().await.remove(&response.quote);

                Err(Error::PaymentFailed)
            }
        }
    }

    /// Inputs worth exactly `needed` plus their own input fee
    ///
    /// The mint keeps anything above amount + fee reserve + input fee, so
    /// when the stored denominations overshoot, a swap first produces an
    /// exact set.
    async fn prepare_melt_inputs(&self, needed: Amount) -> Result<Proofs, Error> {
        let active = self.active_keyset().await?;

        // melt-input fee over the denominations of an exact set; the fee
        // changes the set, so iterate to the fixed point
        let mut melt_fee = Amount::ZERO;
        for _ in 0..4 {
            let count = (needed + melt_fee).split().len() as u64;
            melt_fee = Amount::from((count * active.input_fee_ppk).div_ceil(1000));
        }
        let exact = needed + melt_fee;

        let selection = {
            let _guard = self.op_lock.lock().await;

            let available = self
                .store
                .get_proofs(&self.mint_url, Some(ProofStatus::Unspent))
                .await?;

            let selection = select_proofs(
                needed,
                available,
                &self.keyset_fees().await?,
                &self.inactive_keyset_ids().await?,
                self.strategy,
            )?;

            let ys: Vec<PublicKey> = selection
                .proofs
                .iter()
                .map(|p| p.y())
                .collect::<Result<_, _>>()?;
            self.store
                .set_proof_status(&ys, ProofStatus::Pending)
                .await?;

            selection
        };

        let overpay = selection
            .total()?
            .checked_sub(needed + selection.fee)
            .unwrap_or(Amount::ZERO);

        if overpay == Amount::ZERO {
            return Ok(selection.proofs);
        }

        let send = self
            .swap_proofs(selection.proofs, Some(exact), None)
            .await?
            .ok_or_else(|| Error::MalformedResponse("Swap returned no send proofs".into()))?;

        let ys: Vec<PublicKey> = send.iter().map(|p| p.y()).collect::<Result<_, _>>()?;
        self.store
            .set_proof_status(&ys, ProofStatus::Pending)
            .await?;

        Ok(send)
    }
}

/// Pay one invoice across several mints
///
/// Each path melts its partial amount with the MPP option. Quotes are
/// taken first, so a mint that refuses its part aborts the whole payment
/// before anything is committed. Once melts are in flight a failed path
/// rolls its own inputs back; paths the mints already paid cannot be
/// recalled, so the first path error is surfaced after every path
/// resolved.
#[instrument(skip_all)]
pub async fn pay_invoice_mpp(
    parts: Vec<(&Wallet, Amount)>,
    invoice: &str,
) -> Result<Vec<Melted>, Error> {
    let mut quotes = Vec::with_capacity(parts.len());

    for (wallet, amount_msat) in &parts {
        let quote = wallet
            .melt_quote(invoice, Some(MeltOptions::new_mpp(*amount_msat)))
            .await?;
        quotes.push((*wallet, quote));
    }

    let melts = futures::future::join_all(
        quotes
            .iter()
            .map(|(wallet, quote)| wallet.melt(&quote.id)),
    );

    let results = tokio::time::timeout(MPP_DEADLINE, melts)
        .await
        .map_err(|_| Error::Timeout)?;

    let mut settled = Vec::with_capacity(results.len());
    for result in results {
        settled.push(result?);
    }

    Ok(settled)
}
