//! Swapping: split, combine, rotate, lock
//!
//! A swap atomically replaces a set of proofs with a new set of equal
//! total minus the input fee. It is the workhorse behind producing an
//! exact send amount, attaching spending conditions, consolidating dust
//! and walking proofs off retired keysets.

use std::collections::HashSet;

use cashu_core::amount::Amount;
use cashu_core::dhke::construct_proofs;
use cashu_core::fees::proofs_fee;
use cashu_core::messages::SwapRequest;
use cashu_core::proofs::{PreMintSecrets, Proofs};
use cashu_core::secret::Secret;
use cashu_core::spend::SpendingConditions;
use tracing::instrument;

use super::selection::select_proofs;
use super::Wallet;
use crate::error::Error;
use crate::types::ProofStatus;

impl Wallet {
    /// Swap stored proofs, optionally carving out an exact `amount`
    /// (optionally locked) from the result
    ///
    /// Returns the carved-out proofs; change lands back in the store. With
    /// no amount the whole selection is re-blinded, which is how received
    /// or rotation-dirty proofs become fresh ones only this wallet can
    /// spend.
    #[instrument(skip(self, conditions))]
    pub async fn swap(
        &self,
        amount: Option<Amount>,
        conditions: Option<SpendingConditions>,
    ) -> Result<Option<Proofs>, Error> {
        let inputs = {
            let _guard = self.op_lock.lock().await;

            let available = self
                .store
                .get_proofs(&self.mint_url, Some(ProofStatus::Unspent))
                .await?;

            let selection = match amount {
                Some(amount) => {
                    select_proofs(
                        amount,
                        available,
                        &self.keyset_fees().await?,
                        &self.inactive_keyset_ids().await?,
                        self.strategy,
                    )?
                    .proofs
                }
                None => available,
            };

            let ys: Vec<_> = selection
                .iter()
                .map(|p| p.y())
                .collect::<Result<_, _>>()?;
            self.store
                .set_proof_status(&ys, ProofStatus::Pending)
                .await?;

            selection
        };

        match self.swap_proofs(inputs.clone(), amount, conditions).await {
            Ok(send) => Ok(send),
            Err(err) => {
                self.release_proofs(&inputs, err).await
            }
        }
    }

    /// Swap explicit input proofs
    ///
    /// Inputs must already be marked pending by the caller; they are
    /// consumed on success. The carved-out `send_amount` part is stored
    /// reserved, the change unspent.
    pub(crate) async fn swap_proofs(
        &self,
        inputs: Proofs,
        send_amount: Option<Amount>,
        send_conditions: Option<SpendingConditions>,
    ) -> Result<Option<Proofs>, Error> {
        let fees = self.keyset_fees().await?;
        let input_total = Amount::try_sum(inputs.iter().map(|p| p.amount))?;
        let fee = proofs_fee(&inputs, &fees)?;

        let output_total = input_total
            .checked_sub(fee)
            .ok_or(cashu_core::amount::Error::AmountOverflow)?;

        // locked outputs are always a carve-out, even of the full amount
        let carve = send_amount.or_else(|| send_conditions.is_some().then_some(output_total));
        let change_amount = match carve {
            Some(send_amount) => output_total.checked_sub(send_amount).ok_or_else(|| {
                Error::InsufficientFunds {
                    needed: send_amount,
                    available: output_total,
                    fee,
                }
            })?,
            None => output_total,
        };

        let active = self.active_keyset().await?;

        let (send_premint, change_premint) = {
            let _guard = self.op_lock.lock().await;

            let send_premint = match (carve, &send_conditions) {
                (Some(send_amount), Some(conditions)) => self.condition_outputs(
                    active.id,
                    send_amount,
                    &self.split_target,
                    conditions,
                )?,
                (Some(send_amount), None) => {
                    self.premint_secrets(active.id, send_amount, &self.split_target)
                        .await?
                }
                (None, _) => PreMintSecrets::default(),
            };

            let change_premint = self
                .premint_secrets(active.id, change_amount, &cashu_core::amount::SplitTarget::None)
                .await?;

            (send_premint, change_premint)
        };

        let send_secrets: HashSet<Secret> = send_premint.secrets().into_iter().collect();

        let mut combined = PreMintSecrets::default();
        combined.combine(send_premint);
        combined.combine(change_premint);
        // ascending on the wire so output order leaks nothing
        combined.sort_secrets();

        let request = SwapRequest::new(inputs.clone(), combined.blinded_messages());
        let response = match self.connector.post_swap(request).await {
            Ok(response) => response,
            Err(err) => return self.release_proofs(&inputs, err).await,
        };

        let keys = self.keyset_keys(active.id).await?;
        self.verify_signatures(&combined.secrets, &response.signatures, &keys)?;

        let proofs = construct_proofs(
            response.signatures,
            combined.rs(),
            combined.secrets(),
            &keys,
        )?;

        let (send, change): (Proofs, Proofs) = proofs
            .into_iter()
            .partition(|proof| send_secrets.contains(&proof.secret));

        {
            let _guard = self.op_lock.lock().await;

            let input_ys: Vec<_> = inputs.iter().map(|p| p.y()).collect::<Result<_, _>>()?;
            self.store.remove_proofs(&input_ys).await?;

            self.store
                .add_proofs(self.mint_url.clone(), change, ProofStatus::Unspent)
                .await?;

            if !send.is_empty() {
                self.store
                    .add_proofs(self.mint_url.clone(), send.clone(), ProofStatus::Reserved)
                    .await?;
            }
        }

        Ok((!send.is_empty()).then_some(send))
    }

    /// Swap every proof sitting on an inactive keyset onto the active one
    ///
    /// Run after `refresh_keysets` reports newly inactive keysets; until
    /// this completes the balance is not considered stable.
    #[instrument(skip(self))]
    pub async fn rotate_proofs(&self) -> Result<Amount, Error> {
        let inactive = self.inactive_keyset_ids().await?;

        let dirty: Proofs = {
            let _guard = self.op_lock.lock().await;

            let dirty: Proofs = self
                .store
                .get_proofs(&self.mint_url, Some(ProofStatus::Unspent))
                .await?
                .into_iter()
                .filter(|proof| inactive.contains(&proof.keyset_id))
                .collect();

            let ys: Vec<_> = dirty.iter().map(|p| p.y()).collect::<Result<_, _>>()?;
            self.store
                .set_proof_status(&ys, ProofStatus::Pending)
                .await?;

            dirty
        };

        if dirty.is_empty() {
            return Ok(Amount::ZERO);
        }

        let rotated = Amount::try_sum(dirty.iter().map(|p| p.amount))?;
        self.swap_proofs(dirty, None, None).await?;

        tracing::debug!("Rotated {rotated} off inactive keysets");

        Ok(rotated)
    }

    /// Put proofs back after a failed operation
    ///
    /// Validation errors saying the proofs are gone for good (already
    /// spent) drop them instead; anything else returns them to spendable.
    pub(crate) async fn release_proofs<T>(
        &self,
        proofs: &Proofs,
        err: Error,
    ) -> Result<T, Error> {
        let ys: Vec<_> = proofs.iter().map(|p| p.y()).collect::<Result<_, _>>()?;

        match &err {
            Error::TokenAlreadySpent => {
                self.store.remove_proofs(&ys).await?;
            }
            _ => {
                self.store
                    .set_proof_status(&ys, ProofStatus::Unspent)
                    .await?;
            }
        }

        Err(err)
    }
}
