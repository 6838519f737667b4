//! Sending: produce a token worth an exact amount

use cashu_core::amount::Amount;
use cashu_core::proofs::Proofs;
use cashu_core::spend::SpendingConditions;
use cashu_core::token::Token;
use tracing::instrument;

use super::selection::select_proofs;
use super::Wallet;
use crate::error::Error;
use crate::types::ProofStatus;

impl Wallet {
    /// Prepare a token worth exactly `amount`
    ///
    /// When the stored denominations already make the amount with no fee,
    /// they are used as-is; otherwise one swap produces the exact set.
    /// Locked sends always swap, since the lock lives in fresh secrets.
    /// The sent proofs stay in the store as reserved until the mint
    /// reports them spent.
    #[instrument(skip(self, conditions))]
    pub async fn send(
        &self,
        amount: Amount,
        memo: Option<String>,
        conditions: Option<SpendingConditions>,
    ) -> Result<Token, Error> {
        let proofs = match conditions {
            Some(conditions) => self
                .swap(Some(amount), Some(conditions))
                .await?
                .ok_or_else(|| Error::MalformedResponse("Swap returned no send proofs".into()))?,
            None => match self.take_exact(amount).await? {
                Some(exact) => exact,
                None => self
                    .swap(Some(amount), None)
                    .await?
                    .ok_or_else(|| {
                        Error::MalformedResponse("Swap returned no send proofs".into())
                    })?,
            },
        };

        Ok(Token::new(
            self.mint_url.clone(),
            proofs,
            memo,
            Some(self.unit.clone()),
        ))
    }

    /// Reserve stored proofs summing to exactly `amount`, fee free, if the
    /// denominations allow it
    async fn take_exact(&self, amount: Amount) -> Result<Option<Proofs>, Error> {
        let _guard = self.op_lock.lock().await;

        let available = self
            .store
            .get_proofs(&self.mint_url, Some(ProofStatus::Unspent))
            .await?;

        let selection = select_proofs(
            amount,
            available,
            &self.keyset_fees().await?,
            &self.inactive_keyset_ids().await?,
            self.strategy,
        )?;

        if selection.fee != Amount::ZERO || selection.total()? != amount {
            return Ok(None);
        }

        let ys: Vec<_> = selection
            .proofs
            .iter()
            .map(|p| p.y())
            .collect::<Result<_, _>>()?;
        self.store
            .set_proof_status(&ys, ProofStatus::Reserved)
            .await?;

        Ok(Some(selection.proofs))
    }

    /// Forget reserved proofs the mint reports spent; returns the amount
    /// cleared out
    #[instrument(skip(self))]
    pub async fn clear_spent_reservations(&self) -> Result<Amount, Error> {
        let reserved = self
            .store
            .get_proofs(&self.mint_url, Some(ProofStatus::Reserved))
            .await?;

        if reserved.is_empty() {
            return Ok(Amount::ZERO);
        }

        let ys: Vec<_> = reserved.iter().map(|p| p.y()).collect::<Result<_, _>>()?;

        let response = self
            .connector
            .post_check_state(cashu_core::messages::CheckStateRequest { ys: ys.clone() })
            .await?;

        let mut cleared = Amount::ZERO;
        let mut spent_ys = Vec::new();

        for (entry, (y, proof)) in response.states.iter().zip(ys.iter().zip(&reserved)) {
            if entry.y == *y && entry.state == cashu_core::messages::ProofState::Spent {
                spent_ys.push(*y);
                cleared = cleared
                    .checked_add(proof.amount)
                    .ok_or(cashu_core::amount::Error::AmountOverflow)?;
            }
        }

        self.store.remove_proofs(&spent_ys).await?;

        Ok(cleared)
    }
}
