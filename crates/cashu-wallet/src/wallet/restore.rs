//! Restore: rebuild a wallet from its seed
//!
//! Replays deterministic outputs against the mint keyset by keyset, in
//! counter order, until enough consecutive batches come back empty.
//! Whatever the mint has signed is unblinded again; whatever it reports
//! spent is dropped; counters fast-forward past everything found.

use cashu_core::amount::Amount;
use cashu_core::dhke::construct_proofs;
use cashu_core::messages::{CheckStateRequest, ProofState, RestoreRequest};
use cashu_core::proofs::{PreMintSecrets, Proofs};
use tracing::instrument;

use super::Wallet;
use crate::error::Error;
use crate::types::ProofStatus;

/// Counters per restore batch
const RESTORE_BATCH_SIZE: u32 = 100;
/// Consecutive empty batches before a keyset scan stops
const RESTORE_EMPTY_BATCHES: u32 = 3;

impl Wallet {
    /// Scan every keyset of the mint and recover unspent proofs
    ///
    /// Requires the wallet seed. Returns the recovered amount.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<Amount, Error> {
        let xpriv = self.xpriv.ok_or(Error::SeedRequired)?;

        // inactive keysets hold restorable proofs too
        self.refresh_keysets().await?;
        let keysets = self
            .store
            .get_keysets(&self.mint_url)
            .await?
            .unwrap_or_default();

        let mut restored_total = Amount::ZERO;

        for keyset in keysets {
            if keyset.unit != self.unit {
                continue;
            }

            tracing::debug!("Restoring keyset {}", keyset.id);

            let keys = self.keyset_keys(keyset.id).await?;

            let mut start: u32 = 0;
            let mut empty_batches: u32 = 0;
            let mut recovered: Proofs = Vec::new();
            let mut highest_counter: Option<u32> = None;

            while empty_batches < RESTORE_EMPTY_BATCHES {
                let end = start + RESTORE_BATCH_SIZE - 1;
                let premint = PreMintSecrets::restore_batch(keyset.id, xpriv, start, end)?;

                let response = self
                    .connector
                    .post_restore(RestoreRequest {
                        outputs: premint.blinded_messages(),
                    })
                    .await?;

                if response.outputs.is_empty() {
                    empty_batches += 1;
                    start += RESTORE_BATCH_SIZE;
                    continue;
                }
                empty_batches = 0;

                // the mint returns the subset it signed; line each returned
                // output back up with its premint by B_
                let mut rs = Vec::with_capacity(response.outputs.len());
                let mut secrets = Vec::with_capacity(response.outputs.len());

                for output in &response.outputs {
                    let (position, premint) = premint
                        .iter()
                        .enumerate()
                        .find(|(_, pm)| {
                            pm.blinded_message.blinded_secret == output.blinded_secret
                        })
                        .ok_or_else(|| {
                            Error::MalformedResponse(
                                "Restore returned an output that was not requested".into(),
                            )
                        })?;

                    rs.push(premint.r.clone());
                    secrets.push(premint.secret.clone());
                    highest_counter = Some(
                        highest_counter
                            .unwrap_or(0)
                            .max(start + position as u32),
                    );
                }

                recovered.extend(construct_proofs(
                    response.signatures,
                    rs,
                    secrets,
                    &keys,
                )?);

                start += RESTORE_BATCH_SIZE;
            }

            if recovered.is_empty() {
                continue;
            }

            // drop what the mint says is already gone
            let ys: Vec<_> = recovered
                .iter()
                .map(|p| p.y())
                .collect::<Result<_, _>>()?;
            let states = self
                .connector
                .post_check_state(CheckStateRequest { ys: ys.clone() })
                .await?
                .states;

            let unspent: Proofs = recovered
                .into_iter()
                .zip(states)
                .filter(|(_, state)| state.state != ProofState::Spent)
                .map(|(proof, _)| proof)
                .collect();

            let amount = Amount::try_sum(unspent.iter().map(|p| p.amount))?;
            restored_total = restored_total
                .checked_add(amount)
                .ok_or(cashu_core::amount::Error::AmountOverflow)?;

            {
                let _guard = self.op_lock.lock().await;
                self.store
                    .add_proofs(self.mint_url.clone(), unspent, ProofStatus::Unspent)
                    .await?;
                if let Some(highest) = highest_counter {
                    self.store.raise_counter(&keyset.id, highest + 1).await?;
                }
            }

            tracing::info!("Restored {amount} from keyset {}", keyset.id);
        }

        Ok(restored_total)
    }
}
