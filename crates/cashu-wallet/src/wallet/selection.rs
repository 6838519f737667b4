//! Proof selection
//!
//! Picking which proofs fund a transaction. Fees grow with the number of
//! inputs, so the target moves while selecting; a greedy walk keeps adding
//! until the picked sum covers the target plus the fee of the picked set.
//!
//! The walk runs within one keyset at a time: every keyset that can fund
//! the target on its own produces a candidate, and the candidate with the
//! lowest fee wins, fewer proofs breaking ties. Only when no single keyset
//! suffices are keysets merged, with proofs on inactive keysets drained
//! first — the mint will stop accepting those at some point, so any spend
//! is an opportunity to rotate them out.

use std::collections::{HashMap, HashSet};

use cashu_core::amount::Amount;
use cashu_core::fees::calculate_fee;
use cashu_core::keyset::Id;
use cashu_core::proofs::{Proof, Proofs};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How proofs are ordered when funding a transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionStrategy {
    /// Largest first: fewest inputs, lowest fee
    #[default]
    LargestFirst,
    /// Smallest first: consolidates dust at the cost of more inputs
    SmallestFirst,
}

impl SelectionStrategy {
    fn order(&self, proofs: &mut Proofs) {
        match self {
            Self::LargestFirst => proofs.sort_by(|a, b| b.amount.cmp(&a.amount)),
            Self::SmallestFirst => proofs.sort(),
        }
    }
}

/// A funded selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// The proofs to spend
    pub proofs: Proofs,
    /// Input fee of the set
    pub fee: Amount,
}

impl Selection {
    /// Total amount of the selected proofs
    pub fn total(&self) -> Result<Amount, Error> {
        Ok(Amount::try_sum(self.proofs.iter().map(|p| p.amount))?)
    }
}

/// Select proofs worth at least `target` plus their own input fee
///
/// Single-keyset candidates are tried first and the cheapest one wins;
/// keysets are only mixed when none can fund the target alone.
pub fn select_proofs(
    target: Amount,
    available: Proofs,
    keyset_fees_ppk: &HashMap<Id, u64>,
    inactive_keysets: &HashSet<Id>,
    strategy: SelectionStrategy,
) -> Result<Selection, Error> {
    let available_total = Amount::try_sum(available.iter().map(|p| p.amount))?;

    let mut by_keyset: HashMap<Id, Proofs> = HashMap::new();
    for proof in &available {
        by_keyset
            .entry(proof.keyset_id)
            .or_default()
            .push(proof.clone());
    }

    // lowest fee wins, then fewer proofs, then prefer draining an inactive
    // keyset
    let mut best: Option<(Selection, bool)> = None;
    for (keyset_id, mut proofs) in by_keyset {
        strategy.order(&mut proofs);
        let Some(candidate) = greedy_walk(target, proofs, keyset_fees_ppk)? else {
            continue;
        };
        let candidate_inactive = inactive_keysets.contains(&keyset_id);

        let better = match &best {
            None => true,
            Some((current, current_inactive)) => {
                (candidate.fee, candidate.proofs.len(), !candidate_inactive)
                    < (current.fee, current.proofs.len(), !current_inactive)
            }
        };
        if better {
            best = Some((candidate, candidate_inactive));
        }
    }

    if let Some((selection, _)) = best {
        return Ok(selection);
    }

    // no single keyset covers the target: merge, rotation-dirty first
    let (mut pool, mut fresh): (Proofs, Proofs) = available
        .into_iter()
        .partition(|proof| inactive_keysets.contains(&proof.keyset_id));
    strategy.order(&mut pool);
    strategy.order(&mut fresh);
    pool.extend(fresh);

    match greedy_walk(target, pool.clone(), keyset_fees_ppk)? {
        Some(selection) => Ok(selection),
        None => {
            let fee = selection_fee(&pool, keyset_fees_ppk)?;
            Err(Error::InsufficientFunds {
                needed: target
                    .checked_add(fee)
                    .ok_or(cashu_core::amount::Error::AmountOverflow)?,
                available: available_total,
                fee,
            })
        }
    }
}

/// Greedy walk over already-ordered `proofs` until the picked sum covers
/// `target` plus the picked set's own fee; `None` when the pool runs dry
fn greedy_walk(
    target: Amount,
    proofs: Proofs,
    keyset_fees_ppk: &HashMap<Id, u64>,
) -> Result<Option<Selection>, Error> {
    let mut selected: Proofs = Vec::new();
    let mut selected_total = Amount::ZERO;

    for proof in proofs {
        selected_total = selected_total
            .checked_add(proof.amount)
            .ok_or(cashu_core::amount::Error::AmountOverflow)?;
        selected.push(proof);

        let fee = selection_fee(&selected, keyset_fees_ppk)?;
        let needed = target
            .checked_add(fee)
            .ok_or(cashu_core::amount::Error::AmountOverflow)?;
        if selected_total >= needed {
            return Ok(Some(Selection {
                proofs: selected,
                fee,
            }));
        }
    }

    Ok(None)
}

fn selection_fee(proofs: &[Proof], keyset_fees_ppk: &HashMap<Id, u64>) -> Result<Amount, Error> {
    let mut counts: HashMap<Id, u64> = HashMap::new();
    for proof in proofs {
        *counts.entry(proof.keyset_id).or_default() += 1;
    }
    Ok(calculate_fee(&counts, keyset_fees_ppk)?)
}
