//! Input fee accounting
//!
//! Each spent proof costs its keyset's `input_fee_ppk` thousandths of the
//! unit; the total is rounded up once per transaction, not per proof.

use std::collections::HashMap;

use thiserror::Error;

use crate::amount::Amount;
use crate::keyset::Id;
use crate::proofs::Proofs;

/// Fee error
#[derive(Debug, Error)]
pub enum Error {
    /// Fee requested for a keyset we have no info for
    #[error("Keyset id not known: `{0}`")]
    KeysetUnknown(Id),
    /// Amount overflow
    #[error(transparent)]
    Amount(#[from] crate::amount::Error),
}

/// Fee for a set of proof counts: `ceil(sum(count * ppk) / 1000)`
pub fn calculate_fee(
    proofs_count: &HashMap<Id, u64>,
    keyset_fee_ppk: &HashMap<Id, u64>,
) -> Result<Amount, Error> {
    let mut sum_fee_ppk: u64 = 0;

    for (keyset_id, count) in proofs_count {
        let ppk = keyset_fee_ppk
            .get(keyset_id)
            .ok_or(Error::KeysetUnknown(*keyset_id))?;

        sum_fee_ppk += ppk * count;
    }

    Ok(Amount::from(sum_fee_ppk.div_ceil(1000)))
}

/// Fee for a concrete proof set
pub fn proofs_fee(proofs: &Proofs, keyset_fee_ppk: &HashMap<Id, u64>) -> Result<Amount, Error> {
    let mut counts: HashMap<Id, u64> = HashMap::new();
    for proof in proofs {
        *counts.entry(proof.keyset_id).or_default() += 1;
    }
    calculate_fee(&counts, keyset_fee_ppk)
}

/// Check a transaction balances: `sum(inputs) - fee == sum(outputs)`
pub fn verify_balance(
    inputs: Amount,
    fee: Amount,
    outputs: Amount,
) -> Result<(), crate::amount::Error> {
    let spendable = inputs
        .checked_sub(fee)
        .ok_or(crate::amount::Error::AmountOverflow)?;

    if spendable != outputs {
        return Err(crate::amount::Error::AmountOverflow);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_fee_rounds_up_per_transaction() {
        let keyset_id = Id::from_str("001711afb1de20cb").unwrap();

        let mut fees = HashMap::new();
        fees.insert(keyset_id, 2);

        let mut counts = HashMap::new();

        for (count, expected) in [(1, 1), (500, 1), (1000, 2), (2000, 4), (3500, 7), (3501, 8)] {
            counts.insert(keyset_id, count);
            assert_eq!(
                calculate_fee(&counts, &fees).unwrap(),
                Amount::from(expected),
                "fee for {count} proofs at 2 ppk"
            );
        }
    }

    #[test]
    fn test_fee_zero_ppk_is_free() {
        let keyset_id = Id::from_str("001711afb1de20cb").unwrap();

        let mut fees = HashMap::new();
        fees.insert(keyset_id, 0);

        let mut counts = HashMap::new();
        counts.insert(keyset_id, 1000);

        assert_eq!(calculate_fee(&counts, &fees).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_three_proofs_at_100_ppk() {
        // inputs [64, 16, 4] at 100 ppk -> ceil(300/1000) = 1
        let keyset_id = Id::from_str("001711afb1de20cb").unwrap();

        let mut fees = HashMap::new();
        fees.insert(keyset_id, 100);

        let mut counts = HashMap::new();
        counts.insert(keyset_id, 3);

        let fee = calculate_fee(&counts, &fees).unwrap();
        assert_eq!(fee, Amount::ONE);

        // balance: 84 in, 1 fee, 83 out
        assert!(verify_balance(Amount::from(84), fee, Amount::from(83)).is_ok());
        assert!(verify_balance(Amount::from(84), fee, Amount::from(84)).is_err());
    }

    #[test]
    fn test_unknown_keyset_errors() {
        let keyset_id = Id::from_str("001711afb1de20cb").unwrap();

        let mut counts = HashMap::new();
        counts.insert(keyset_id, 1);

        assert!(calculate_fee(&counts, &HashMap::new()).is_err());
    }
}
