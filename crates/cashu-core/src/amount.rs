//! Amounts and denomination math
//!
//! An [`Amount`] is a count of the wallet unit. Ecash notes only exist in
//! power-of-two denominations, so splitting an amount into notes is binary
//! decomposition.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Amount error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Summing amounts overflowed u64
    #[error("Amount overflow")]
    AmountOverflow,
    /// Split target larger than the amount being split
    #[error("Split target cannot exceed the amount")]
    SplitTargetTooLarge,
}

/// Amount in the unit of the wallet
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Amount zero
    pub const ZERO: Amount = Amount(0);
    /// Amount one
    pub const ONE: Amount = Amount(1);

    /// Split into the minimal multiset of powers of two, ascending
    pub fn split(&self) -> Vec<Self> {
        (0_u64..64)
            .filter_map(|bit| {
                let part = 1 << bit;
                ((self.0 & part) == part).then_some(Self(part))
            })
            .collect()
    }

    /// Split into powers of two steered by `target`, ascending
    ///
    /// [`SplitTarget::Value`] yields as many repetitions of the target's
    /// decomposition as fit, with the remainder split minimally. Used to keep
    /// a wallet stocked with spendable denominations.
    pub fn split_targeted(&self, target: &SplitTarget) -> Result<Vec<Self>, Error> {
        let mut parts = match *target {
            SplitTarget::None => self.split(),
            SplitTarget::Value(value) => {
                if self.le(&value) {
                    return Ok(self.split());
                }

                let value_parts = value.split();
                let mut parts = Vec::new();
                let mut remaining = self.0;

                while remaining >= value.0 {
                    parts.extend(value_parts.iter().copied());
                    remaining -= value.0;
                }

                parts.extend(Amount(remaining).split());
                parts
            }
            SplitTarget::Values(ref values) => {
                let values_total = Amount::try_sum(values.iter().copied())?;

                match self.cmp(&values_total) {
                    std::cmp::Ordering::Equal => values.clone(),
                    std::cmp::Ordering::Less => return Err(Error::SplitTargetTooLarge),
                    std::cmp::Ordering::Greater => {
                        let remaining = *self - values_total;
                        let mut parts = values.clone();
                        parts.extend(remaining.split());
                        parts
                    }
                }
            }
        };

        parts.sort();
        Ok(parts)
    }

    /// Checked sum of amounts
    pub fn try_sum<I>(iter: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Self>,
    {
        iter.into_iter().try_fold(Amount::ZERO, |acc, amount| {
            acc.0
                .checked_add(amount.0)
                .map(Amount)
                .ok_or(Error::AmountOverflow)
        })
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Checked addition
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
}

/// How an amount should be decomposed into notes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitTarget {
    /// Fewest notes
    #[default]
    None,
    /// Repetitions of a preferred denomination, remainder minimal
    Value(Amount),
    /// Exact denominations, remainder minimal
    Values(Vec<Amount>),
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<&u64> for Amount {
    fn from(value: &u64) -> Self {
        Self(*value)
    }
}

impl From<Amount> for u64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl AsRef<u64> for Amount {
    fn as_ref(&self) -> &u64 {
        &self.0
    }
}

impl std::ops::Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl core::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Amount(iter.map(|amt| amt.0).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split() {
        assert_eq!(Amount::from(0).split(), vec![]);
        assert_eq!(Amount::from(1).split(), vec![Amount::from(1)]);
        assert_eq!(Amount::from(13).split(), amounts(&[1, 4, 8]));
        assert_eq!(Amount::from(1024).split(), vec![Amount::from(1024)]);
        assert_eq!(
            Amount::from(255).split(),
            amounts(&[1, 2, 4, 8, 16, 32, 64, 128])
        );
    }

    #[test]
    fn test_split_is_ascending_and_sums() {
        for n in [1_u64, 7, 63, 64, 1000, 12_345_678] {
            let parts = Amount::from(n).split();
            let mut sorted = parts.clone();
            sorted.sort();
            assert_eq!(parts, sorted);
            assert!(parts.iter().all(|p| u64::from(*p).is_power_of_two()));
            assert_eq!(Amount::try_sum(parts).unwrap(), Amount::from(n));
        }
    }

    #[test]
    fn test_split_targeted_value() {
        let split = Amount::from(65)
            .split_targeted(&SplitTarget::Value(Amount::from(32)))
            .unwrap();
        assert_eq!(split, amounts(&[1, 32, 32]));

        let split = Amount::from(150)
            .split_targeted(&SplitTarget::Value(Amount::from(50)))
            .unwrap();
        assert_eq!(
            Amount::try_sum(split.iter().copied()).unwrap(),
            Amount::from(150)
        );
    }

    #[test]
    fn test_split_targeted_values() {
        let split = Amount::from(10)
            .split_targeted(&SplitTarget::Values(amounts(&[2, 8])))
            .unwrap();
        assert_eq!(split, amounts(&[2, 8]));

        let split = Amount::from(11)
            .split_targeted(&SplitTarget::Values(amounts(&[2, 8])))
            .unwrap();
        assert_eq!(split, amounts(&[1, 2, 8]));

        assert!(Amount::from(5)
            .split_targeted(&SplitTarget::Values(amounts(&[2, 8])))
            .is_err());
    }

    #[test]
    fn test_try_sum_overflow() {
        assert!(Amount::try_sum([Amount::from(u64::MAX), Amount::from(1)]).is_err());
    }

    fn amounts(values: &[u64]) -> Vec<Amount> {
        values.iter().map(|a| Amount::from(*a)).collect()
    }
}
