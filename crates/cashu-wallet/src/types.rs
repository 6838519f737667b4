//! Wallet-side records
//!
//! What the wallet persists about in-flight operations, enough to resume
//! any of them after a crash: quotes with their states, and a status on
//! every stored proof.

use cashu_core::amount::Amount;
use cashu_core::keys::SecretKey;
use cashu_core::messages::{MeltQuoteState, MintQuoteState};
use cashu_core::mint_url::MintUrl;
use cashu_core::proofs::{CurrencyUnit, Proofs};
use serde::{Deserialize, Serialize};

/// A mint quote the wallet is tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuote {
    /// Quote id
    pub id: String,
    /// Mint the quote is with
    pub mint_url: MintUrl,
    /// Amount to be issued
    pub amount: Amount,
    /// Unit
    pub unit: CurrencyUnit,
    /// Payment request to fulfil
    pub request: String,
    /// Last state seen from the mint
    pub state: MintQuoteState,
    /// Unix timestamp the quote is valid until
    pub expiry: Option<u64>,
    /// Key the issuance is locked to, when the mint supports quote
    /// signatures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<SecretKey>,
}

impl MintQuote {
    /// Whether the quote's expiry has passed
    pub fn is_expired(&self, now: u64) -> bool {
        match self.expiry {
            Some(expiry) => expiry != 0 && expiry < now,
            None => false,
        }
    }
}

/// A melt quote the wallet is tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletMeltQuote {
    /// Quote id
    pub id: String,
    /// Mint the quote is with
    pub mint_url: MintUrl,
    /// Amount that will be paid out
    pub amount: Amount,
    /// Unit
    pub unit: CurrencyUnit,
    /// Invoice being paid
    pub request: String,
    /// Fee reserve on top of the amount
    pub fee_reserve: Amount,
    /// Last state seen from the mint
    pub state: MeltQuoteState,
    /// Unix timestamp the quote is valid until
    pub expiry: u64,
    /// Preimage, once the payment settled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_preimage: Option<String>,
}

/// Result of a settled melt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Melted {
    /// Final state
    pub state: MeltQuoteState,
    /// Payment preimage
    pub preimage: Option<String>,
    /// Change unblinded from returned blanks
    pub change: Option<Proofs>,
    /// Amount paid out
    pub amount: Amount,
    /// Lightning fee actually consumed from the reserve
    pub fee_paid: Amount,
}

/// Local status of a stored proof
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProofStatus {
    /// Spendable
    Unspent,
    /// Committed to an in-flight operation; must not be selected again
    /// until the operation resolves
    Pending,
    /// Packed into a token that has left the wallet but is not yet known
    /// spent
    Reserved,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_expiry() {
        let quote = MintQuote {
            id: "q1".to_string(),
            mint_url: "https://mint.example.com".parse().unwrap(),
            amount: Amount::from(100),
            unit: CurrencyUnit::Sat,
            request: "lnbc...".to_string(),
            state: MintQuoteState::Unpaid,
            expiry: Some(100),
            secret_key: None,
        };

        assert!(!quote.is_expired(99));
        assert!(quote.is_expired(101));

        let no_expiry = MintQuote {
            expiry: Some(0),
            ..quote
        };
        assert!(!no_expiry.is_expired(u64::MAX));
    }
}
