//! Errors
//!
//! One aggregate error for the wallet, sorted by where the failure lives:
//! crypto and protocol failures kill the current operation and are never
//! retried; resource errors carry structured amounts; transport errors are
//! the retryable class; auth errors drive the login flows.

use std::fmt;

use cashu_core::amount::Amount;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Wallet error
#[derive(Debug, Error)]
pub enum Error {
    // Crypto: fatal to the operation, never retried
    /// DLEQ proof on a signature or received proof failed
    #[error("Could not verify DLEQ proof")]
    CouldNotVerifyDleq,
    /// Signature on a quote or witness failed
    #[error("Invalid signature")]
    InvalidSignature,

    // Protocol
    /// Mint response did not parse or contradicts the request
    #[error("Malformed mint response: {0}")]
    MalformedResponse(String),
    /// Signature count does not match outputs sent
    #[error("Mint returned {got} signatures for {expected} outputs")]
    SignatureCountMismatch {
        /// Outputs sent
        expected: usize,
        /// Signatures returned
        got: usize,
    },
    /// Amounts out of balance
    #[error("Inputs: `{inputs}`, outputs: `{outputs}`, expected fee: `{fee}`")]
    TransactionUnbalanced {
        /// Input total
        inputs: u64,
        /// Output total
        outputs: u64,
        /// Fee expected by the mint
        fee: u64,
    },
    /// Quote is not in the state the operation needs
    #[error("Quote `{quote_id}` is in state `{state}`")]
    QuoteState {
        /// Quote id
        quote_id: String,
        /// State it is in
        state: String,
    },
    /// Quote expired
    #[error("Quote expired")]
    QuoteExpired,
    /// Quote is not known
    #[error("Unknown quote")]
    UnknownQuote,
    /// Ecash already issued for the quote
    #[error("Quote already issued")]
    QuoteAlreadyIssued,
    /// Quote pending at the mint
    #[error("Quote pending")]
    QuotePending,
    /// Invoice already paid
    #[error("Request already paid")]
    RequestAlreadyPaid,
    /// Mint says a provided proof is already spent
    #[error("Token already spent")]
    TokenAlreadySpent,
    /// Mint says a provided proof is in-flight elsewhere
    #[error("Token pending")]
    TokenPending,
    /// Lightning payment failed at the mint
    #[error("Payment failed")]
    PaymentFailed,
    /// Keyset is not known to the mint
    #[error("Unknown keyset")]
    UnknownKeySet,
    /// Keyset can no longer sign
    #[error("Keyset inactive")]
    InactiveKeyset,
    /// Mint does not support a feature the operation needs
    #[error("Mint does not support `{0}`")]
    UnsupportedMintFeature(&'static str),

    // Resource
    /// Not enough funds to cover amount plus fees
    #[error("Insufficient funds: needed `{needed}`, available `{available}`, fee `{fee}`")]
    InsufficientFunds {
        /// Amount the operation needs, fees included
        needed: Amount,
        /// Spendable balance
        available: Amount,
        /// Fee portion of `needed`
        fee: Amount,
    },
    /// No active keyset for the wallet unit
    #[error("No active keyset for unit")]
    NoActiveKeyset,
    /// Token or quote is in a different unit than the wallet
    #[error("Unit mismatch")]
    UnitMismatch,
    /// Amount outside the mint's allowed range
    #[error("Amount out of the mint's allowed range")]
    AmountOutOfRange,

    // Transport
    /// Deadline exceeded
    #[error("Request timed out")]
    Timeout,
    /// HTTP transport failure
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    // Auth
    /// Endpoint needs auth but no auth is configured
    #[error("Mint requires auth for this endpoint")]
    AuthRequired,
    /// Clear auth token was rejected
    #[error("Clear auth failed")]
    ClearAuthFailed,
    /// Device-code flow has not been approved yet
    #[error("Authorization pending")]
    AuthorizationPending,
    /// Device-code polling too fast
    #[error("Authorization polling too fast")]
    AuthSlowDown,
    /// Auth token expired and cannot be refreshed
    #[error("Auth expired, user must re-authenticate")]
    AuthExpired,
    /// No blind auth token available for a protected call
    #[error("No blind auth token available")]
    BlindAuthTokenMissing,
    /// Quote requires a signature but the wallet has no key for it
    #[error("Signature required on quote")]
    SignatureRequiredOnQuote,

    // User
    /// Operation needs the wallet seed
    #[error("Wallet seed required")]
    SeedRequired,
    /// Token could not be parsed
    #[error("Invalid token")]
    InvalidToken,
    /// Token is from a different mint than this wallet
    #[error("Token does not match wallet mint")]
    IncorrectMint,
    /// Invoice could not be parsed
    #[error(transparent)]
    Invoice(#[from] lightning_invoice::ParseOrSemanticError),
    /// Mnemonic could not be parsed
    #[error(transparent)]
    Mnemonic(#[from] bip39::Error),
    /// Mint url could not be parsed
    #[error(transparent)]
    MintUrl(#[from] cashu_core::mint_url::Error),

    /// Unknown error code from the mint, raw payload preserved
    #[error("Mint error: {0}")]
    Mint(ErrorResponse),

    // Core conversions
    /// Amount error
    #[error(transparent)]
    Amount(#[from] cashu_core::amount::Error),
    /// DHKE error
    #[error(transparent)]
    Dhke(#[from] cashu_core::dhke::Error),
    /// DLEQ error
    #[error(transparent)]
    Dleq(#[from] cashu_core::dleq::Error),
    /// Derivation error
    #[error(transparent)]
    Derivation(#[from] cashu_core::derivation::Error),
    /// Fee error
    #[error(transparent)]
    Fees(#[from] cashu_core::fees::Error),
    /// Key error
    #[error(transparent)]
    Keys(#[from] cashu_core::keys::Error),
    /// Keyset error
    #[error(transparent)]
    Keyset(#[from] cashu_core::keyset::Error),
    /// Message error
    #[error(transparent)]
    Messages(#[from] cashu_core::messages::Error),
    /// Model error
    #[error(transparent)]
    Proofs(#[from] cashu_core::proofs::Error),
    /// Secret error
    #[error(transparent)]
    Secret(#[from] cashu_core::secret::Error),
    /// Spending condition error
    #[error(transparent)]
    Spend(#[from] cashu_core::spend::Error),
    /// Token error
    #[error(transparent)]
    Token(#[from] cashu_core::token::Error),
    /// Store error
    #[error(transparent)]
    Store(#[from] crate::store::Error),
    /// JSON error
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    /// Whether a retry could help: transport failures only, never protocol
    /// or validation errors
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Http(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err
                        .status()
                        .map(|status| status.is_server_error())
                        .unwrap_or(true)
            }
            _ => false,
        }
    }
}

/// Error body the mint sends with a 4xx
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code
    pub code: ErrorCode,
    /// Human readable text
    pub error: Option<String>,
    /// Longer description
    pub detail: Option<String>,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "code: {}, error: {}, detail: {}",
            self.code,
            self.error.clone().unwrap_or_default(),
            self.detail.clone().unwrap_or_default()
        )
    }
}

impl ErrorResponse {
    /// Parse from a response body; anything unrecognizable becomes an
    /// unknown-code response carrying the raw payload
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<ErrorResponse>(value.clone()) {
            Ok(response) => response,
            Err(_) => Self {
                code: ErrorCode::Unknown(999),
                error: Some(value.to_string()),
                detail: None,
            },
        }
    }
}

impl From<ErrorResponse> for Error {
    fn from(response: ErrorResponse) -> Error {
        match response.code {
            ErrorCode::TokenAlreadySpent => Self::TokenAlreadySpent,
            ErrorCode::TokenPending => Self::TokenPending,
            ErrorCode::QuoteNotPaid => Self::QuoteState {
                quote_id: String::new(),
                state: "UNPAID".to_string(),
            },
            ErrorCode::QuotePending => Self::QuotePending,
            ErrorCode::QuoteExpired => Self::QuoteExpired,
            ErrorCode::TokensAlreadyIssued => Self::QuoteAlreadyIssued,
            ErrorCode::KeysetNotFound => Self::UnknownKeySet,
            ErrorCode::KeysetInactive => Self::InactiveKeyset,
            ErrorCode::UnitUnsupported => Self::UnitMismatch,
            ErrorCode::TransactionUnbalanced => Self::TransactionUnbalanced {
                inputs: 0,
                outputs: 0,
                fee: 0,
            },
            ErrorCode::AmountOutOfRange => Self::AmountOutOfRange,
            ErrorCode::InvoiceAlreadyPaid => Self::RequestAlreadyPaid,
            ErrorCode::LightningError => Self::PaymentFailed,
            ErrorCode::TokenNotVerified => Self::InvalidSignature,
            ErrorCode::WitnessMissingOrInvalid => Self::SignatureRequiredOnQuote,
            ErrorCode::ClearAuthRequired => Self::AuthRequired,
            ErrorCode::ClearAuthFailed => Self::ClearAuthFailed,
            ErrorCode::BlindAuthRequired => Self::AuthRequired,
            ErrorCode::BlindAuthFailed => Self::BlindAuthTokenMissing,
            _ => Self::Mint(response),
        }
    }
}

/// Known error codes on the wire
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ErrorCode {
    /// Blinded message already signed
    BlindedMessageAlreadySigned,
    /// Proof is not verifiable
    TokenNotVerified,
    /// Proof already spent
    TokenAlreadySpent,
    /// Transaction does not balance
    TransactionUnbalanced,
    /// Unit not supported
    UnitUnsupported,
    /// Amount out of allowed range
    AmountOutOfRange,
    /// Proof pending in another transaction
    TokenPending,
    /// Keyset not found
    KeysetNotFound,
    /// Keyset inactive
    KeysetInactive,
    /// Lightning payment error
    LightningError,
    /// Quote not paid
    QuoteNotPaid,
    /// Ecash already issued
    TokensAlreadyIssued,
    /// Minting disabled
    MintingDisabled,
    /// Quote pending
    QuotePending,
    /// Invoice already paid
    InvoiceAlreadyPaid,
    /// Quote expired
    QuoteExpired,
    /// Quote signature missing or invalid
    WitnessMissingOrInvalid,
    /// Endpoint requires clear auth
    ClearAuthRequired,
    /// Clear auth token rejected
    ClearAuthFailed,
    /// Endpoint requires blind auth
    BlindAuthRequired,
    /// Blind auth token rejected
    BlindAuthFailed,
    /// Code this wallet does not know
    Unknown(u16),
}

impl ErrorCode {
    /// From the numeric wire form
    pub fn from_code(code: u16) -> Self {
        match code {
            10002 => Self::BlindedMessageAlreadySigned,
            10003 => Self::TokenNotVerified,
            11001 => Self::TokenAlreadySpent,
            11002 => Self::TransactionUnbalanced,
            11005 => Self::UnitUnsupported,
            11006 => Self::AmountOutOfRange,
            11007 => Self::TokenPending,
            12001 => Self::KeysetNotFound,
            12002 => Self::KeysetInactive,
            20000 => Self::LightningError,
            20001 => Self::QuoteNotPaid,
            20002 => Self::TokensAlreadyIssued,
            20003 => Self::MintingDisabled,
            20005 => Self::QuotePending,
            20006 => Self::InvoiceAlreadyPaid,
            20007 => Self::QuoteExpired,
            20008 => Self::WitnessMissingOrInvalid,
            30001 => Self::ClearAuthRequired,
            30002 => Self::ClearAuthFailed,
            31001 => Self::BlindAuthRequired,
            31002 => Self::BlindAuthFailed,
            _ => Self::Unknown(code),
        }
    }

    /// To the numeric wire form
    pub fn to_code(&self) -> u16 {
        match self {
            Self::BlindedMessageAlreadySigned => 10002,
            Self::TokenNotVerified => 10003,
            Self::TokenAlreadySpent => 11001,
            Self::TransactionUnbalanced => 11002,
            Self::UnitUnsupported => 11005,
            Self::AmountOutOfRange => 11006,
            Self::TokenPending => 11007,
            Self::KeysetNotFound => 12001,
            Self::KeysetInactive => 12002,
            Self::LightningError => 20000,
            Self::QuoteNotPaid => 20001,
            Self::TokensAlreadyIssued => 20002,
            Self::MintingDisabled => 20003,
            Self::QuotePending => 20005,
            Self::InvoiceAlreadyPaid => 20006,
            Self::QuoteExpired => 20007,
            Self::WitnessMissingOrInvalid => 20008,
            Self::ClearAuthRequired => 30001,
            Self::ClearAuthFailed => 30002,
            Self::BlindAuthRequired => 31001,
            Self::BlindAuthFailed => 31002,
            Self::Unknown(code) => *code,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u16(self.to_code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = u16::deserialize(deserializer)?;
        Ok(ErrorCode::from_code(code))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_round_trip() {
        for code in [
            10002, 10003, 11001, 11002, 11005, 11006, 11007, 12001, 12002, 20000, 20001, 20002,
            20003, 20005, 20006, 20007, 20008, 30001, 30002, 31001, 31002,
        ] {
            assert_eq!(ErrorCode::from_code(code).to_code(), code);
        }
    }

    #[test]
    fn test_unknown_code_preserved() {
        let response =
            ErrorResponse::from_value(serde_json::json!({"code": 42424, "error": "novel"}));
        assert_eq!(response.code, ErrorCode::Unknown(42424));

        match Error::from(response) {
            Error::Mint(inner) => assert_eq!(inner.code.to_code(), 42424),
            other => panic!("expected Error::Mint, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_body_becomes_unknown() {
        let response = ErrorResponse::from_value(serde_json::json!({"weird": true}));
        assert_eq!(response.code, ErrorCode::Unknown(999));
        assert!(response.error.unwrap().contains("weird"));
    }

    #[test]
    fn test_spent_code_maps_to_domain_error() {
        let response = ErrorResponse {
            code: ErrorCode::TokenAlreadySpent,
            error: None,
            detail: None,
        };
        assert!(matches!(Error::from(response), Error::TokenAlreadySpent));
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Timeout.is_transient());
        assert!(!Error::TokenAlreadySpent.is_transient());
        assert!(!Error::CouldNotVerifyDleq.is_transient());
    }
}
