#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod amount;
pub mod derivation;
pub mod dhke;
pub mod dleq;
pub mod fees;
pub mod info;
pub mod keys;
pub mod keyset;
pub mod messages;
pub mod mint_url;
pub mod payment_request;
pub mod proofs;
pub mod secret;
pub mod spend;
pub mod token;
pub mod util;

pub use lightning_invoice::{self, Bolt11Invoice};

pub use self::amount::{Amount, SplitTarget};
pub use self::dleq::{BlindSignatureDleq, ProofDleq};
pub use self::info::MintInfo;
pub use self::keys::{PublicKey, SecretKey};
pub use self::keyset::{Id, KeySet, KeySetInfo, Keys};
pub use self::mint_url::MintUrl;
pub use self::proofs::{
    BlindSignature, BlindedMessage, CurrencyUnit, PaymentMethod, PreMint, PreMintSecrets, Proof,
    Proofs, Witness,
};
pub use self::secret::Secret;
pub use self::spend::SpendingConditions;
pub use self::token::Token;
pub use self::util::SECP256K1;

#[doc(hidden)]
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
