//! In-process mint for wallet tests
//!
//! Implements [`MintConnector`] over the same crypto the wallet uses, with
//! the mint-side signing oracle. Behaves like a small honest mint: verifies
//! proofs, refuses double spends, enforces balance and witnesses, replays
//! issued responses, and serves restore lookups.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use cashu_core::amount::Amount;
use cashu_core::dhke::{sign_message, verify_message};
use cashu_core::dleq::generate_dleq;
use cashu_core::fees::proofs_fee;
use cashu_core::info::{CacheSettings, MintInfo, SupportedSettings};
use cashu_core::keys::{PublicKey, SecretKey};
use cashu_core::keyset::{Id, KeySet, KeySetInfo, Keys, KeysetResponse};
use cashu_core::messages::{
    CheckStateRequest, CheckStateResponse, MeltQuoteRequest, MeltQuoteResponse, MeltQuoteState,
    MeltRequest, MintQuoteRequest, MintQuoteResponse, MintQuoteState, MintRequest, MintResponse,
    ProofState, ProofStateEntry, RestoreRequest, RestoreResponse, SwapRequest, SwapResponse,
};
use cashu_core::proofs::{
    BlindSignature, BlindedMessage, CurrencyUnit, Proof, Proofs,
};
use cashu_core::spend::{Kind, SigFlag, SpendingConditions, WellKnownSecret};

use crate::auth::MintAuthRequest;
use crate::connector::MintConnector;
use crate::error::Error;

const DEFAULT_MAX_ORDER: u32 = 12;

#[derive(Debug)]
struct FakeKeyset {
    id: Id,
    unit: CurrencyUnit,
    active: bool,
    input_fee_ppk: u64,
    secret_keys: BTreeMap<Amount, SecretKey>,
}

impl FakeKeyset {
    fn generate(unit: CurrencyUnit, input_fee_ppk: u64, max_order: u32) -> Self {
        let secret_keys: BTreeMap<Amount, SecretKey> = (0..max_order)
            .map(|order| (Amount::from(1_u64 << order), SecretKey::generate()))
            .collect();

        let keys = Keys::new(
            secret_keys
                .iter()
                .map(|(amount, key)| (*amount, key.public_key()))
                .collect(),
        );

        Self {
            id: Id::from_keys(&keys),
            unit,
            active: true,
            input_fee_ppk,
            secret_keys,
        }
    }

    fn keys(&self) -> Keys {
        Keys::new(
            self.secret_keys
                .iter()
                .map(|(amount, key)| (*amount, key.public_key()))
                .collect(),
        )
    }

    fn keyset(&self) -> KeySet {
        KeySet {
            id: self.id,
            unit: self.unit.clone(),
            keys: self.keys(),
        }
    }

    fn info(&self) -> KeySetInfo {
        KeySetInfo {
            id: self.id,
            unit: self.unit.clone(),
            active: self.active,
            input_fee_ppk: self.input_fee_ppk,
        }
    }
}

#[derive(Debug, Clone)]
struct FakeMintQuote {
    amount: Amount,
    state: MintQuoteState,
    pubkey: Option<PublicKey>,
}

#[derive(Debug, Clone)]
struct FakeMeltQuote {
    amount: Amount,
    fee_reserve: Amount,
    state: MeltQuoteState,
}

#[derive(Debug, Default)]
struct MintState {
    quote_seq: u64,
    mint_quotes: HashMap<String, FakeMintQuote>,
    melt_quotes: HashMap<String, FakeMeltQuote>,
    spent: HashSet<PublicKey>,
    issued: HashMap<String, (Vec<PublicKey>, MintResponse)>,
    signed: Vec<(PublicKey, BlindSignature)>,
}

/// The fake mint
#[derive(Debug)]
pub(crate) struct FakeMint {
    keysets: Mutex<Vec<FakeKeyset>>,
    auth_keyset: FakeKeyset,
    state: Mutex<MintState>,
    /// Lightning fee charged on melts, consumed from the reserve
    pub actual_ln_fee: Amount,
    /// Fee reserve quoted on melts
    pub melt_fee_reserve: Amount,
    /// When set, melts report payment failure
    pub fail_melts: bool,
}

impl FakeMint {
    pub fn new(input_fee_ppk: u64) -> Self {
        Self {
            keysets: Mutex::new(vec![FakeKeyset::generate(
                CurrencyUnit::Sat,
                input_fee_ppk,
                DEFAULT_MAX_ORDER,
            )]),
            auth_keyset: FakeKeyset::generate(CurrencyUnit::Auth, 0, 1),
            state: Mutex::new(MintState::default()),
            actual_ln_fee: Amount::ZERO,
            melt_fee_reserve: Amount::ZERO,
            fail_melts: false,
        }
    }

    /// Mark a mint quote as paid, as a settled invoice would
    pub fn mark_paid(&self, quote_id: &str) {
        let mut state = self.state.lock().expect("lock");
        if let Some(quote) = state.mint_quotes.get_mut(quote_id) {
            if quote.state == MintQuoteState::Unpaid {
                quote.state = MintQuoteState::Paid;
            }
        }
    }

    /// Retire the active keyset and open a fresh one
    pub fn rotate_keysets(&self, input_fee_ppk: u64) -> Id {
        let mut keysets = self.keysets.lock().expect("lock");
        for keyset in keysets.iter_mut() {
            keyset.active = false;
        }
        let fresh = FakeKeyset::generate(CurrencyUnit::Sat, input_fee_ppk, DEFAULT_MAX_ORDER);
        let id = fresh.id;
        keysets.push(fresh);
        id
    }

    fn sign_output(
        &self,
        output: &BlindedMessage,
        amount: Amount,
    ) -> Result<BlindSignature, Error> {
        let keysets = self.keysets.lock().expect("lock");

        let keyset = keysets
            .iter()
            .find(|keyset| keyset.id == output.keyset_id)
            .or(Some(&self.auth_keyset).filter(|k| k.id == output.keyset_id))
            .ok_or(Error::UnknownKeySet)?;

        let secret_key = keyset
            .secret_keys
            .get(&amount)
            .ok_or(Error::AmountOutOfRange)?;

        let c = sign_message(secret_key, &output.blinded_secret)?;
        let dleq = generate_dleq(c, &output.blinded_secret, secret_key)?;

        let signature = BlindSignature {
            amount,
            keyset_id: output.keyset_id,
            c,
            dleq: Some(dleq),
        };

        self.state
            .lock()
            .expect("lock")
            .signed
            .push((output.blinded_secret, signature.clone()));

        Ok(signature)
    }

    fn verify_input(&self, proof: &Proof) -> Result<PublicKey, Error> {
        let keysets = self.keysets.lock().expect("lock");
        let keyset = keysets
            .iter()
            .find(|keyset| keyset.id == proof.keyset_id)
            .ok_or(Error::UnknownKeySet)?;

        let secret_key = keyset
            .secret_keys
            .get(&proof.amount)
            .ok_or(Error::AmountOutOfRange)?;

        verify_message(secret_key, proof.c, proof.secret.as_bytes())
            .map_err(|_| Error::InvalidSignature)?;

        let y = proof.y()?;
        if self.state.lock().expect("lock").spent.contains(&y) {
            return Err(Error::TokenAlreadySpent);
        }

        Ok(y)
    }

    fn verify_witnesses(
        &self,
        inputs: &Proofs,
        outputs: &[BlindedMessage],
    ) -> Result<(), Error> {
        for proof in inputs {
            let Ok(well_known) = WellKnownSecret::try_from(&proof.secret) else {
                continue;
            };
            let lock = SpendingConditions::try_from(&well_known)?;
            let sig_flag = match &lock {
                SpendingConditions::P2pk { conditions, .. }
                | SpendingConditions::Htlc { conditions, .. } => conditions
                    .as_ref()
                    .map(|c| c.sig_flag)
                    .unwrap_or_default(),
            };

            if sig_flag == SigFlag::SigAll {
                // transcript signature carried on the first input
                let msg = cashu_core::spend::p2pk::sig_all_msg(inputs, outputs);
                let pubkeys = lock.pubkeys().unwrap_or_default();
                let signatures: Vec<_> = inputs
                    .first()
                    .and_then(|p| p.witness.as_ref())
                    .and_then(|w| w.signatures())
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|s| {
                        bitcoin::secp256k1::schnorr::Signature::from_str(s).ok()
                    })
                    .collect();

                if cashu_core::spend::p2pk::valid_signatures(&msg, &pubkeys, &signatures) < 1 {
                    return Err(Error::InvalidSignature);
                }
                continue;
            }

            match well_known.kind {
                Kind::P2PK => proof.verify_p2pk().map_err(|_| Error::InvalidSignature)?,
                Kind::HTLC => proof.verify_htlc().map_err(|_| Error::InvalidSignature)?,
            }
        }

        Ok(())
    }

    fn fees_by_keyset(&self) -> HashMap<Id, u64> {
        self.keysets
            .lock()
            .expect("lock")
            .iter()
            .map(|keyset| (keyset.id, keyset.input_fee_ppk))
            .collect()
    }

    fn next_quote_id(&self, prefix: &str) -> String {
        let mut state = self.state.lock().expect("lock");
        state.quote_seq += 1;
        format!("{}-{}", prefix, state.quote_seq)
    }
}

#[async_trait]
impl MintConnector for FakeMint {
    async fn get_mint_keys(&self) -> Result<Vec<KeySet>, Error> {
        Ok(self
            .keysets
            .lock()
            .expect("lock")
            .iter()
            .filter(|keyset| keyset.active)
            .map(FakeKeyset::keyset)
            .collect())
    }

    async fn get_mint_keyset(&self, keyset_id: Id) -> Result<KeySet, Error> {
        self.keysets
            .lock()
            .expect("lock")
            .iter()
            .find(|keyset| keyset.id == keyset_id)
            .map(FakeKeyset::keyset)
            .ok_or(Error::UnknownKeySet)
    }

    async fn get_mint_keysets(&self) -> Result<KeysetResponse, Error> {
        Ok(KeysetResponse {
            keysets: self
                .keysets
                .lock()
                .expect("lock")
                .iter()
                .map(FakeKeyset::info)
                .collect(),
        })
    }

    async fn get_mint_info(&self) -> Result<MintInfo, Error> {
        let mut info = MintInfo {
            name: Some("fake mint".to_string()),
            ..Default::default()
        };
        info.nuts.nut07 = SupportedSettings { supported: true };
        info.nuts.nut08 = SupportedSettings { supported: true };
        info.nuts.nut09 = SupportedSettings { supported: true };
        info.nuts.nut12 = SupportedSettings { supported: true };
        info.nuts.nut20 = SupportedSettings { supported: true };
        info.nuts.nut19 = Some(CacheSettings {
            ttl: Some(300),
            cached_endpoints: Vec::new(),
        });
        Ok(info)
    }

    async fn post_mint_quote(
        &self,
        request: MintQuoteRequest,
    ) -> Result<MintQuoteResponse, Error> {
        let quote_id = self.next_quote_id("mint-quote");

        self.state.lock().expect("lock").mint_quotes.insert(
            quote_id.clone(),
            FakeMintQuote {
                amount: request.amount,
                state: MintQuoteState::Unpaid,
                pubkey: request.pubkey,
            },
        );

        Ok(MintQuoteResponse {
            quote: quote_id,
            request: "lnbc1fakeinvoice".to_string(),
            amount: Some(request.amount),
            unit: Some(request.unit),
            state: MintQuoteState::Unpaid,
            expiry: Some(u64::MAX),
            pubkey: request.pubkey,
        })
    }

    async fn get_mint_quote_state(&self, quote_id: &str) -> Result<MintQuoteResponse, Error> {
        let state = self.state.lock().expect("lock");
        let quote = state.mint_quotes.get(quote_id).ok_or(Error::UnknownQuote)?;

        Ok(MintQuoteResponse {
            quote: quote_id.to_string(),
            request: "lnbc1fakeinvoice".to_string(),
            amount: Some(quote.amount),
            unit: Some(CurrencyUnit::Sat),
            state: quote.state,
            expiry: Some(u64::MAX),
            pubkey: quote.pubkey,
        })
    }

    async fn post_mint(&self, request: MintRequest) -> Result<MintResponse, Error> {
        let (amount, pubkey, state, replay) = {
            let state = self.state.lock().expect("lock");
            let quote = state
                .mint_quotes
                .get(&request.quote)
                .ok_or(Error::UnknownQuote)?;
            (
                quote.amount,
                quote.pubkey,
                quote.state,
                state.issued.get(&request.quote).cloned(),
            )
        };

        let request_bs: Vec<PublicKey> = request
            .outputs
            .iter()
            .map(|output| output.blinded_secret)
            .collect();

        match state {
            MintQuoteState::Unpaid => {
                return Err(Error::QuoteState {
                    quote_id: request.quote,
                    state: "UNPAID".to_string(),
                })
            }
            MintQuoteState::Issued => {
                // identical replay is answered from cache; fresh outputs on
                // an issued quote are refused
                return match replay {
                    Some((bs, response)) if bs == request_bs => Ok(response),
                    _ => Err(Error::QuoteAlreadyIssued),
                };
            }
            MintQuoteState::Paid => (),
        }

        if let Some(pubkey) = pubkey {
            request
                .verify_signature(pubkey)
                .map_err(|_| Error::SignatureRequiredOnQuote)?;
        }

        if request.total_amount()? != amount {
            return Err(Error::TransactionUnbalanced {
                inputs: amount.into(),
                outputs: request.total_amount()?.into(),
                fee: 0,
            });
        }

        let signatures = request
            .outputs
            .iter()
            .map(|output| self.sign_output(output, output.amount))
            .collect::<Result<Vec<_>, _>>()?;

        let response = MintResponse { signatures };

        {
            let mut state = self.state.lock().expect("lock");
            if let Some(quote) = state.mint_quotes.get_mut(&request.quote) {
                quote.state = MintQuoteState::Issued;
            }
            state
                .issued
                .insert(request.quote.clone(), (request_bs, response.clone()));
        }

        Ok(response)
    }

    async fn post_swap(&self, request: SwapRequest) -> Result<SwapResponse, Error> {
        let mut ys = Vec::with_capacity(request.inputs.len());
        for proof in &request.inputs {
            ys.push(self.verify_input(proof)?);
        }

        let unique: HashSet<_> = ys.iter().collect();
        if unique.len() != ys.len() {
            return Err(Error::TokenAlreadySpent);
        }

        self.verify_witnesses(&request.inputs, &request.outputs)?;

        let fee = proofs_fee(&request.inputs, &self.fees_by_keyset())?;
        let inputs = request.input_amount()?;
        let outputs = request.output_amount()?;

        if inputs.checked_sub(fee) != Some(outputs) {
            return Err(Error::TransactionUnbalanced {
                inputs: inputs.into(),
                outputs: outputs.into(),
                fee: fee.into(),
            });
        }

        self.state.lock().expect("lock").spent.extend(ys);

        let signatures = request
            .outputs
            .iter()
            .map(|output| self.sign_output(output, output.amount))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SwapResponse { signatures })
    }

    async fn post_melt_quote(
        &self,
        request: MeltQuoteRequest,
    ) -> Result<MeltQuoteResponse, Error> {
        let amount_msat = request.amount_msat()?;
        let amount = Amount::from(u64::from(amount_msat) / 1000);

        let quote_id = self.next_quote_id("melt-quote");

        self.state.lock().expect("lock").melt_quotes.insert(
            quote_id.clone(),
            FakeMeltQuote {
                amount,
                fee_reserve: self.melt_fee_reserve,
                state: MeltQuoteState::Unpaid,
            },
        );

        Ok(MeltQuoteResponse {
            quote: quote_id,
            amount,
            fee_reserve: self.melt_fee_reserve,
            state: MeltQuoteState::Unpaid,
            expiry: u64::MAX,
            payment_preimage: None,
            change: None,
        })
    }

    async fn get_melt_quote_state(&self, quote_id: &str) -> Result<MeltQuoteResponse, Error> {
        let state = self.state.lock().expect("lock");
        let quote = state.melt_quotes.get(quote_id).ok_or(Error::UnknownQuote)?;

        Ok(MeltQuoteResponse {
            quote: quote_id.to_string(),
            amount: quote.amount,
            fee_reserve: quote.fee_reserve,
            state: quote.state,
            expiry: u64::MAX,
            payment_preimage: None,
            change: None,
        })
    }

    async fn post_melt(&self, request: MeltRequest) -> Result<MeltQuoteResponse, Error> {
        let quote = {
            let state = self.state.lock().expect("lock");
            state
                .melt_quotes
                .get(&request.quote)
                .cloned()
                .ok_or(Error::UnknownQuote)?
        };

        if quote.state == MeltQuoteState::Paid {
            return Err(Error::RequestAlreadyPaid);
        }

        let mut ys = Vec::with_capacity(request.inputs.len());
        for proof in &request.inputs {
            ys.push(self.verify_input(proof)?);
        }

        if self.fail_melts {
            return Ok(MeltQuoteResponse {
                quote: request.quote,
                amount: quote.amount,
                fee_reserve: quote.fee_reserve,
                state: MeltQuoteState::Unpaid,
                expiry: u64::MAX,
                payment_preimage: None,
                change: None,
            });
        }

        let fee = proofs_fee(&request.inputs, &self.fees_by_keyset())?;
        let inputs = request.input_amount()?;

        let needed = quote.amount + quote.fee_reserve + fee;
        if inputs < needed {
            return Err(Error::TransactionUnbalanced {
                inputs: inputs.into(),
                outputs: needed.into(),
                fee: fee.into(),
            });
        }

        self.state.lock().expect("lock").spent.extend(ys);

        // fee return: sign blanks for the unspent reserve, smallest first
        let change_amount = quote
            .fee_reserve
            .checked_sub(self.actual_ln_fee)
            .unwrap_or(Amount::ZERO);

        let change = match &request.outputs {
            Some(blanks) if change_amount > Amount::ZERO => {
                let denominations = change_amount.split();
                let signatures = denominations
                    .iter()
                    .zip(blanks)
                    .map(|(amount, blank)| self.sign_output(blank, *amount))
                    .collect::<Result<Vec<_>, _>>()?;
                Some(signatures)
            }
            _ => None,
        };

        {
            let mut state = self.state.lock().expect("lock");
            if let Some(stored) = state.melt_quotes.get_mut(&request.quote) {
                stored.state = MeltQuoteState::Paid;
            }
        }

        Ok(MeltQuoteResponse {
            quote: request.quote,
            amount: quote.amount,
            fee_reserve: quote.fee_reserve,
            state: MeltQuoteState::Paid,
            expiry: u64::MAX,
            payment_preimage: Some("fake-preimage".to_string()),
            change,
        })
    }

    async fn post_check_state(
        &self,
        request: CheckStateRequest,
    ) -> Result<CheckStateResponse, Error> {
        let state = self.state.lock().expect("lock");

        Ok(CheckStateResponse {
            states: request
                .ys
                .into_iter()
                .map(|y| ProofStateEntry {
                    y,
                    state: if state.spent.contains(&y) {
                        ProofState::Spent
                    } else {
                        ProofState::Unspent
                    },
                    witness: None,
                })
                .collect(),
        })
    }

    async fn post_restore(&self, request: RestoreRequest) -> Result<RestoreResponse, Error> {
        let state = self.state.lock().expect("lock");

        let mut outputs = Vec::new();
        let mut signatures = Vec::new();

        for output in request.outputs {
            if let Some((_, signature)) = state
                .signed
                .iter()
                .find(|(blinded_secret, _)| *blinded_secret == output.blinded_secret)
            {
                outputs.push(output);
                signatures.push(signature.clone());
            }
        }

        Ok(RestoreResponse {
            outputs,
            signatures,
        })
    }

    async fn get_blind_auth_keysets(&self) -> Result<KeysetResponse, Error> {
        Ok(KeysetResponse {
            keysets: vec![self.auth_keyset.info()],
        })
    }

    async fn get_blind_auth_keyset(&self, keyset_id: Id) -> Result<KeySet, Error> {
        if keyset_id != self.auth_keyset.id {
            return Err(Error::UnknownKeySet);
        }
        Ok(self.auth_keyset.keyset())
    }

    async fn post_mint_blind_auth(&self, request: MintAuthRequest) -> Result<MintResponse, Error> {
        let signatures = request
            .outputs
            .iter()
            .map(|output| self.sign_output(output, Amount::ONE))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MintResponse { signatures })
    }
}
