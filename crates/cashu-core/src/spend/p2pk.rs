//! Pay-to-public-key locks
//!
//! The secret's `data` names the receiving key; tags can add further
//! signers, a threshold, a locktime and refund keys. Witness signatures are
//! BIP-340 Schnorr over the secret bytes (SIG_INPUTS) or over the whole
//! transaction transcript (SIG_ALL).

use std::str::FromStr;

use bitcoin::secp256k1::schnorr::Signature;
use serde::{Deserialize, Serialize};

use super::{Error, Kind, SpendingConditions, WellKnownSecret};
use crate::keys::{PublicKey, SecretKey};
use crate::proofs::{BlindedMessage, Proof, Witness};
use crate::util::unix_time;

/// P2PK witness: signatures over the secret
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct P2pkWitness {
    /// BIP-340 signatures, hex encoded
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<String>,
}

/// Count how many of `pubkeys` have a valid signature over `msg`
///
/// Each key counts at most once, so a repeated signature cannot inflate a
/// threshold.
pub fn valid_signatures(msg: &[u8], pubkeys: &[PublicKey], signatures: &[Signature]) -> u64 {
    pubkeys
        .iter()
        .filter(|pubkey| signatures.iter().any(|sig| pubkey.verify(msg, sig).is_ok()))
        .count() as u64
}

/// The SIG_ALL transcript: every input secret, then every output `B_`,
/// concatenated as ASCII
pub fn sig_all_msg(inputs: &[Proof], outputs: &[BlindedMessage]) -> Vec<u8> {
    let mut msg = String::new();
    for input in inputs {
        msg.push_str(&input.secret.to_string());
    }
    for output in outputs {
        msg.push_str(&output.blinded_secret.to_hex());
    }
    msg.into_bytes()
}

impl Proof {
    /// Verify the P2PK witness on this proof
    pub fn verify_p2pk(&self) -> Result<(), Error> {
        let well_known = WellKnownSecret::try_from(&self.secret)?;
        if well_known.kind != Kind::P2PK {
            return Err(Error::KindMismatch);
        }
        let lock = SpendingConditions::try_from(&well_known)?;

        let msg = self.secret.as_bytes();
        let signatures: Vec<Signature> = self
            .witness
            .as_ref()
            .and_then(Witness::signatures)
            .unwrap_or_default()
            .iter()
            .filter_map(|s| Signature::from_str(s).ok())
            .collect();

        // After the locktime the refund keys take over; with no refund keys
        // the proof is anyone-can-spend.
        if let Some(locktime) = lock.locktime() {
            if locktime < unix_time() {
                return match lock.refund_keys() {
                    None => Ok(()),
                    Some(refund_keys) => {
                        if valid_signatures(msg, &refund_keys, &signatures) >= 1 {
                            Ok(())
                        } else {
                            Err(Error::ConditionsNotMet)
                        }
                    }
                };
            }
        }

        let pubkeys = lock.pubkeys().unwrap_or_default();
        let required = match &lock {
            SpendingConditions::P2pk { conditions, .. } => conditions
                .as_ref()
                .and_then(|c| c.num_sigs)
                .unwrap_or(1),
            _ => 1,
        };

        if valid_signatures(msg, &pubkeys, &signatures) >= required {
            Ok(())
        } else {
            Err(Error::ConditionsNotMet)
        }
    }

    /// Sign this proof's secret and append the signature to the witness
    pub fn sign_p2pk(&mut self, secret_key: &SecretKey) -> Result<(), Error> {
        let signature: Signature = secret_key.sign(self.secret.as_bytes())?;

        match self.witness.as_mut() {
            Some(witness) => witness.add_signatures(vec![signature.to_string()]),
            None => {
                self.witness = Some(Witness::P2pk(P2pkWitness {
                    signatures: vec![signature.to_string()],
                }));
            }
        }

        Ok(())
    }
}

impl BlindedMessage {
    /// Sign this output's `B_` (SIG_ALL flows)
    pub fn sign_p2pk(&mut self, secret_key: &SecretKey) -> Result<(), Error> {
        let msg: [u8; 33] = self.blinded_secret.to_bytes();
        let signature: Signature = secret_key.sign(&msg)?;

        match self.witness.as_mut() {
            Some(witness) => witness.add_signatures(vec![signature.to_string()]),
            None => {
                self.witness = Some(Witness::P2pk(P2pkWitness {
                    signatures: vec![signature.to_string()],
                }));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::super::Conditions;
    use super::*;
    use crate::amount::Amount;
    use crate::keyset::Id;

    fn key(hex: &str) -> SecretKey {
        SecretKey::from_hex(hex).unwrap()
    }

    #[test]
    fn test_sign_then_verify() {
        let secret_key =
            key("04918dfc36c93e7db6cc0d60f37e1522f1c36b64d3f4b424c532d7c595febbc5");

        let lock = SpendingConditions::new_p2pk(secret_key.public_key(), None);

        let mut proof = Proof::new(
            Amount::ZERO,
            Id::from_str("009a1f293253e41e").unwrap(),
            lock.to_secret().unwrap(),
            crate::keys::PublicKey::from_str(
                "02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904",
            )
            .unwrap(),
        );

        assert!(proof.verify_p2pk().is_err());

        proof.sign_p2pk(&secret_key).unwrap();
        assert!(proof.verify_p2pk().is_ok());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let owner = key("04918dfc36c93e7db6cc0d60f37e1522f1c36b64d3f4b424c532d7c595febbc5");
        let stranger = key("0000000000000000000000000000000000000000000000000000000000000001");

        let lock = SpendingConditions::new_p2pk(owner.public_key(), None);

        let mut proof = Proof::new(
            Amount::ONE,
            Id::from_str("009a1f293253e41e").unwrap(),
            lock.to_secret().unwrap(),
            owner.public_key(),
        );

        proof.sign_p2pk(&stranger).unwrap();
        assert!(proof.verify_p2pk().is_err());
    }

    #[test]
    fn test_multisig_threshold() {
        let one = key("04918dfc36c93e7db6cc0d60f37e1522f1c36b64d3f4b424c532d7c595febbc5");
        let two = key("0000000000000000000000000000000000000000000000000000000000000001");
        let three = key("7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f");

        let lock = SpendingConditions::new_p2pk(
            one.public_key(),
            Some(Conditions {
                locktime: None,
                pubkeys: Some(vec![two.public_key(), three.public_key()]),
                refund_keys: None,
                num_sigs: Some(2),
                sig_flag: Default::default(),
            }),
        );

        let mut proof = Proof::new(
            Amount::ONE,
            Id::from_str("009a1f293253e41e").unwrap(),
            lock.to_secret().unwrap(),
            one.public_key(),
        );

        proof.sign_p2pk(&one).unwrap();
        assert!(proof.verify_p2pk().is_err(), "one of two signatures");

        proof.sign_p2pk(&three).unwrap();
        assert!(proof.verify_p2pk().is_ok(), "two of two signatures");
    }

    #[test]
    fn test_duplicate_signature_does_not_satisfy_threshold() {
        let one = key("04918dfc36c93e7db6cc0d60f37e1522f1c36b64d3f4b424c532d7c595febbc5");
        let two = key("0000000000000000000000000000000000000000000000000000000000000001");

        let lock = SpendingConditions::new_p2pk(
            one.public_key(),
            Some(Conditions {
                locktime: None,
                pubkeys: Some(vec![two.public_key()]),
                refund_keys: None,
                num_sigs: Some(2),
                sig_flag: Default::default(),
            }),
        );

        let mut proof = Proof::new(
            Amount::ONE,
            Id::from_str("009a1f293253e41e").unwrap(),
            lock.to_secret().unwrap(),
            one.public_key(),
        );

        proof.sign_p2pk(&one).unwrap();
        proof.sign_p2pk(&one).unwrap();

        assert!(proof.verify_p2pk().is_err());
    }

    #[test]
    fn test_verify_reference_vector() {
        let json: &str = r#"{
            "amount":1,
            "secret":"[\"P2PK\",{\"nonce\":\"859d4935c4907062a6297cf4e663e2835d90d97ecdd510745d32f6816323a41f\",\"data\":\"0249098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7\",\"tags\":[[\"sigflag\",\"SIG_INPUTS\"]]}]",
            "C":"02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904",
            "id":"009a1f293253e41e",
            "witness":"{\"signatures\":[\"60f3c9b766770b46caac1d27e1ae6b77c8866ebaeba0b9489fe6a15a837eaa6fcd6eaa825499c72ac342983983fd3ba3a8a41f56677cc99ffd73da68b59e1383\"]}"
        }"#;
        let valid_proof: Proof = serde_json::from_str(json).unwrap();
        assert!(valid_proof.verify_p2pk().is_ok());

        // signature belongs to a different secret
        let invalid_proof = r#"{"amount":1,"secret":"[\"P2PK\",{\"nonce\":\"859d4935c4907062a6297cf4e663e2835d90d97ecdd510745d32f6816323a41f\",\"data\":\"0249098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7\",\"tags\":[[\"sigflag\",\"SIG_INPUTS\"]]}]","C":"02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904","id":"009a1f293253e41e","witness":"{\"signatures\":[\"3426df9730d365a9d18d79bed2f3e78e9172d7107c55306ac5ddd1b2d065893366cfa24ff3c874ebf1fc22360ba5888ddf6ff5dbcb9e5f2f5a1368f7afc64f15\"]}"}"#;
        let invalid_proof: Proof = serde_json::from_str(invalid_proof).unwrap();
        assert!(invalid_proof.verify_p2pk().is_err());
    }

    #[test]
    fn test_verify_multisig_reference_vector() {
        let valid_proof = r#"{"amount":0,"secret":"[\"P2PK\",{\"nonce\":\"0ed3fcb22c649dd7bbbdcca36e0c52d4f0187dd3b6a19efcc2bfbebb5f85b2a1\",\"data\":\"0249098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7\",\"tags\":[[\"pubkeys\",\"0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\",\"02142715675faf8da1ecc4d51e0b9e539fa0d52fdd96ed60dbe99adb15d6b05ad9\"],[\"n_sigs\",\"2\"],[\"sigflag\",\"SIG_INPUTS\"]]}]","C":"02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904","id":"009a1f293253e41e","witness":"{\"signatures\":[\"83564aca48c668f50d022a426ce0ed19d3a9bdcffeeaee0dc1e7ea7e98e9eff1840fcc821724f623468c94f72a8b0a7280fa9ef5a54a1b130ef3055217f467b3\",\"9a72ca2d4d5075be5b511ee48dbc5e45f259bcf4a4e8bf18587f433098a9cd61ff9737dc6e8022de57c76560214c4568377792d4c2c6432886cc7050487a1f22\"]}"}"#;

        let valid_proof: Proof = serde_json::from_str(valid_proof).unwrap();
        assert!(valid_proof.verify_p2pk().is_ok());

        // only one of the two required signatures
        let invalid_proof = r#"{"amount":0,"secret":"[\"P2PK\",{\"nonce\":\"0ed3fcb22c649dd7bbbdcca36e0c52d4f0187dd3b6a19efcc2bfbebb5f85b2a1\",\"data\":\"0249098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7\",\"tags\":[[\"pubkeys\",\"0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\",\"02142715675faf8da1ecc4d51e0b9e539fa0d52fdd96ed60dbe99adb15d6b05ad9\"],[\"n_sigs\",\"2\"],[\"sigflag\",\"SIG_INPUTS\"]]}]","C":"02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904","id":"009a1f293253e41e","witness":"{\"signatures\":[\"83564aca48c668f50d022a426ce0ed19d3a9bdcffeeaee0dc1e7ea7e98e9eff1840fcc821724f623468c94f72a8b0a7280fa9ef5a54a1b130ef3055217f467b3\"]}"}"#;

        let invalid_proof: Proof = serde_json::from_str(invalid_proof).unwrap();
        assert!(invalid_proof.verify_p2pk().is_err());
    }

    #[test]
    fn test_refund_after_locktime_reference_vector() {
        // locktime 21 is long past; the single refund signature spends it
        let valid_proof = r#"{"amount":0,"secret":"[\"P2PK\",{\"nonce\":\"3eff971bb1ca70b16be3446a4d3feedf2f37f054c5c8621d832744df71b028f0\",\"data\":\"0249098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7\",\"tags\":[[\"pubkeys\",\"0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\",\"02142715675faf8da1ecc4d51e0b9e539fa0d52fdd96ed60dbe99adb15d6b05ad9\"],[\"locktime\",\"21\"],[\"n_sigs\",\"2\"],[\"refund\",\"49098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7\"],[\"sigflag\",\"SIG_INPUTS\"]]}]","C":"02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904","id":"009a1f293253e41e","witness":"{\"signatures\":[\"94c6355461ca88e5d22c4e65e920b2e8253ccb4dd084675453a7bba7044e580246bd05e2520691afeccb2a88784cc56064353aec8b6a61e172727ba9cb3054a1\"]}"}"#;

        let valid_proof: Proof = serde_json::from_str(valid_proof).unwrap();
        assert!(valid_proof.verify_p2pk().is_ok());

        // locktime far in the future: refund signature alone is not enough
        let invalid_proof = r#"{"amount":0,"secret":"[\"P2PK\",{\"nonce\":\"d14cf9be9d9438d548b6b9d29bf800611136d053421b0f48c38d1447a7a92fc8\",\"data\":\"0249098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7\",\"tags\":[[\"pubkeys\",\"0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\",\"02142715675faf8da1ecc4d51e0b9e539fa0d52fdd96ed60dbe99adb15d6b05ad9\"],[\"locktime\",\"2100000000000\"],[\"n_sigs\",\"2\"],[\"refund\",\"49098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7\"],[\"sigflag\",\"SIG_INPUTS\"]]}]","C":"02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904","id":"009a1f293253e41e","witness":"{\"signatures\":[\"c3079dccf828e9d38bbbb17edf19c7915ee11920cf271c36b8780fdeb88b16fbfbe0328c7dcbe80e56cdc8f85c5831c79df77b27e81e5630a4dd392601fab9eb\"]}"}"#;

        let invalid_proof: Proof = serde_json::from_str(invalid_proof).unwrap();
        assert!(invalid_proof.verify_p2pk().is_err());
    }

    #[test]
    fn test_sig_all_msg_covers_inputs_and_outputs() {
        let one = key("0000000000000000000000000000000000000000000000000000000000000001");
        let proof = Proof::new(
            Amount::ONE,
            Id::from_str("009a1f293253e41e").unwrap(),
            crate::secret::Secret::new("abc"),
            one.public_key(),
        );
        let output = BlindedMessage::new(
            Amount::ONE,
            Id::from_str("009a1f293253e41e").unwrap(),
            one.public_key(),
        );

        let msg = sig_all_msg(&[proof], &[output.clone()]);
        let expected = format!("abc{}", output.blinded_secret.to_hex());
        assert_eq!(msg, expected.into_bytes());
    }
}
