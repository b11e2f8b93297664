//! Circuit inputs and proof reshaping.
//!
//! Inputs are JSON maps of decimal strings keyed by circuit signal name, the
//! format witness generators expect. Proofs come back in snarkjs layout and
//! are reshaped for the Solidity verifiers, which take each `pi_b` pair in
//! reversed order.

use ark_ff::Zero;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use eerc_primitives::field::{from_decimal, scalar_to_field, to_decimal};
use eerc_primitives::poseidon;

use crate::keys::{KeyPair, PrivateKey};
use crate::{
    Address, ElGamalCiphertext, Field, PCT_LEN, Point, ProofField, ProverError, PublicKey,
    check_amount, elgamal, pct,
};

pub const REGISTRATION_SIGNALS: usize = 5;
pub const TRANSFER_SIGNALS: usize = 32;

// ===== Circuit input map =====

/// Signal name → decimal string (or nested arrays of them).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CircuitInput(Map<String, Value>);

impl CircuitInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_field(&mut self, key: &str, value: &Field) {
        self.0.insert(key.to_string(), Value::String(to_decimal(value)));
    }

    pub fn set_fields(&mut self, key: &str, values: &[Field]) {
        let arr = values.iter().map(|v| Value::String(to_decimal(v))).collect();
        self.0.insert(key.to_string(), Value::Array(arr));
    }

    pub fn set_point(&mut self, key: &str, p: &Point) {
        self.set_fields(key, &p.to_array());
    }

    pub fn set_u64(&mut self, key: &str, value: u64) {
        self.0.insert(key.to_string(), Value::String(value.to_string()));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

// ===== Registration =====

/// `Poseidon(chainId, sk, address)`, binding a key to an account on one chain.
pub fn registration_hash(
    chain_id: u64,
    sk: &PrivateKey,
    address: &Address,
) -> Result<Field, ProverError> {
    Ok(poseidon::hash(&[
        Field::from(chain_id),
        sk.to_field(),
        address.to_field(),
    ])?)
}

#[derive(Clone, Debug)]
pub struct RegistrationInput {
    pub input: CircuitInput,
    pub registration_hash: Field,
}

impl RegistrationInput {
    /// # Arguments
    /// * `keys` - the caller's derived key pair
    /// * `address` - the account being registered
    /// * `chain_id` - chain the registrar lives on
    ///
    /// # Returns
    /// * The registration circuit input and the hash it commits to
    pub fn new(keys: &KeyPair, address: &Address, chain_id: u64) -> Result<Self, ProverError> {
        if address.is_zero() {
            return Err(ProverError::InvalidAddress(address.to_string()));
        }
        let hash = registration_hash(chain_id, &keys.private, address)?;

        let mut input = CircuitInput::new();
        input.set_field("SenderPrivateKey", &keys.private.to_field());
        input.set_point("SenderPublicKey", keys.public.point());
        input.set_field("SenderAddress", &address.to_field());
        input.set_u64("ChainID", chain_id);
        input.set_field("RegistrationHash", &hash);

        Ok(RegistrationInput {
            input,
            registration_hash: hash,
        })
    }
}

// ===== Transfer =====

/// A registered account a transfer is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Recipient {
    pub address: Address,
    pub public_key: PublicKey,
}

/// Everything one transfer proof is built from. Validated on construction and
/// dropped once the input is built.
#[derive(Debug)]
pub struct TransferPlan<'a> {
    sender: &'a KeyPair,
    sender_balance: u64,
    sender_egct: ElGamalCiphertext,
    amount: u64,
    receiver: PublicKey,
    auditor: PublicKey,
}

impl<'a> TransferPlan<'a> {
    /// # Errors
    /// * `ProverError::InvalidAmount` - zero amount
    /// * `ProverError::AmountOutOfRange` - amount above the plaintext ceiling
    /// * `ProverError::EmptyBalance` - the sender has no EGCT to spend from
    /// * `ProverError::InsufficientBalance` - amount exceeds the decrypted balance
    /// * `ProverError::RecipientNotRegistered` - receiver key is unset
    /// * `ProverError::AuditorNotSet` - auditor key is unset
    pub fn new(
        sender: &'a KeyPair,
        sender_balance: u64,
        sender_egct: ElGamalCiphertext,
        amount: u64,
        recipient: &Recipient,
        auditor: PublicKey,
    ) -> Result<Self, ProverError> {
        if amount == 0 {
            return Err(ProverError::InvalidAmount("transfer amount is zero".into()));
        }
        check_amount(amount)?;
        if sender_egct.is_empty() {
            return Err(ProverError::EmptyBalance);
        }
        if amount > sender_balance {
            return Err(ProverError::InsufficientBalance {
                requested: amount,
                available: sender_balance,
            });
        }
        if recipient.public_key.is_unset() {
            return Err(ProverError::RecipientNotRegistered(recipient.address));
        }
        if auditor.is_unset() {
            return Err(ProverError::AuditorNotSet);
        }
        Ok(TransferPlan {
            sender,
            sender_balance,
            sender_egct,
            amount,
            receiver: recipient.public_key,
            auditor,
        })
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn sender_egct(&self) -> &ElGamalCiphertext {
        &self.sender_egct
    }

    pub fn new_balance(&self) -> u64 {
        // Checked in `new`.
        self.sender_balance - self.amount
    }
}

#[derive(Clone, Debug)]
pub struct TransferInput {
    pub input: CircuitInput,
    /// Sender's new balance, packed for the sender; submitted with the proof.
    pub sender_balance_pct: [Field; PCT_LEN],
    pub new_balance: u64,
}

fn set_packet(input: &mut CircuitInput, prefix: &str, packet: &pct::PoseidonPacket) {
    input.set_fields(&format!("{prefix}PCT"), &packet.ciphertext);
    input.set_point(&format!("{prefix}PCTAuthKey"), &packet.auth_key);
    input.set_field(&format!("{prefix}PCTNonce"), &packet.nonce);
    input.set_field(
        &format!("{prefix}PCTRandom"),
        &scalar_to_field(&packet.enc_random),
    );
}

/// Encrypt the amount for every party and assemble the transfer circuit input.
///
/// Sender and receiver each get an ElGamal encryption of the amount; the
/// receiver and the auditor each get a PCT of it, and the sender gets a PCT of
/// the remaining balance.
pub fn build_transfer<R: RngCore + CryptoRng>(
    plan: &TransferPlan<'_>,
    rng: &mut R,
) -> Result<TransferInput, ProverError> {
    let amount = Field::from(plan.amount);
    let new_balance = plan.new_balance();

    let (sender_vtt, _) = elgamal::encrypt(&plan.sender.public, plan.amount, rng)?;
    let (receiver_vtt, receiver_random) = elgamal::encrypt(&plan.receiver, plan.amount, rng)?;
    let receiver_pct = pct::pack(&[amount], &plan.receiver, rng)?;
    let auditor_pct = pct::pack(&[amount], &plan.auditor, rng)?;
    let sender_pct = pct::pack(&[Field::from(new_balance)], &plan.sender.public, rng)?;

    let mut input = CircuitInput::new();
    input.set_u64("ValueToTransfer", plan.amount);
    input.set_field("SenderPrivateKey", &plan.sender.private.to_field());
    input.set_point("SenderPublicKey", plan.sender.public.point());
    input.set_u64("SenderBalance", plan.sender_balance);
    input.set_point("SenderBalanceC1", &plan.sender_egct.c1);
    input.set_point("SenderBalanceC2", &plan.sender_egct.c2);
    input.set_point("SenderVTTC1", &sender_vtt.c1);
    input.set_point("SenderVTTC2", &sender_vtt.c2);

    input.set_point("ReceiverPublicKey", plan.receiver.point());
    input.set_point("ReceiverVTTC1", &receiver_vtt.c1);
    input.set_point("ReceiverVTTC2", &receiver_vtt.c2);
    input.set_field("ReceiverVTTRandom", &scalar_to_field(&receiver_random));
    set_packet(&mut input, "Receiver", &receiver_pct);

    input.set_point("AuditorPublicKey", plan.auditor.point());
    set_packet(&mut input, "Auditor", &auditor_pct);

    debug!(signals = input.len(), "transfer input built");
    Ok(TransferInput {
        input,
        sender_balance_pct: sender_pct.to_pct()?.to_array(),
        new_balance,
    })
}

// ===== Deposit =====

/// The amount PCT a deposit carries so the depositor can later see the amount.
#[derive(Clone, Debug)]
pub struct DepositInput {
    pub amount: u64,
    pub amount_pct: [Field; PCT_LEN],
}

impl DepositInput {
    pub fn new<R: RngCore + CryptoRng>(
        pk: &PublicKey,
        amount: u64,
        rng: &mut R,
    ) -> Result<Self, ProverError> {
        check_amount(amount)?;
        if pk.is_unset() {
            return Err(ProverError::InvalidAmount(
                "cannot deposit to an unregistered key".into(),
            ));
        }
        let packet = pct::pack(&[Field::from(amount)], pk, rng)?;
        Ok(DepositInput {
            amount,
            amount_pct: packet.to_pct()?.to_array(),
        })
    }
}

// ===== Proofs =====

/// Raw prover output in snarkjs layout. `pi_a`/`pi_c` may carry a trailing
/// projective `"1"`, `pi_b` a trailing `["1", "0"]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofMaterial {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    pub public_signals: Vec<String>,
}

/// Proof points in verifier order plus exactly `N` public signals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormattedProof<const N: usize> {
    pub a: [ProofField; 2],
    pub b: [[ProofField; 2]; 2],
    pub c: [ProofField; 2],
    pub public_signals: [Field; N],
}

pub type RegistrationProof = FormattedProof<REGISTRATION_SIGNALS>;
pub type TransferProof = FormattedProof<TRANSFER_SIGNALS>;

fn coordinate(raw: &[String], i: usize, what: &str) -> Result<ProofField, ProverError> {
    let s = raw
        .get(i)
        .ok_or_else(|| ProverError::MalformedProof(format!("{what} is missing coordinate {i}")))?;
    from_decimal(s).map_err(|e| ProverError::MalformedProof(format!("{what}[{i}]: {e}")))
}

/// Reshape prover output for the verifier.
///
/// # Errors
/// * `ProverError::UnexpectedSignalCount` - public signal count is not `N`
/// * `ProverError::MalformedProof` - missing or non-canonical coordinates
pub fn format_proof<const N: usize>(raw: &ProofMaterial) -> Result<FormattedProof<N>, ProverError> {
    if raw.public_signals.len() != N {
        return Err(ProverError::UnexpectedSignalCount {
            expected: N,
            got: raw.public_signals.len(),
        });
    }
    if raw.pi_b.len() < 2 {
        return Err(ProverError::MalformedProof("pi_b needs two pairs".into()));
    }

    let a = [
        coordinate(&raw.pi_a, 0, "pi_a")?,
        coordinate(&raw.pi_a, 1, "pi_a")?,
    ];
    let b = [
        [
            coordinate(&raw.pi_b[0], 1, "pi_b[0]")?,
            coordinate(&raw.pi_b[0], 0, "pi_b[0]")?,
        ],
        [
            coordinate(&raw.pi_b[1], 1, "pi_b[1]")?,
            coordinate(&raw.pi_b[1], 0, "pi_b[1]")?,
        ],
    ];
    let c = [
        coordinate(&raw.pi_c, 0, "pi_c")?,
        coordinate(&raw.pi_c, 1, "pi_c")?,
    ];

    let mut public_signals = [Field::zero(); N];
    for (slot, s) in public_signals.iter_mut().zip(&raw.public_signals) {
        *slot = from_decimal(s)
            .map_err(|e| ProverError::MalformedProof(format!("public signal: {e}")))?;
    }

    Ok(FormattedProof {
        a,
        b,
        c,
        public_signals,
    })
}
