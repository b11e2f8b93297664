//! # eerc-prover - client engine for encrypted ERC tokens
//!
//! This crate holds everything a wallet-side client needs to take part in the
//! encrypted token protocol without revealing amounts: it derives a Baby
//! Jubjub identity from a wallet signature, encrypts and decrypts balances,
//! and assembles the inputs of the two Groth16 circuits.
//!
//! ## Components
//!
//! - [`keys`]: signature → [`KeyPair`] (Keccak-256, clamp, reduce mod `l`)
//! - [`elgamal`]: exponential ElGamal over Baby Jubjub with a bounded
//!   baby-step/giant-step decryptor
//! - [`pct`]: Poseidon packed ciphertexts (PCTs) for amounts a specific
//!   viewer must recover without a discrete-log search
//! - [`balance`]: settled / pending balance reconstruction from the ledger's
//!   [`BalanceRecord`]
//! - [`inputs`]: registration, transfer and deposit circuit inputs, and proof
//!   reshaping for the verifier contracts
//! - [`session`]: the asynchronous sign → derive → build → prove → submit
//!   pipeline, with cancellation
//! - [`config`]: protocol configuration loaded from JSON
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use eerc_prover::{KeyPair, Signature, elgamal, keys::signing_message};
//!
//! let message = signing_message("eERC", &address);
//! let signature = Signature::from_hex(&wallet.sign(&message))?;
//! let keys = KeyPair::from_signature(&signature);
//!
//! let mut rng = rand_chacha::ChaCha20Rng::from_seed([7u8; 32]);
//! let (egct, _r) = elgamal::encrypt(&keys.public, 4_200, &mut rng)?;
//! assert_eq!(elgamal::decrypt(&keys.private, &egct)?, 4_200);
//! ```
//!
//! ## PCT layout
//!
//! ```text
//! ciphertext(4) || authKey.x || authKey.y || nonce
//! ```
//!
//! ## Security Notes
//!
//! - Private keys are zeroized on drop and never appear in `Debug` output or logs
//! - Encryption randomness is drawn from the caller's `CryptoRng`
//! - Decryption never searches beyond [`MAX_PLAINTEXT`]

pub mod balance;
pub mod config;
pub mod elgamal;
pub mod inputs;
pub mod keys;
pub mod pct;
pub mod session;

use ark_ff::{PrimeField, Zero};
use rand::{CryptoRng, RngCore};
use thiserror::Error;

pub use eerc_primitives::units::{ENCRYPTED_DECIMALS, MAX_PLAINTEXT, MAX_WHOLE_TOKENS};
pub use eerc_primitives::{
    Address, AmountPct, BASE8, BalanceRecord, ElGamalCiphertext, Field, PCT_LEN, Point,
    PrimitiveError, ProofField, PublicKey, Scalar,
};

pub use balance::{BalanceReport, aggregate};
pub use config::{CircuitArtifact, ProtocolConfig};
pub use inputs::{
    CircuitInput, DepositInput, FormattedProof, ProofMaterial, RegistrationInput,
    RegistrationProof, TransferInput, TransferPlan, TransferProof,
};
pub use keys::{KeyPair, PrivateKey, Signature};
pub use pct::{Pct, PoseidonPacket};
pub use session::{Phase, Session};

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("invalid signature format: {0}")]
    InvalidSignatureFormat(&'static str),
    #[error("amount {amount} exceeds the plaintext ceiling {max}")]
    AmountOutOfRange { amount: u64, max: u64 },
    #[error("no plaintext in [0, {0}] matches the ciphertext")]
    DecryptionBoundExceeded(u64),
    #[error("PCT decryption failed: {0}")]
    PctDecryptionFailed(#[source] PrimitiveError),
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u64, available: u64 },
    #[error("proof generation failed: {0}")]
    ProofGenerationFailed(String),
    #[error("expected {expected} public signals, got {got}")]
    UnexpectedSignalCount { expected: usize, got: usize },
    #[error("malformed proof: {0}")]
    MalformedProof(String),
    #[error("ledger submission failed: {0}")]
    LedgerSubmissionFailed(String),
    #[error("ledger read failed: {0}")]
    LedgerReadFailed(String),
    #[error("wallet signing failed: {0}")]
    SigningFailed(String),
    #[error("sender balance changed while the proof was generated")]
    StaleBalance,
    #[error("operation cancelled")]
    Cancelled,
    #[error("{operation} is not allowed in phase {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
    },
    #[error("wallet is on chain {actual}, expected {expected}")]
    WrongChain { expected: u64, actual: u64 },
    #[error("recipient {0} is not registered")]
    RecipientNotRegistered(Address),
    #[error("auditor public key is not set")]
    AuditorNotSet,
    #[error("sender has no encrypted balance")]
    EmptyBalance,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Primitive(#[from] PrimitiveError),
}

/// Draw a uniformly random non-zero scalar.
///
/// 64 bytes are reduced modulo `l` so the bias is negligible.
pub fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    loop {
        let mut bytes = [0u8; 64];
        rng.fill_bytes(&mut bytes);
        let s = Scalar::from_le_bytes_mod_order(&bytes);
        if !s.is_zero() {
            return s;
        }
    }
}

/// Reject plaintexts the decryptor could not recover.
pub(crate) fn check_amount(amount: u64) -> Result<(), ProverError> {
    if amount > MAX_PLAINTEXT {
        return Err(ProverError::AmountOutOfRange {
            amount,
            max: MAX_PLAINTEXT,
        });
    }
    Ok(())
}
