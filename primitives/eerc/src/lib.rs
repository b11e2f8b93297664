//! Types and arithmetic shared by the eERC client crates.
//!
//! Everything here is deterministic and free of key material handling:
//!
//! - [`field`]: the BN254 scalar field used for curve coordinates and circuit
//!   signals, the Baby Jubjub subgroup scalar, and decimal (de)serialisation.
//! - [`babyjub`]: Baby Jubjub points in circomlib coordinates.
//! - [`poseidon`]: the width-4 circom Poseidon permutation, the Poseidon hash
//!   and the duplex-sponge cipher used for PCTs.
//! - [`types`]: ledger-facing structures (addresses, public keys, ElGamal
//!   ciphertexts, amount PCTs and the per-token balance record).
//! - [`units`]: the fixed decimal precision of encrypted amounts.

pub mod babyjub;
pub mod field;
pub mod poseidon;
pub mod types;
pub mod units;


pub use babyjub::{BASE8, Point};
pub use field::{Field, ProofField, Scalar};
pub use types::{Address, AmountPct, BalanceRecord, ElGamalCiphertext, PCT_LEN, PublicKey};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    #[error("invalid field element: {0}")]
    InvalidFieldElement(String),
    #[error("value {0} is not below the field modulus")]
    FieldOverflow(String),
    #[error("point is not on the Baby Jubjub curve")]
    NotOnCurve,
    #[error("poseidon nonce must be below 2^128")]
    NonceOutOfRange,
    #[error("ciphertext of {got} elements cannot hold a {length}-element message (expected {expected})")]
    CiphertextLength {
        got: usize,
        expected: usize,
        length: usize,
    },
    #[error("ciphertext padding is not zero")]
    InvalidPadding,
    #[error("ciphertext authentication tag mismatch")]
    TagMismatch,
    #[error("poseidon: {0}")]
    Poseidon(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}
