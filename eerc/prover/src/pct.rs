//! Poseidon packed ciphertexts.
//!
//! A PCT lets one specific key holder recover a value without a discrete-log
//! search. The packer picks a fresh scalar `r`, publishes `authKey = r·B` and
//! encrypts under the shared point `r·pk` with the Poseidon cipher. The holder
//! of `sk` recomputes the shared point as `sk·authKey`.

use ark_ff::Zero;
use rand::{CryptoRng, RngCore};

use eerc_primitives::babyjub::base8_mul;
use eerc_primitives::poseidon;
use eerc_primitives::types::PCT_CIPHERTEXT_LEN;

use crate::keys::PrivateKey;
use crate::{
    Field, PCT_LEN, Point, PrimitiveError, ProverError, PublicKey, Scalar, random_scalar,
};

/// Output of [`pack`].
#[derive(Clone, Debug)]
pub struct PoseidonPacket {
    pub ciphertext: Vec<Field>,
    pub nonce: Field,
    pub auth_key: Point,
    /// The scalar `r`; the transfer circuit re-derives the packet from it.
    pub enc_random: Scalar,
    /// Shared point `r·pk`.
    pub encryption_key: Point,
}

impl PoseidonPacket {
    /// The on-ledger 7-element form. Only single-value packets fit.
    pub fn to_pct(&self) -> Result<Pct, ProverError> {
        let ciphertext: [Field; PCT_CIPHERTEXT_LEN] =
            self.ciphertext.as_slice().try_into().map_err(|_| {
                ProverError::InvalidAmount(format!(
                    "a PCT holds one value, packet has {} ciphertext elements",
                    self.ciphertext.len()
                ))
            })?;
        Ok(Pct {
            ciphertext,
            auth_key: self.auth_key,
            nonce: self.nonce,
        })
    }
}

/// Single-value packed ciphertext as stored by the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pct {
    pub ciphertext: [Field; PCT_CIPHERTEXT_LEN],
    pub auth_key: Point,
    pub nonce: Field,
}

impl Pct {
    pub fn to_array(&self) -> [Field; PCT_LEN] {
        let c = &self.ciphertext;
        [
            c[0],
            c[1],
            c[2],
            c[3],
            self.auth_key.x,
            self.auth_key.y,
            self.nonce,
        ]
    }

    pub fn from_array(a: &[Field; PCT_LEN]) -> Self {
        Pct {
            ciphertext: [a[0], a[1], a[2], a[3]],
            auth_key: Point::new(a[4], a[5]),
            nonce: a[6],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_array().iter().all(|e| e.is_zero())
    }
}

fn random_nonce<R: RngCore + CryptoRng>(rng: &mut R) -> Field {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    Field::from(u128::from_le_bytes(bytes))
}

/// Pack `values` for the holder of `pk`.
///
/// # Errors
/// * `ProverError::Primitive` - if the cipher rejects its input
pub fn pack<R: RngCore + CryptoRng>(
    values: &[Field],
    pk: &PublicKey,
    rng: &mut R,
) -> Result<PoseidonPacket, ProverError> {
    let r = random_scalar(rng);
    let nonce = random_nonce(rng);
    pack_with_randomness(values, pk, &r, nonce)
}

/// Deterministic [`pack`] with caller-supplied `r` and nonce (`nonce < 2^128`).
pub fn pack_with_randomness(
    values: &[Field],
    pk: &PublicKey,
    r: &Scalar,
    nonce: Field,
) -> Result<PoseidonPacket, ProverError> {
    let encryption_key = pk.point().mul_scalar(r);
    let auth_key = base8_mul(r);
    let ciphertext = poseidon::encrypt(values, &encryption_key, nonce)?;
    Ok(PoseidonPacket {
        ciphertext,
        nonce,
        auth_key,
        enc_random: *r,
        encryption_key,
    })
}

/// Recover `length` values from a packet addressed to `sk`.
///
/// # Errors
/// * `ProverError::PctDecryptionFailed` - wrong key, tampered ciphertext or
///   mismatched length
pub fn unpack(
    sk: &PrivateKey,
    ciphertext: &[Field],
    nonce: Field,
    auth_key: &Point,
    length: usize,
) -> Result<Vec<Field>, ProverError> {
    let shared = auth_key.mul_scalar(sk.scalar());
    poseidon::decrypt(ciphertext, &shared, nonce, length).map_err(ProverError::PctDecryptionFailed)
}

/// Decrypt a ledger PCT carrying one value.
pub fn decrypt_pct(sk: &PrivateKey, pct: &[Field; PCT_LEN]) -> Result<Field, ProverError> {
    let p = Pct::from_array(pct);
    let values = unpack(sk, &p.ciphertext, p.nonce, &p.auth_key, 1)?;
    values
        .first()
        .copied()
        .ok_or(ProverError::PctDecryptionFailed(PrimitiveError::InvalidPadding))
}
