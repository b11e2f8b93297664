//! Signature-derived Baby Jubjub identities.
//!
//! The wallet signs a fixed registration message; the signature is hashed,
//! clamped and reduced into the Baby Jubjub subgroup. The same signature always
//! yields the same key, so nothing secret ever needs to be stored.

use core::fmt;

use ark_ff::{One, PrimeField, Zero};
use sha3::{Digest, Keccak256};
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

use eerc_primitives::babyjub::base8_mul;
use eerc_primitives::field::scalar_to_field;

use crate::{Address, Field, ProverError, PublicKey, Scalar};

/// Protocol name embedded in the registration message.
pub const PROTOCOL_NAME: &str = "eERC";
/// `r || s || v`
pub const SIGNATURE_LEN: usize = 65;

/// The message the wallet signs to (re-)derive its encryption identity.
pub fn signing_message(protocol: &str, address: &Address) -> String {
    // Address Display is already lowercase hex.
    format!("{protocol}\nRegistering user with\n Address:{address}")
}

/// A 65-byte ECDSA wallet signature.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    /// Parse a hex signature, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, ProverError> {
        let digits = s.trim().strip_prefix("0x").unwrap_or(s.trim());
        let bytes = hex::decode(digits)
            .map_err(|_| ProverError::InvalidSignatureFormat("signature is not valid hex"))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProverError> {
        let arr: [u8; SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| ProverError::InvalidSignatureFormat("signature must be 65 bytes"))?;
        Ok(Signature(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Signature(..)")
    }
}

/// A Baby Jubjub private key, `0 < key < l`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(Scalar);

impl PrivateKey {
    /// `None` for the zero scalar.
    pub fn from_scalar(s: Scalar) -> Option<Self> {
        if s.is_zero() { None } else { Some(PrivateKey(s)) }
    }

    pub fn scalar(&self) -> &Scalar {
        &self.0
    }

    /// The key as a circuit signal.
    pub fn to_field(&self) -> Field {
        scalar_to_field(&self.0)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(base8_mul(&self.0))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Hash, clamp and reduce a signature into a private key.
///
/// A result of zero is replaced by `1`; that case is logged and otherwise
/// invisible to the caller.
pub fn derive_private_key(signature: &Signature) -> PrivateKey {
    let mut bytes: [u8; 32] = Keccak256::digest(signature.as_bytes()).into();
    bytes[0] &= 0b1111_1000;
    bytes[31] &= 0b0111_1111;
    bytes[31] |= 0b0100_0000;

    let mut scalar = Scalar::from_le_bytes_mod_order(&bytes);
    bytes.zeroize();

    if scalar.is_zero() {
        warn!("derived private key reduced to zero; using fallback scalar 1");
        scalar = Scalar::one();
    }
    PrivateKey(scalar)
}

/// A private key together with its public key `key · Base8`.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub private: PrivateKey,
    pub public: PublicKey,
}

impl KeyPair {
    /// # Arguments
    /// * `signature` - wallet signature over [`signing_message`]
    ///
    /// # Returns
    /// * The deterministic key pair for that signature
    pub fn from_signature(signature: &Signature) -> Self {
        Self::from_private(derive_private_key(signature))
    }

    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        KeyPair { private, public }
    }
}
