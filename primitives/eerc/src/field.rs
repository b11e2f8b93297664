//! Field and scalar types.
//!
//! Baby Jubjub is defined over the BN254 scalar field, so [`Field`] is both the
//! coordinate field of every point and the field of every circuit signal.
//! Private keys and encryption randomness live in [`Scalar`], the prime order
//! `l` of the Baby Jubjub subgroup generated by `Base8`. Groth16 proof points
//! are BN254 G1/G2 points whose coordinates live in [`ProofField`].

use ark_ff::{BigInteger, One, PrimeField};
use num_bigint::BigUint;

use crate::PrimitiveError;

/// BN254 scalar field (`r`), the Baby Jubjub base field.
pub type Field = ark_bn254::Fr;
/// Integers modulo the Baby Jubjub prime subgroup order `l`.
pub type Scalar = ark_ed_on_bn254::Fr;
/// BN254 base field (`q`), coordinates of Groth16 proof points.
pub type ProofField = ark_bn254::Fq;

/// Decimal string of a field element, the encoding snarkjs and the ledger use.
pub fn to_decimal<F: PrimeField>(f: &F) -> String {
    BigUint::from_bytes_le(&f.into_bigint().to_bytes_le()).to_str_radix(10)
}

/// Parse a decimal (or `0x`-prefixed hex) string into a field element.
///
/// Values at or above the modulus are rejected rather than reduced: a proof
/// coordinate or ledger value that overflows is malformed input.
pub fn from_decimal<F: PrimeField>(s: &str) -> Result<F, PrimitiveError> {
    let trimmed = s.trim();
    let parsed = match trimmed.strip_prefix("0x") {
        Some(hex) => BigUint::parse_bytes(hex.as_bytes(), 16),
        None => BigUint::parse_bytes(trimmed.as_bytes(), 10),
    };
    let n = parsed.ok_or_else(|| PrimitiveError::InvalidFieldElement(s.to_string()))?;
    let modulus = BigUint::from_bytes_le(&F::MODULUS.to_bytes_le());
    if n >= modulus {
        return Err(PrimitiveError::FieldOverflow(s.to_string()));
    }
    Ok(F::from_le_bytes_mod_order(&n.to_bytes_le()))
}

/// Lift a subgroup scalar into the circuit field. `l < r`, so this never reduces.
pub fn scalar_to_field(s: &Scalar) -> Field {
    Field::from_le_bytes_mod_order(&s.into_bigint().to_bytes_le())
}

/// `Some(v)` when the element is a canonical integer that fits in a `u64`.
pub fn field_to_u64(f: &Field) -> Option<u64> {
    let limbs = f.into_bigint().0;
    if limbs[1..].iter().all(|l| *l == 0) {
        Some(limbs[0])
    } else {
        None
    }
}

/// `true` when the canonical integer is strictly below `2^128`.
pub fn fits_u128(f: &Field) -> bool {
    let limbs = f.into_bigint().0;
    limbs[2] == 0 && limbs[3] == 0
}

pub fn two_pow_128() -> Field {
    Field::from(u128::MAX) + Field::one()
}

/// Serde adapter: a single field element as a decimal string.
pub mod serde_field {
    use ark_ff::PrimeField;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<F: PrimeField, S: Serializer>(f: &F, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::to_decimal(f))
    }

    pub fn deserialize<'de, F: PrimeField, D: Deserializer<'de>>(d: D) -> Result<F, D::Error> {
        let raw = String::deserialize(d)?;
        super::from_decimal(&raw).map_err(D::Error::custom)
    }
}

/// Serde adapter: a fixed-size array of field elements as decimal strings.
pub mod serde_field_array {
    use ark_ff::PrimeField;
    use serde::{Deserialize, Deserializer, Serializer, de::Error, ser::SerializeSeq};

    pub fn serialize<F: PrimeField, S: Serializer, const N: usize>(
        values: &[F; N],
        s: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(N))?;
        for v in values {
            seq.serialize_element(&super::to_decimal(v))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, F: PrimeField, D: Deserializer<'de>, const N: usize>(
        d: D,
    ) -> Result<[F; N], D::Error> {
        let raw = Vec::<String>::deserialize(d)?;
        let len = raw.len();
        let parsed = raw
            .iter()
            .map(|s| super::from_decimal(s))
            .collect::<Result<Vec<F>, _>>()
            .map_err(D::Error::custom)?;
        parsed
            .try_into()
            .map_err(|_| D::Error::invalid_length(len, &"a fixed-size field element array"))
    }
}
