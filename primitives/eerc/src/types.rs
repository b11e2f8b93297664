//! Ledger-facing structures.
//!
//! These mirror what the registrar and encrypted-token contracts return. They
//! are read-only inputs to the client engine: the ledger mutates them, the
//! client only decrypts them.

use core::fmt;
use core::str::FromStr;

use ark_ff::{PrimeField, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use crate::PrimitiveError;
use crate::babyjub::Point;
use crate::field::{Field, serde_field_array};

/// Elements in a packed ciphertext tuple: `ciphertext(4) ‖ authKey(2) ‖ nonce(1)`.
pub const PCT_LEN: usize = 7;
/// Ciphertext elements of a single-value Poseidon packet.
pub const PCT_CIPHERTEXT_LEN: usize = 4;

/// 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn from_hex(s: &str) -> Result<Self, PrimitiveError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|_| PrimitiveError::InvalidAddress(s.to_string()))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| PrimitiveError::InvalidAddress(s.to_string()))?;
        Ok(Address(arr))
    }

    /// Big-endian integer value, as the circuits read `SenderAddress`.
    pub fn to_field(&self) -> Field {
        Field::from_be_bytes_mod_order(&self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Address {
    type Err = PrimitiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Address::from_hex(&raw).map_err(D::Error::custom)
    }
}

/// A registered Baby Jubjub public key. The registrar returns `(0, 0)` for
/// accounts that never registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(pub Point);

impl PublicKey {
    pub fn point(&self) -> &Point {
        &self.0
    }

    pub fn is_unset(&self) -> bool {
        self.0.is_zero()
    }
}

/// ElGamal ciphertext `(C1, C2)`; the ledger's EGCT.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElGamalCiphertext {
    pub c1: Point,
    pub c2: Point,
}

impl ElGamalCiphertext {
    /// All-zero ciphertext: no balance has been folded in yet.
    pub const EMPTY: ElGamalCiphertext = ElGamalCiphertext {
        c1: Point::ZERO,
        c2: Point::ZERO,
    };

    pub fn new(c1: Point, c2: Point) -> Self {
        ElGamalCiphertext { c1, c2 }
    }

    pub fn is_empty(&self) -> bool {
        self.c1.is_zero() && self.c2.is_zero()
    }

    /// `[c1.x, c1.y, c2.x, c2.y]`
    pub fn to_array(&self) -> [Field; 4] {
        [self.c1.x, self.c1.y, self.c2.x, self.c2.y]
    }
}

impl Default for ElGamalCiphertext {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Split a packed ciphertext tuple into `(ciphertext, auth_key, nonce)`.
pub fn pct_parts(pct: &[Field; PCT_LEN]) -> (&[Field], Point, Field) {
    (
        &pct[..PCT_CIPHERTEXT_LEN],
        Point::new(pct[4], pct[5]),
        pct[6],
    )
}

pub fn pct_is_empty(pct: &[Field; PCT_LEN]) -> bool {
    pct.iter().all(|e| e.is_zero())
}

/// One historical amount (deposit or incoming transfer leg).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountPct {
    #[serde(with = "serde_field_array")]
    pub pct: [Field; PCT_LEN],
    pub index: u64,
}

impl AmountPct {
    pub fn is_empty(&self) -> bool {
        pct_is_empty(&self.pct)
    }
}

/// Per user/token balance structure held by the encrypted-token contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub egct: ElGamalCiphertext,
    pub nonce: u64,
    pub amount_pcts: Vec<AmountPct>,
    #[serde(with = "serde_field_array")]
    pub balance_pct: [Field; PCT_LEN],
    pub transaction_index: u64,
}

impl BalanceRecord {
    /// A record for an account that has never held a balance.
    pub fn empty() -> Self {
        BalanceRecord {
            egct: ElGamalCiphertext::EMPTY,
            nonce: 0,
            amount_pcts: Vec::new(),
            balance_pct: [Field::zero(); PCT_LEN],
            transaction_index: 0,
        }
    }
}

impl Default for BalanceRecord {
    fn default() -> Self {
        Self::empty()
    }
}
