//! Exponential ElGamal over Baby Jubjub.
//!
//! ```text
//! C1 = r·B
//! C2 = m·B + r·pk
//! M  = C2 - sk·C1 = m·B
//! ```
//!
//! `m` is recovered from `M` by a baby-step/giant-step search over
//! `[0, MAX_PLAINTEXT]`. This only works because encrypted amounts are small
//! integers; the bound is fixed by the token's decimal precision and is never
//! widened.

use std::collections::HashMap;

use lazy_static::lazy_static;
use rand::{CryptoRng, RngCore};
use tracing::debug;

use eerc_primitives::babyjub::{Projective, base8_mul, batch_to_affine};

use crate::keys::PrivateKey;
use crate::{
    BASE8, ElGamalCiphertext, MAX_PLAINTEXT, Point, PrimitiveError, ProverError, PublicKey, Scalar,
    check_amount, random_scalar,
};

/// Baby steps, `⌈√(MAX_PLAINTEXT + 1)⌉`.
pub const BABY_STEPS: u64 = 31_623;

lazy_static! {
    /// `j·B ↦ j` for `j < BABY_STEPS`. Independent of any key.
    static ref BABY_STEP_TABLE: HashMap<Point, u32> = {
        let base = Projective::from(BASE8);
        let mut acc = Projective::IDENTITY;
        let mut projective = Vec::with_capacity(BABY_STEPS as usize);
        for _ in 0..BABY_STEPS {
            projective.push(acc);
            acc = acc.add(&base);
        }
        batch_to_affine(&projective)
            .into_iter()
            .enumerate()
            .map(|(j, p)| (p, j as u32))
            .collect()
    };

    /// `-(BABY_STEPS·B)`
    static ref GIANT_STEP: Point = -base8_mul(&Scalar::from(BABY_STEPS));
}

/// Force the baby-step table to be built now rather than on first decrypt.
pub fn warm_up() {
    lazy_static::initialize(&BABY_STEP_TABLE);
}

/// A bounded discrete-log instance: find `m ≤ MAX_PLAINTEXT` with `m·B = target`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscreteLog {
    pub target: Point,
}

impl DiscreteLog {
    pub fn new(target: Point) -> Self {
        DiscreteLog { target }
    }

    pub fn decode(self) -> Option<u64> {
        let table = &*BABY_STEP_TABLE;
        let steps = PointIterator::new(self.target, *GIANT_STEP);
        for (i, gamma) in steps.take(BABY_STEPS as usize + 1).enumerate() {
            if let Some(j) = table.get(&gamma) {
                let m = i as u64 * BABY_STEPS + u64::from(*j);
                return (m <= MAX_PLAINTEXT).then_some(m);
            }
        }
        None
    }
}

/// Iterates `X, X + P, X + 2P, ...`
struct PointIterator {
    current: Point,
    step: Point,
}

impl PointIterator {
    fn new(current: Point, step: Point) -> Self {
        PointIterator { current, step }
    }
}

impl Iterator for PointIterator {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        let p = self.current;
        self.current = self.current + self.step;
        Some(p)
    }
}

/// Encrypt `amount` under `pk` with fresh randomness.
///
/// # Returns
/// * The ciphertext and the randomness `r` used, which the transfer circuit
///   needs for the receiver's leg
///
/// # Errors
/// * `ProverError::AmountOutOfRange` - if `amount > MAX_PLAINTEXT`
pub fn encrypt<R: RngCore + CryptoRng>(
    pk: &PublicKey,
    amount: u64,
    rng: &mut R,
) -> Result<(ElGamalCiphertext, Scalar), ProverError> {
    check_amount(amount)?;
    let r = random_scalar(rng);
    let ct = encrypt_with_randomness(pk, amount, &r)?;
    Ok((ct, r))
}

/// Deterministic encryption with caller-supplied randomness.
///
/// # Errors
/// * `ProverError::AmountOutOfRange` - if `amount > MAX_PLAINTEXT`
/// * `ProverError::Primitive(NotOnCurve)` - `pk` is the unset `(0, 0)` marker
///   or any other off-curve point
pub fn encrypt_with_randomness(
    pk: &PublicKey,
    amount: u64,
    r: &Scalar,
) -> Result<ElGamalCiphertext, ProverError> {
    check_amount(amount)?;
    // (0, 0) is off the curve, so this also covers unregistered keys.
    if !pk.point().is_on_curve() {
        return Err(PrimitiveError::NotOnCurve.into());
    }
    let c1 = base8_mul(r);
    let c2 = base8_mul(&Scalar::from(amount)) + pk.point().mul_scalar(r);
    Ok(ElGamalCiphertext::new(c1, c2))
}

/// `C2 - sk·C1`, the message point `m·B`.
pub fn decrypt_point(sk: &PrivateKey, ct: &ElGamalCiphertext) -> Point {
    ct.c2 - ct.c1.mul_scalar(sk.scalar())
}

/// Decrypt an EGCT to its amount.
///
/// # Errors
/// * `ProverError::DecryptionBoundExceeded` - no amount in `[0, MAX_PLAINTEXT]`
///   matches, e.g. the ciphertext was made for another key
pub fn decrypt(sk: &PrivateKey, ct: &ElGamalCiphertext) -> Result<u64, ProverError> {
    if ct.is_empty() {
        return Ok(0);
    }
    let m = decrypt_point(sk, ct);
    let amount = DiscreteLog::new(m)
        .decode()
        .ok_or(ProverError::DecryptionBoundExceeded(MAX_PLAINTEXT))?;
    debug!("elgamal ciphertext decrypted");
    Ok(amount)
}

/// Componentwise sum; decrypts to the sum of the plaintexts.
///
/// An empty ciphertext acts as the encryption of zero.
pub fn add(a: &ElGamalCiphertext, b: &ElGamalCiphertext) -> ElGamalCiphertext {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => *b,
        (_, true) => *a,
        _ => ElGamalCiphertext::new(a.c1 + b.c1, a.c2 + b.c2),
    }
}

/// Componentwise difference; decrypts to `a - b`.
pub fn sub(a: &ElGamalCiphertext, b: &ElGamalCiphertext) -> ElGamalCiphertext {
    if b.is_empty() {
        return *a;
    }
    let a = if a.is_empty() {
        ElGamalCiphertext::new(Point::IDENTITY, Point::IDENTITY)
    } else {
        *a
    };
    ElGamalCiphertext::new(a.c1 - b.c1, a.c2 - b.c2)
}
