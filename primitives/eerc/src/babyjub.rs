//! Baby Jubjub in circomlib coordinates.
//!
//! Twisted Edwards curve `a·x² + y² = 1 + d·x²·y²` over [`Field`] with
//! `a = 168700`, `d = 168696`. These are the coordinates the registration and
//! transfer circuits (and the on-chain registrar) use, which differ from the
//! `a = 1` model of `ark-ed-on-bn254`, so the group law is implemented here
//! directly. Arithmetic runs in projective coordinates with the complete
//! `add-2008-bbjlp` formula and normalises once per operation.

use core::ops::{Add, Neg, Sub};

use ark_ff::{BigInteger, Field as _, MontFp, One, PrimeField, Zero};
use serde::{Deserialize, Serialize};

use crate::PrimitiveError;
use crate::field::{Field, Scalar, from_decimal, serde_field};

pub const COEFF_A: Field = MontFp!("168700");
pub const COEFF_D: Field = MontFp!("168696");

/// Generator of the prime-order subgroup (`8·G` for the curve generator `G`).
pub const BASE8: Point = Point {
    x: MontFp!("5299619240641551281634865583518297030282874472190772894086521144482721001553"),
    y: MontFp!("16950150798460657717958625567821834550301663161624707787222815936182638968203"),
};

/// Order `l` of the subgroup generated by [`BASE8`].
pub const SUBGROUP_ORDER: &str =
    "2736030358979909402780800718157159386076813972158567259200215660948447373041";

/// Affine point. `(0, 1)` is the group identity; `(0, 0)` is not a curve point
/// and is only used as the ledger's "unset" marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    #[serde(with = "serde_field")]
    pub x: Field,
    #[serde(with = "serde_field")]
    pub y: Field,
}

impl Point {
    pub const IDENTITY: Point = Point {
        x: MontFp!("0"),
        y: MontFp!("1"),
    };

    pub const ZERO: Point = Point {
        x: MontFp!("0"),
        y: MontFp!("0"),
    };

    pub fn new(x: Field, y: Field) -> Self {
        Point { x, y }
    }

    /// Parse decimal coordinates and check curve membership.
    pub fn from_decimal(x: &str, y: &str) -> Result<Self, PrimitiveError> {
        let p = Point::new(from_decimal(x)?, from_decimal(y)?);
        if p.is_on_curve() {
            Ok(p)
        } else {
            Err(PrimitiveError::NotOnCurve)
        }
    }

    /// Both coordinates zero.
    pub fn is_zero(&self) -> bool {
        self.x.is_zero() && self.y.is_zero()
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn is_on_curve(&self) -> bool {
        let x2 = self.x.square();
        let y2 = self.y.square();
        COEFF_A * x2 + y2 == Field::one() + COEFF_D * x2 * y2
    }

    /// `k · self` by double-and-add over the bits of `k`.
    pub fn mul_scalar(&self, k: &Scalar) -> Point {
        let base = Projective::from(*self);
        let mut acc = Projective::IDENTITY;
        for bit in k.into_bigint().to_bits_be() {
            acc = acc.add(&acc);
            if bit {
                acc = acc.add(&base);
            }
        }
        acc.to_affine()
    }

    pub fn to_array(&self) -> [Field; 2] {
        [self.x, self.y]
    }
}

/// `k · Base8`.
pub fn base8_mul(k: &Scalar) -> Point {
    BASE8.mul_scalar(k)
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Projective::from(self).add(&Projective::from(rhs)).to_affine()
    }
}

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point::new(-self.x, self.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        self + (-rhs)
    }
}

/// Projective `(X : Y : Z)` with `x = X/Z`, `y = Y/Z`.
#[derive(Clone, Copy, Debug)]
pub struct Projective {
    pub x: Field,
    pub y: Field,
    pub z: Field,
}

impl Projective {
    pub const IDENTITY: Projective = Projective {
        x: MontFp!("0"),
        y: MontFp!("1"),
        z: MontFp!("1"),
    };

    pub fn add(&self, o: &Projective) -> Projective {
        let a = self.z * o.z;
        let b = a.square();
        let c = self.x * o.x;
        let d = self.y * o.y;
        let e = COEFF_D * c * d;
        let f = b - e;
        let g = b + e;
        Projective {
            x: a * f * ((self.x + self.y) * (o.x + o.y) - c - d),
            y: a * g * (d - COEFF_A * c),
            z: f * g,
        }
    }

    /// `Z` is never zero for curve points; off-curve inputs collapse to
    /// [`Point::ZERO`].
    pub fn to_affine(&self) -> Point {
        match self.z.inverse() {
            Some(inv) => Point::new(self.x * inv, self.y * inv),
            None => Point::ZERO,
        }
    }
}

impl From<Point> for Projective {
    fn from(p: Point) -> Self {
        Projective {
            x: p.x,
            y: p.y,
            z: Field::one(),
        }
    }
}

/// Normalise many projective points with a single field inversion.
pub fn batch_to_affine(points: &[Projective]) -> Vec<Point> {
    let mut zs: Vec<Field> = points.iter().map(|p| p.z).collect();
    ark_ff::batch_inversion(&mut zs);
    points
        .iter()
        .zip(zs)
        .map(|(p, zinv)| Point::new(p.x * zinv, p.y * zinv))
        .collect()
}
