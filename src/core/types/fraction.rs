//! Exact rational time values.
//!
//! 帧号 / 帧率 直接得到的分数保留原始分母，不做约分，避免浮点误差。

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::core::error::SegmentError;

/// A rational number that keeps its denominator instead of reducing it.
///
/// Equality and ordering compare by value, so `1/2 == 30/60`.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(into = "(i64, i64)", try_from = "(i64, i64)")]
pub struct Fraction {
    numerator: i64,
    denominator: i64,
}

impl Fraction {
    /// # Panics
    ///
    /// Panics if `denominator` is zero.
    pub fn new(numerator: i64, denominator: i64) -> Self {
        assert!(denominator != 0, "division by zero");
        Self::normalized(numerator, denominator)
    }

    pub fn try_new(numerator: i64, denominator: i64) -> Option<Self> {
        if denominator == 0 {
            return None;
        }
        Some(Self::normalized(numerator, denominator))
    }

    fn normalized(numerator: i64, denominator: i64) -> Self {
        if denominator < 0 {
            Self {
                numerator: -numerator,
                denominator: -denominator,
            }
        } else {
            Self {
                numerator,
                denominator,
            }
        }
    }

    pub const fn from_int(value: i64) -> Self {
        Self {
            numerator: value,
            denominator: 1,
        }
    }

    /// Time of frame `frame_index` at `frame_rate`, as `index / rate` seconds
    /// with the rate's numerator kept as denominator.
    ///
    /// # Panics
    ///
    /// Panics if `frame_rate` is zero.
    pub fn from_frames(frame_index: i64, frame_rate: Fraction) -> Self {
        Self::new(frame_index * frame_rate.denominator, frame_rate.numerator)
    }

    pub const fn zero() -> Self {
        Self::from_int(0)
    }

    pub fn numerator(&self) -> i64 {
        self.numerator
    }

    pub fn denominator(&self) -> i64 {
        self.denominator
    }

    pub fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    pub fn is_positive(&self) -> bool {
        self.numerator > 0
    }

    pub fn to_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Largest integer not greater than the value.
    pub fn floor(&self) -> i64 {
        self.numerator.div_euclid(self.denominator)
    }

    pub fn recip(&self) -> Option<Self> {
        Self::try_new(self.denominator, self.numerator)
    }

    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        rhs.recip().map(|r| self * r)
    }

    /// Lowest-terms copy, used for hashing only.
    pub fn reduced(&self) -> Self {
        if self.numerator == 0 {
            return Self::zero();
        }
        let g = gcd(self.numerator, self.denominator);
        Self {
            numerator: self.numerator / g,
            denominator: self.denominator / g,
        }
    }

    /// Divide both terms by `factor`, which must divide their common divisor.
    ///
    /// `(10000/250)` can be normalized by any factor of 250.
    pub fn normalize_ratio(&self, factor: i64) -> Result<Self, SegmentError> {
        let g = gcd(self.numerator, self.denominator);
        if factor <= 0 || g % factor != 0 {
            return Err(SegmentError::InvalidRatioFactor { factor, gcd: g });
        }
        Ok(Self {
            numerator: self.numerator / factor,
            denominator: self.denominator / factor,
        })
    }

    fn cmp_value(&self, other: &Self) -> Ordering {
        if self.denominator == other.denominator {
            return self.numerator.cmp(&other.numerator);
        }
        let lhs = self.numerator as i128 * other.denominator as i128;
        let rhs = other.numerator as i128 * self.denominator as i128;
        lhs.cmp(&rhs)
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1) as i64
}

impl Default for Fraction {
    fn default() -> Self {
        Self::zero()
    }
}

impl PartialEq for Fraction {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_value(other) == Ordering::Equal
    }
}

impl Eq for Fraction {}

impl Hash for Fraction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let r = self.reduced();
        r.numerator.hash(state);
        r.denominator.hash(state);
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_value(other)
    }
}

impl Add for Fraction {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        let g = gcd(self.denominator, rhs.denominator);
        let denominator = self.denominator / g * rhs.denominator;
        let numerator =
            self.numerator * (rhs.denominator / g) + rhs.numerator * (self.denominator / g);
        Self::new(numerator, denominator)
    }
}

impl Sub for Fraction {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self + (-rhs)
    }
}

impl Mul for Fraction {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        // cross cancellation only; the result is not reduced further
        let g1 = gcd(self.numerator, rhs.denominator);
        let g2 = gcd(rhs.numerator, self.denominator);
        Self::new(
            (self.numerator / g1) * (rhs.numerator / g2),
            (self.denominator / g2) * (rhs.denominator / g1),
        )
    }
}

impl Div for Fraction {
    type Output = Self;

    /// # Panics
    ///
    /// Panics if `rhs` is zero.
    fn div(self, rhs: Self) -> Self::Output {
        assert!(!rhs.is_zero(), "division by zero");
        self * Self::new(rhs.denominator, rhs.numerator)
    }
}

impl Neg for Fraction {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            numerator: -self.numerator,
            denominator: self.denominator,
        }
    }
}

impl Add<i64> for Fraction {
    type Output = Self;

    fn add(self, rhs: i64) -> Self::Output {
        Self::new(self.numerator + rhs * self.denominator, self.denominator)
    }
}

impl Sub<i64> for Fraction {
    type Output = Self;

    fn sub(self, rhs: i64) -> Self::Output {
        self + (-rhs)
    }
}

impl Mul<i64> for Fraction {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::new(self.numerator * rhs, self.denominator)
    }
}

impl Div<i64> for Fraction {
    type Output = Self;

    fn div(self, rhs: i64) -> Self::Output {
        Self::new(self.numerator, self.denominator * rhs)
    }
}

impl From<i64> for Fraction {
    fn from(value: i64) -> Self {
        Self::from_int(value)
    }
}

impl From<Fraction> for (i64, i64) {
    fn from(value: Fraction) -> Self {
        (value.numerator, value.denominator)
    }
}

impl TryFrom<(i64, i64)> for Fraction {
    type Error = String;

    fn try_from((numerator, denominator): (i64, i64)) -> Result<Self, Self::Error> {
        Self::try_new(numerator, denominator)
            .ok_or_else(|| format!("zero denominator in ({numerator}/{denominator})"))
    }
}

impl fmt::Debug for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fraction({}/{})", self.numerator, self.denominator)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}/{})", self.numerator, self.denominator)
    }
}
