//! Fixed-point scaled integer — generalizes the 1e-6 `Micros` money type
//! used elsewhere in this workspace to the 1e-8 scale this system's prices,
//! quantities, and PnL figures are specified at.
//!
//! # Scale
//!
//! `Scaled::SCALE` is `100_000_000` (1e8). One "unit" (one dollar, one
//! share) is `Scaled::new(100_000_000)`. Quantities, prices, and PnL all
//! share this scale so they can be multiplied and divided without a
//! secondary unit-conversion step.
//!
//! # Construction
//!
//! There is no `From<i64>` impl. A raw integer must go through
//! [`Scaled::new`] or [`Scaled::from_decimal_str`] so that a quantity
//! accidentally flowing into a price field (or vice versa) is a compile
//! error, not a silent bug.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scaled(i64);

impl Scaled {
    pub const SCALE: i64 = 100_000_000;

    pub const ZERO: Scaled = Scaled(0);
    pub const MAX: Scaled = Scaled(i64::MAX);
    pub const MIN: Scaled = Scaled(i64::MIN);

    /// Construct from a raw scaled `i64` (already multiplied by `SCALE`).
    #[inline]
    pub const fn new(raw: i64) -> Self {
        Scaled(raw)
    }

    /// Extract the underlying raw `i64`.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Parse a decimal string (e.g. `"123.45"`) into a `Scaled` value.
    /// Returns `None` on malformed input or overflow. Used for config and
    /// wire-format fields that carry price/quantity strings.
    pub fn from_decimal_str(s: &str) -> Option<Scaled> {
        let negative = s.starts_with('-');
        let s = s.strip_prefix('-').unwrap_or(s);
        let mut parts = s.splitn(2, '.');
        let int_part = parts.next()?;
        let frac_part = parts.next().unwrap_or("");
        if frac_part.len() > 8 || !int_part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !frac_part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let int_val: i64 = int_part.parse().ok()?;
        let mut frac_digits = frac_part.to_string();
        while frac_digits.len() < 8 {
            frac_digits.push('0');
        }
        let frac_val: i64 = frac_digits.parse().ok()?;
        let magnitude = int_val.checked_mul(Self::SCALE)?.checked_add(frac_val)?;
        Some(Scaled(if negative { -magnitude } else { magnitude }))
    }

    #[inline]
    pub fn saturating_add(self, rhs: Scaled) -> Scaled {
        Scaled(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Scaled) -> Scaled {
        Scaled(self.0.saturating_sub(rhs.0))
    }

    #[inline]
    pub fn checked_add(self, rhs: Scaled) -> Option<Scaled> {
        self.0.checked_add(rhs.0).map(Scaled)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Scaled) -> Option<Scaled> {
        self.0.checked_sub(rhs.0).map(Scaled)
    }

    #[inline]
    pub fn abs(self) -> Scaled {
        Scaled(self.0.saturating_abs())
    }

    #[inline]
    pub fn signum(self) -> i64 {
        self.0.signum()
    }

    #[inline]
    pub fn is_non_negative(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Multiply a per-unit `Scaled` price by an integer quantity (itself
    /// expressed in `Scaled` units, e.g. whole shares * SCALE). Divides out
    /// one factor of SCALE so the result stays at 1e8 scale rather than 1e16.
    #[inline]
    pub fn checked_mul_scaled(self, rhs: Scaled) -> Option<Scaled> {
        let product = (self.0 as i128).checked_mul(rhs.0 as i128)?;
        let scaled = product / Self::SCALE as i128;
        if scaled > i64::MAX as i128 || scaled < i64::MIN as i128 {
            None
        } else {
            Some(Scaled(scaled as i64))
        }
    }

    /// Like [`Scaled::checked_mul_scaled`] but saturates to `MAX`/`MIN`
    /// instead of returning `None` on overflow, for accumulators (realized
    /// PnL) where clamping is preferable to dropping the update.
    #[inline]
    pub fn saturating_mul_scaled(self, rhs: Scaled) -> Scaled {
        let product = (self.0 as i128) * (rhs.0 as i128);
        let scaled = product / Self::SCALE as i128;
        if scaled > i64::MAX as i128 {
            Scaled::MAX
        } else if scaled < i64::MIN as i128 {
            Scaled::MIN
        } else {
            Scaled(scaled as i64)
        }
    }

    /// Multiply by a plain (non-scaled) integer quantity, e.g. a share count.
    #[inline]
    pub fn checked_mul_qty(self, qty: i64) -> Option<Scaled> {
        self.0.checked_mul(qty).map(Scaled)
    }

    /// Divide by a plain (non-scaled) integer quantity. Returns `None` for
    /// division by zero.
    #[inline]
    pub fn checked_div_qty(self, qty: i64) -> Option<Scaled> {
        if qty == 0 {
            None
        } else {
            Some(Scaled(self.0 / qty))
        }
    }

    /// Divide by another `Scaled` value (e.g. total cost / total quantity
    /// when both are expressed at 1e8 scale, as in a weighted-average entry
    /// price computation). Multiplies the numerator by `SCALE` first to
    /// keep the result at the same scale, mirroring `checked_mul_scaled`'s
    /// divide-out-one-factor trick in reverse. Returns `None` on division
    /// by zero or overflow.
    #[inline]
    pub fn checked_div_scaled(self, rhs: Scaled) -> Option<Scaled> {
        if rhs.0 == 0 {
            return None;
        }
        let numerator = (self.0 as i128).checked_mul(Self::SCALE as i128)?;
        let quotient = numerator / rhs.0 as i128;
        if quotient > i64::MAX as i128 || quotient < i64::MIN as i128 {
            None
        } else {
            Some(Scaled(quotient as i64))
        }
    }

    /// Basis points as a ratio against `self` (e.g. `bps(100)` == 1% of self).
    #[inline]
    pub fn bps_of(self, bps: i64) -> Scaled {
        Scaled(((self.0 as i128) * bps as i128 / 10_000) as i64)
    }
}

impl Add for Scaled {
    type Output = Scaled;
    #[inline]
    fn add(self, rhs: Scaled) -> Scaled {
        Scaled(self.0 + rhs.0)
    }
}

impl Sub for Scaled {
    type Output = Scaled;
    #[inline]
    fn sub(self, rhs: Scaled) -> Scaled {
        Scaled(self.0 - rhs.0)
    }
}

impl Neg for Scaled {
    type Output = Scaled;
    #[inline]
    fn neg(self) -> Scaled {
        Scaled(-self.0)
    }
}

impl AddAssign for Scaled {
    #[inline]
    fn add_assign(&mut self, rhs: Scaled) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Scaled {
    #[inline]
    fn sub_assign(&mut self, rhs: Scaled) {
        self.0 -= rhs.0;
    }
}

impl std::fmt::Display for Scaled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / Self::SCALE;
        let frac = (self.0 % Self::SCALE).abs();
        if self.0 < 0 && whole == 0 {
            write!(f, "-{whole}.{frac:08}")
        } else {
            write!(f, "{whole}.{frac:08}")
        }
    }
}
