//! Integer money amount in minor units.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! Every arithmetic operation is checked and reports overflow instead of
//! wrapping or saturating.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by money arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// The result does not fit in the representable range.
    #[error("Arithmetic overflow: {lhs} {op} {rhs}")]
    Overflow {
        /// Left operand.
        lhs: i64,
        /// Operator symbol.
        op: char,
        /// Right operand.
        rhs: i64,
    },
}

/// A signed amount in minor currency or credit units (e.g. cents).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from minor units.
    #[must_use]
    pub const fn new(minor_units: i64) -> Self {
        Self(minor_units)
    }

    /// Returns the amount in minor units.
    #[must_use]
    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns true if the amount is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Adds two amounts.
    pub fn checked_add(self, rhs: Self) -> Result<Self, MoneyError> {
        self.0.checked_add(rhs.0).map(Self).ok_or(MoneyError::Overflow {
            lhs: self.0,
            op: '+',
            rhs: rhs.0,
        })
    }

    /// Subtracts `rhs` from this amount.
    pub fn checked_sub(self, rhs: Self) -> Result<Self, MoneyError> {
        self.0.checked_sub(rhs.0).map(Self).ok_or(MoneyError::Overflow {
            lhs: self.0,
            op: '-',
            rhs: rhs.0,
        })
    }

    /// Negates the amount. Fails for `i64::MIN`.
    pub fn checked_neg(self) -> Result<Self, MoneyError> {
        self.0.checked_neg().map(Self).ok_or(MoneyError::Overflow {
            lhs: 0,
            op: '-',
            rhs: self.0,
        })
    }

    /// Absolute value. Fails for `i64::MIN`.
    pub fn checked_abs(self) -> Result<Self, MoneyError> {
        if self.is_negative() {
            self.checked_neg()
        } else {
            Ok(self)
        }
    }

    /// Sums a sequence of amounts, failing on the first overflow.
    pub fn checked_sum<I>(amounts: I) -> Result<Self, MoneyError>
    where
        I: IntoIterator<Item = Self>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, amount| acc.checked_add(amount))
    }
}

impl From<i64> for Money {
    fn from(minor_units: i64) -> Self {
        Self(minor_units)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
