//! Exact amounts of money.

use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Neg, Sub},
    str::FromStr,
};

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Error;

/// The number of decimal places the currency supports.
const CENTS_SCALE: u32 = 2;

/// An exact amount of money with at most two decimal places.
///
/// Amounts with more precision are rejected instead of rounded. Internally
/// the value is always held with exactly two decimal places, which means the
/// decimal mantissa is the number of cents. In the database amounts are
/// stored as integer cents so that SQL aggregates stay exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Create an amount of money from `amount`.
    ///
    /// # Errors
    /// Returns a:
    /// - [Error::TooPrecise] if `amount` has more than two significant decimal places,
    /// - or [Error::AmountOutOfRange] if `amount` in cents does not fit in an `i64`.
    pub fn new(amount: Decimal) -> Result<Self, Error> {
        let mut normalized = amount.normalize();

        if normalized.scale() > CENTS_SCALE {
            return Err(Error::TooPrecise(amount));
        }

        normalized.rescale(CENTS_SCALE);

        if i64::try_from(normalized.mantissa()).is_err() {
            return Err(Error::AmountOutOfRange(amount));
        }

        Ok(Self(normalized))
    }

    /// Create an amount that must be strictly greater than zero, e.g. the
    /// amount of a transaction or transfer.
    ///
    /// # Errors
    /// Returns the errors from [Money::new], or [Error::NonPositiveAmount] if
    /// `amount` is zero or negative.
    pub fn positive(amount: Decimal) -> Result<Self, Error> {
        let money = Self::new(amount)?;

        if money.0 <= Decimal::ZERO {
            return Err(Error::NonPositiveAmount(money));
        }

        Ok(money)
    }

    /// Create an amount that must not be negative.
    ///
    /// # Errors
    /// Returns the errors from [Money::new], or [Error::NegativeAmount] if
    /// `amount` is less than zero.
    pub fn non_negative(amount: Decimal) -> Result<Self, Error> {
        let money = Self::new(amount)?;

        if money.is_negative() {
            return Err(Error::NegativeAmount(money));
        }

        Ok(money)
    }

    /// Zero dollars.
    pub fn zero() -> Self {
        Self::from_cents(0)
    }

    /// Create an amount from a whole number of cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, CENTS_SCALE))
    }

    /// The amount as a whole number of cents.
    ///
    /// # Errors
    /// Returns an [Error::AmountOutOfRange] if the amount was built with `+`
    /// or `-` and no longer fits in an `i64` of cents.
    pub fn cents(&self) -> Result<i64, Error> {
        i64::try_from(self.0.mantissa()).map_err(|_| Error::AmountOutOfRange(self.0))
    }

    /// Add two amounts, failing instead of leaving the storable range.
    ///
    /// Use this for any value that is written back to the database.
    ///
    /// # Errors
    /// Returns an [Error::AmountOutOfRange] if the sum does not fit in an
    /// `i64` of cents.
    pub fn checked_add(self, rhs: Self) -> Result<Self, Error> {
        self.cents()?
            .checked_add(rhs.cents()?)
            .map(Self::from_cents)
            .ok_or(Error::AmountOutOfRange(self.0 + rhs.0))
    }

    /// Subtract `rhs`, failing instead of leaving the storable range.
    ///
    /// # Errors
    /// Returns an [Error::AmountOutOfRange] if the difference does not fit in
    /// an `i64` of cents.
    pub fn checked_sub(self, rhs: Self) -> Result<Self, Error> {
        self.cents()?
            .checked_sub(rhs.cents()?)
            .map(Self::from_cents)
            .ok_or(Error::AmountOutOfRange(self.0 - rhs.0))
    }

    /// The amount as a decimal number.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Whether the amount is greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Whether the amount is less than zero.
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount =
            Decimal::from_str(s.trim()).map_err(|_| Error::InvalidAmount(s.to_owned()))?;

        Self::new(amount)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = Error;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::zero(), |total, amount| total + amount)
    }
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let cents = self
            .cents()
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;

        Ok(ToSqlOutput::from(cents))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(Money::from_cents)
    }
}
