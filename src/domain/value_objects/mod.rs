//! Value Objects for OrderEase

use chrono::Utc;
use rand::Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

/// Fixed two-decimal monetary amount.
///
/// Used for prices, option adjustments (which may be negative) and totals.
/// Serialized as a JSON number; accepts numbers or numeric strings on input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const SCALE: u32 = 2;
    /// Largest amount a `NUMERIC(12, 2)` column holds: 9 999 999 999.99.
    pub const MAX: Money = Money(Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2));

    pub fn new(amount: Decimal) -> Self { Self(amount.round_dp(Self::SCALE)) }
    pub fn zero() -> Self { Self(Decimal::ZERO) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
    pub fn times(&self, qty: Quantity) -> Money { Money::new(self.0 * Decimal::from(qty.value())) }

    pub fn parse(raw: &str) -> Result<Self, MoneyError> {
        Decimal::from_str(raw.trim()).map(Self::new).map_err(|_| MoneyError::Unparsable(raw.to_string()))
    }

    fn from_f64(value: f64) -> Result<Self, MoneyError> {
        Decimal::from_f64(value).map(Self::new).ok_or(MoneyError::OutOfRange)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self { Self(Decimal::from(value)) }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self { Self::new(value) }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money::new(self.0 + rhs.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self { iter.fold(Money::zero(), |acc, m| acc + m) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.to_f64() {
            Some(v) => serializer.serialize_f64(v),
            None => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw { Number(f64), Text(String) }

        match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Money::from_f64(v),
            Raw::Text(s) => Money::parse(&s),
        }
        .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { Unparsable(String), OutOfRange }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unparsable(raw) => write!(f, "invalid amount: {raw}"),
            Self::OutOfRange => write!(f, "amount out of range"),
        }
    }
}

/// Strictly positive item quantity
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        if value > i32::MAX as u32 { return Err(QuantityError::TooLarge); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn as_i32(&self) -> i32 { self.0 as i32 }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value <= 0 { return Err(QuantityError::Zero); }
        u32::try_from(value).map_err(|_| QuantityError::TooLarge).and_then(Self::new)
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self { q.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum QuantityError { Zero, TooLarge }
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Zero => write!(f, "quantity must be greater than 0"), Self::TooLarge => write!(f, "quantity too large") }
    }
}

/// 1-based page request. Out-of-range values are rejected, never clamped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub const DEFAULT_PAGE_SIZE: u32 = 10;
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Result<Self, PageError> {
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(Self::DEFAULT_PAGE_SIZE as i64);
        if page < 1 || page > u32::MAX as i64 { return Err(PageError::Page(page)); }
        if page_size < 1 || page_size > Self::MAX_PAGE_SIZE as i64 { return Err(PageError::PageSize(page_size)); }
        Ok(Self { page: page as u32, page_size: page_size as u32 })
    }

    pub fn page(&self) -> u32 { self.page }
    pub fn page_size(&self) -> u32 { self.page_size }
    pub fn limit(&self) -> i64 { self.page_size as i64 }
    pub fn offset(&self) -> i64 { (self.page as i64 - 1) * self.page_size as i64 }
}

impl Default for PageRequest {
    fn default() -> Self { Self { page: 1, page_size: Self::DEFAULT_PAGE_SIZE } }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PageError { Page(i64), PageSize(i64) }
impl std::error::Error for PageError {}
impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page(p) => write!(f, "page must be >= 1, got {p}"),
            Self::PageSize(s) => write!(f, "pageSize must be between 1 and {}, got {s}", PageRequest::MAX_PAGE_SIZE),
        }
    }
}

/// Snowflake-style id: 41 bits of milliseconds since 2024-01-01 UTC, then 12
/// low bits starting at a random offset within the millisecond.
///
/// Orders, items and options are minted in tight loops, so within one process
/// every id is strictly greater than the previous one. A burst of more than a
/// few thousand ids in one millisecond spills into the next millisecond's range.
pub fn snowflake_id() -> i64 {
    const EPOCH_MS: i64 = 1_704_067_200_000;
    static LAST: AtomicI64 = AtomicI64::new(0);

    let ts = (Utc::now().timestamp_millis() - EPOCH_MS) & 0x1FF_FFFF_FFFF;
    let candidate = (ts << 12) | rand::thread_rng().gen_range(0..0x800);
    let mut last = LAST.load(Ordering::Relaxed);
    loop {
        let next = candidate.max(last + 1);
        match LAST.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(seen) => last = seen,
        }
    }
}
