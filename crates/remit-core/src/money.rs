//! # Money and Tax Rates
//!
//! Amounts are integer cents. Rates are parts-per-million. The only rounding
//! in the engine happens in [`TaxRate::apply`], half-up to the cent, so a
//! quote computed twice from the same inputs is bit-identical.
//!
//! Both types serialize as decimal strings (`"0.83"`, `"0.0825"`) so that no
//! JSON consumer ever sees a binary float for money.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// Parts-per-million denominator for [`TaxRate`].
const PPM: i128 = 1_000_000;

/// Global fallback sales tax rate (8.25 %).
pub const DEFAULT_TAX_RATE: TaxRate = TaxRate(82_500);

// ─── Amount parsing ─────────────────────────────────────────────────

/// Parse a decimal amount string into integer cents.
///
/// Accepts an optional leading `-`, whole units, and at most two fractional
/// digits:
/// - "10000" → 1000000
/// - "100.5" → 10050
/// - "0.01" → 1
///
/// Returns `None` for unparseable strings, more than two fractional digits,
/// or values that overflow `i64` cents.
pub fn parse_amount(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > 2
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let whole_value: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac_value: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };

    let cents = whole_value.checked_mul(100)?.checked_add(frac_value)?;
    Some(if negative { -cents } else { cents })
}

/// Format cents as a string with exactly two decimal places.
pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Integer division rounding half away from zero. `denominator` must be positive.
fn div_round_half_up(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    }
}

// ─── Cents ──────────────────────────────────────────────────────────

/// A monetary amount in integer cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cents(i64);

impl Cents {
    /// Zero cents.
    pub const ZERO: Cents = Cents(0);

    /// Wrap a raw cent count.
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// The raw cent count.
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Parse a decimal string such as `"12.50"`.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        parse_amount(s).map(Self).ok_or_else(|| {
            ValidationError::InvalidAmount(format!(
                "'{s}' is not a decimal amount with at most two fractional digits"
            ))
        })
    }

    /// Convert a major-unit float from an external API, rounding to the cent.
    pub fn from_major_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let cents = (value * 100.0).round();
        if cents.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Self(cents as i64))
    }

    /// Major-unit float for wire formats that require a JSON number.
    pub fn to_major_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Cents) -> Option<Cents> {
        self.0.checked_add(rhs.0).map(Cents)
    }

    pub fn checked_sub(self, rhs: Cents) -> Option<Cents> {
        self.0.checked_sub(rhs.0).map(Cents)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_amount(self.0))
    }
}

impl Add for Cents {
    type Output = Cents;

    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Cents) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Cents {
    type Output = Cents;

    fn sub(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Cents>>(iter: I) -> Cents {
        iter.fold(Cents::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Cents> for Cents {
    fn sum<I: Iterator<Item = &'a Cents>>(iter: I) -> Cents {
        iter.copied().sum()
    }
}

impl Serialize for Cents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_amount(self.0))
    }
}

/// Wire forms accepted for amounts and rates: a decimal string or a JSON number.
#[derive(Deserialize)]
#[serde(untagged)]
enum DecimalRepr {
    Text(String),
    Int(i64),
    Float(f64),
}

impl<'de> Deserialize<'de> for Cents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match DecimalRepr::deserialize(deserializer)? {
            DecimalRepr::Text(s) => Cents::parse(&s).map_err(serde::de::Error::custom),
            DecimalRepr::Int(units) => units
                .checked_mul(100)
                .map(Cents)
                .ok_or_else(|| serde::de::Error::custom("amount overflows")),
            DecimalRepr::Float(v) => Cents::from_major_f64(v)
                .ok_or_else(|| serde::de::Error::custom("amount is not a finite number")),
        }
    }
}

// ─── TaxRate ────────────────────────────────────────────────────────

/// A tax rate as an exact fraction in parts-per-million (`0.0825` = 82 500).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaxRate(u32);

impl TaxRate {
    /// The zero rate.
    pub const ZERO: TaxRate = TaxRate(0);

    /// Construct from parts-per-million. Rates above 100 % are rejected.
    pub fn from_ppm(ppm: u32) -> Result<Self, ValidationError> {
        if i128::from(ppm) > PPM {
            return Err(ValidationError::InvalidRate(format!(
                "{ppm} ppm exceeds 100%"
            )));
        }
        Ok(Self(ppm))
    }

    /// Parse a decimal fraction such as `"0.08875"` (up to six fractional digits).
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidRate(format!("'{s}' is not a fraction in [0, 1]"));
        let trimmed = s.trim();
        let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if (whole.is_empty() && frac.is_empty())
            || frac.len() > 6
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let whole_value: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac_value: u64 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<6}");
            padded.parse().map_err(|_| invalid())?
        };
        let ppm = whole_value
            .checked_mul(1_000_000)
            .and_then(|v| v.checked_add(frac_value))
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(invalid)?;
        Self::from_ppm(ppm)
    }

    /// Convert a fraction reported by an external API, rounding to the nearest ppm.
    pub fn from_fraction(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ValidationError::InvalidRate(format!(
                "{value} is not a fraction in [0, 1]"
            )));
        }
        Self::from_ppm((value * 1_000_000.0).round() as u32)
    }

    pub fn ppm(self) -> u32 {
        self.0
    }

    pub fn as_fraction(self) -> f64 {
        f64::from(self.0) / 1_000_000.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Tax owed on `base`, rounded half-up to the cent.
    pub fn apply(self, base: Cents) -> Cents {
        let raw = i128::from(base.as_i64()) * i128::from(self.0);
        // |result| <= |base| because the rate never exceeds 1.
        Cents(div_round_half_up(raw, PPM) as i64)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        DEFAULT_TAX_RATE
    }
}

impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / 1_000_000;
        let frac = self.0 % 1_000_000;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:06}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl Serialize for TaxRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaxRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match DecimalRepr::deserialize(deserializer)? {
            DecimalRepr::Text(s) => TaxRate::parse(&s),
            DecimalRepr::Int(v) => u32::try_from(v)
                .map_err(|_| ValidationError::InvalidRate(v.to_string()))
                .and_then(|v| {
                    v.checked_mul(1_000_000)
                        .ok_or_else(|| ValidationError::InvalidRate(v.to_string()))
                })
                .and_then(TaxRate::from_ppm),
            DecimalRepr::Float(v) => TaxRate::from_fraction(v),
        }
        .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ── Amount parsing ──────────────────────────────────────────────

    #[test]
    fn parse_amount_whole_and_decimal() {
        assert_eq!(parse_amount("10000"), Some(1_000_000));
        assert_eq!(parse_amount("100.5"), Some(10_050));
        assert_eq!(parse_amount("0.01"), Some(1));
        assert_eq!(parse_amount(".5"), Some(50));
        assert_eq!(parse_amount("-12.30"), Some(-1_230));
    }

    #[test]
    fn parse_amount_rejects_garbage_and_sub_cent_precision() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("1.234"), None);
        assert_eq!(parse_amount("1,000"), None);
        assert_eq!(parse_amount("."), None);
        assert_eq!(parse_amount("99999999999999999999"), None);
    }

    #[test]
    fn format_amount_pads_cents() {
        assert_eq!(format_amount(83), "0.83");
        assert_eq!(format_amount(2310), "23.10");
        assert_eq!(format_amount(-5), "-0.05");
        assert_eq!(format_amount(0), "0.00");
    }

    #[test]
    fn cents_serde_uses_strings() {
        let json = serde_json::to_string(&Cents::new(50_000)).unwrap();
        assert_eq!(json, "\"500.00\"");
        let parsed: Cents = serde_json::from_str("\"12.5\"").unwrap();
        assert_eq!(parsed, Cents::new(1_250));
        let from_number: Cents = serde_json::from_str("8.0").unwrap();
        assert_eq!(from_number, Cents::new(800));
        let from_int: Cents = serde_json::from_str("3").unwrap();
        assert_eq!(from_int, Cents::new(300));
    }

    #[test]
    fn cents_sum_and_sub() {
        let total: Cents = [1_250, 800, 260].into_iter().map(Cents::new).sum();
        assert_eq!(total, Cents::new(2_310));
        assert_eq!(total - Cents::new(310), Cents::new(2_000));
    }

    #[test]
    fn from_major_f64_rounds_to_cent() {
        assert_eq!(Cents::from_major_f64(0.83), Some(Cents::new(83)));
        assert_eq!(Cents::from_major_f64(12.5), Some(Cents::new(1_250)));
        assert_eq!(Cents::from_major_f64(-2.6), Some(Cents::new(-260)));
        assert_eq!(Cents::from_major_f64(f64::NAN), None);
    }

    // ── Rates ───────────────────────────────────────────────────────

    #[test]
    fn rate_parse_and_display() {
        let rate = TaxRate::parse("0.0825").unwrap();
        assert_eq!(rate.ppm(), 82_500);
        assert_eq!(rate.to_string(), "0.0825");
        assert_eq!(TaxRate::parse("0.08875").unwrap().to_string(), "0.08875");
        assert_eq!(TaxRate::parse("1").unwrap().to_string(), "1");
        assert_eq!(TaxRate::ZERO.to_string(), "0");
    }

    #[test]
    fn rate_rejects_out_of_range() {
        assert!(TaxRate::parse("1.5").is_err());
        assert!(TaxRate::parse("-0.1").is_err());
        assert!(TaxRate::parse("0.1234567").is_err());
        assert!(TaxRate::from_fraction(f64::INFINITY).is_err());
    }

    #[test]
    fn rate_deserializes_from_number_or_string() {
        let a: TaxRate = serde_json::from_str("0.0825").unwrap();
        let b: TaxRate = serde_json::from_str("\"0.0825\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(DEFAULT_TAX_RATE, a);
    }

    #[test]
    fn apply_rounds_half_up() {
        // 0.0825 × 10.00 = 0.825 → 0.83
        assert_eq!(DEFAULT_TAX_RATE.apply(Cents::new(1_000)), Cents::new(83));
        // 0.0825 × 0.20 = 0.0165 → 0.02
        assert_eq!(DEFAULT_TAX_RATE.apply(Cents::new(20)), Cents::new(2));
        // 0.0825 × 0.06 = 0.00495 → 0.00
        assert_eq!(DEFAULT_TAX_RATE.apply(Cents::new(6)), Cents::ZERO);
        assert_eq!(TaxRate::ZERO.apply(Cents::new(123_456)), Cents::ZERO);
    }

    proptest! {
        #[test]
        fn apply_is_within_half_a_cent(base in 0i64..10_000_000_000, ppm in 0u32..=1_000_000) {
            let rate = TaxRate::from_ppm(ppm).unwrap();
            let taxed = rate.apply(Cents::new(base)).as_i64();
            let exact = i128::from(base) * i128::from(ppm);
            let error = (i128::from(taxed) * PPM - exact).abs();
            prop_assert!(error * 2 <= PPM);
        }

        #[test]
        fn apply_is_monotone_in_base(a in 0i64..1_000_000_000, b in 0i64..1_000_000_000, ppm in 0u32..=1_000_000) {
            let rate = TaxRate::from_ppm(ppm).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(rate.apply(Cents::new(lo)) <= rate.apply(Cents::new(hi)));
        }
    }
}
