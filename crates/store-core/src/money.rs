//! Fixed-point currency.
//!
//! Amounts are held as a whole number of cents so that sums are exact and
//! every rendered value already equals itself rounded to two decimals.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A currency amount in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    /// Convert a float, rounding half away from zero to whole cents.
    ///
    /// Returns `None` for NaN, infinities and values outside the `i64` range.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let cents = (value * 100.0).round();
        if cents < i64::MIN as f64 || cents > i64::MAX as f64 {
            return None;
        }
        Some(Money(cents as i64))
    }

    /// Parse a loosely formatted amount such as `"12.5"`, `"$1,234.567"` or
    /// `"-3"`.
    ///
    /// Plain decimal strings are rounded digit-wise, so `"2.675"` becomes
    /// `2.68` without binary floating-point drift. Anything else (exponent
    /// notation) goes through [`Money::from_f64`].
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, '$' | ',' | ' '))
            .collect();
        if cleaned.is_empty() {
            return None;
        }

        let (negative, body) = match cleaned.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
        };
        if body.starts_with(['+', '-']) {
            return None;
        }

        let cents = match parse_decimal_cents(body) {
            Some(c) => c,
            None => {
                let value: f64 = body.parse().ok()?;
                Money::from_f64(value)?.0
            }
        };

        Some(Money(if negative { -cents } else { cents }))
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// `None` when the sum does not fit in `i64` cents.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Divide by `count`, rounding half away from zero. `count == 0` yields zero.
    pub fn mean_of(self, count: u64) -> Money {
        if count == 0 {
            return Money::ZERO;
        }
        let n = count as i128;
        let c = self.0 as i128;
        let rounded = if c >= 0 {
            (2 * c + n) / (2 * n)
        } else {
            (2 * c - n) / (2 * n)
        };
        Money(rounded as i64)
    }

    /// Render with a dollar sign and thousands separators, e.g. `"$1,234.56"`.
    pub fn to_display_string(self) -> String {
        let plain = self.to_string();
        let (sign, body) = match plain.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", plain.as_str()),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, "00"));
        format!("${}{}.{}", sign, group_thousands(int_part), frac_part)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// Saturates at the `i64` bounds; use [`Money::checked_add`] to detect that.
impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = *self + rhs;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Money::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid currency amount \"{}\"", raw)))
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Parse an unsigned `digits[.digits]` string into cents, rounding on the
/// third fractional digit.
fn parse_decimal_cents(body: &str) -> Option<i64> {
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return None;
    }

    let whole: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };

    let mut digits = frac_part.bytes().map(|b| i64::from(b - b'0'));
    let tenths = digits.next().unwrap_or(0);
    let hundredths = digits.next().unwrap_or(0);
    let round_up = digits.next().is_some_and(|d| d >= 5);

    whole
        .checked_mul(100)?
        .checked_add(tenths * 10 + hundredths + i64::from(round_up))
}

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}
