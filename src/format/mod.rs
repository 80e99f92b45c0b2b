//! Display formatting for raffle notifications.
//!
//! Everything here is pure. Money amounts arrive as `U256` and are rendered by
//! shifting their decimal digits, so a wei value never passes through a float
//! on its way into a caption. Rounding is done on the digit string as well.

use alloy::primitives::utils::format_units;
use alloy::primitives::U256;
use std::cmp::Ordering;

/// Fractional digits used when a caller has no precision of its own.
pub const DEFAULT_DECIMAL_PLACES: u32 = 4;

/// Decimals of the chain's native currency.
pub const NATIVE_DECIMALS: u8 = 18;

/// Scientific-notation input is expanded to this many fractional digits
/// before the requested precision is applied.
const SCIENTIFIC_PRECISION: usize = 18;

/// Exponents beyond this are treated as unparseable rather than expanded.
const MAX_EXPONENT: i64 = 1_000;

/// Coerce a chain integer into `u64`, saturating at `u64::MAX`.
pub fn saturating_u64(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

/// Render a countdown as `"{d}d {h}h {m}m {s}s"`. Zero units are kept.
pub fn format_duration(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    format!("{days}d {hours}h {minutes}m {seconds}s")
}

/// First six characters, an ellipsis, then the last four.
pub fn truncate_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    let head: String = chars.iter().take(6).collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("{head}...{tail}")
}

/// Exact `value / 10^decimals` as a plain decimal string with trailing
/// fractional zeros removed (`1500000000000000000` at 18 → `"1.5"`).
/// Decimals past alloy's largest unit (77) leave no whole digits to show and
/// render as `"0"`.
pub fn shift_decimal(value: U256, decimals: u8) -> String {
    match format_units(value, decimals) {
        Ok(units) => units
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string(),
        Err(_) => "0".to_string(),
    }
}

/// Anything that can be rendered as a decimal number.
pub trait Numeric {
    fn to_numeric_string(&self) -> String;
}

impl Numeric for str {
    fn to_numeric_string(&self) -> String {
        self.to_string()
    }
}

impl Numeric for String {
    fn to_numeric_string(&self) -> String {
        self.clone()
    }
}

impl Numeric for f64 {
    fn to_numeric_string(&self) -> String {
        self.to_string()
    }
}

impl Numeric for i64 {
    fn to_numeric_string(&self) -> String {
        self.to_string()
    }
}

impl Numeric for u64 {
    fn to_numeric_string(&self) -> String {
        self.to_string()
    }
}

impl Numeric for U256 {
    fn to_numeric_string(&self) -> String {
        self.to_string()
    }
}

/// Round `value` to `decimal_places` and group the integer part in threes.
///
/// Absent or unparseable input renders as `"0"`. Scientific notation is
/// expanded (to 18 fractional digits, trailing zeros trimmed) before
/// rounding. Ties round towards positive infinity, so `2.5 → 3` and
/// `-1234.5 → -1234`. With `decimal_places == 0` no fractional part is
/// printed.
pub fn format_grouped_decimal<N: Numeric + ?Sized>(value: Option<&N>, decimal_places: u32) -> String {
    value
        .and_then(|v| normalize(&v.to_numeric_string()))
        .map(|d| d.round(decimal_places as usize).render(true))
        .unwrap_or_else(|| "0".to_string())
}

/// Same rounding as [`format_grouped_decimal`] without digit grouping.
pub fn format_fixed<N: Numeric + ?Sized>(value: &N, decimal_places: u32) -> Option<String> {
    normalize(&value.to_numeric_string()).map(|d| d.round(decimal_places as usize).render(false))
}

fn normalize(text: &str) -> Option<DecimalText> {
    let (decimal, scientific) = DecimalText::parse(text)?;
    if scientific {
        let mut decimal = decimal.round(SCIENTIFIC_PRECISION);
        decimal.trim_trailing_zeros();
        Some(decimal)
    } else {
        Some(decimal)
    }
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Sign plus decimal digits either side of the point.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DecimalText {
    negative: bool,
    /// No leading zeros; empty means zero.
    int: Vec<u8>,
    frac: Vec<u8>,
}

impl DecimalText {
    /// Parse plain or scientific notation. The flag reports whether an
    /// exponent was present.
    fn parse(input: &str) -> Option<(Self, bool)> {
        let s = input.trim();
        let (negative, unsigned) = match s.as_bytes().first()? {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let (mantissa, exponent, scientific) = match unsigned.find(['e', 'E']) {
            Some(pos) => {
                let exponent = unsigned[pos + 1..].parse::<i64>().ok()?;
                if exponent.abs() > MAX_EXPONENT {
                    return None;
                }
                (&unsigned[..pos], exponent, true)
            }
            None => (unsigned, 0, false),
        };

        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let digits: Vec<u8> = int_part
            .bytes()
            .chain(frac_part.bytes())
            .map(|b| b - b'0')
            .collect();
        let point = int_part.len() as i64 + exponent;

        let (int, frac) = if point <= 0 {
            let mut frac = vec![0; point.unsigned_abs() as usize];
            frac.extend(digits);
            (Vec::new(), frac)
        } else if point as usize >= digits.len() {
            let mut int = digits;
            int.resize(point as usize, 0);
            (int, Vec::new())
        } else {
            let (int, frac) = digits.split_at(point as usize);
            (int.to_vec(), frac.to_vec())
        };

        let decimal = Self {
            negative,
            int,
            frac,
        };
        Some((decimal.normalized(), scientific))
    }

    fn round(mut self, places: usize) -> Self {
        if self.frac.len() <= places {
            self.frac.resize(places, 0);
            return self.normalized();
        }

        let dropped = self.frac.split_off(places);
        let round_up = match dropped[0].cmp(&5) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => dropped[1..].iter().any(|&d| d != 0) || !self.negative,
        };
        if round_up {
            self.increment();
        }
        self.normalized()
    }

    /// Add one unit in the last kept place.
    fn increment(&mut self) {
        for digit in self.frac.iter_mut().rev().chain(self.int.iter_mut().rev()) {
            if *digit == 9 {
                *digit = 0;
            } else {
                *digit += 1;
                return;
            }
        }
        self.int.insert(0, 1);
    }

    fn trim_trailing_zeros(&mut self) {
        while self.frac.last() == Some(&0) {
            self.frac.pop();
        }
    }

    fn normalized(mut self) -> Self {
        let leading = self.int.iter().take_while(|&&d| d == 0).count();
        self.int.drain(..leading);
        if self.int.is_empty() && self.frac.iter().all(|&d| d == 0) {
            self.negative = false;
        }
        self
    }

    fn render(&self, grouped: bool) -> String {
        let int: String = if self.int.is_empty() {
            "0".to_string()
        } else {
            self.int.iter().map(|d| char::from(b'0' + d)).collect()
        };

        let mut out = String::new();
        if self.negative {
            out.push('-');
        }
        if grouped {
            out.push_str(&group_thousands(&int));
        } else {
            out.push_str(&int);
        }
        if !self.frac.is_empty() {
            out.push('.');
            out.extend(self.frac.iter().map(|d| char::from(b'0' + d)));
        }
        out
    }
}

/// Current prize values, all in the native unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrizeBreakdown {
    /// Whole pool, 5 fractional digits.
    pub total: String,
    pub first: String,
    pub second: String,
    pub third: String,
    pub rollover: String,
}

/// Split the live contract balance: 90% of the pool is paid out 50/25/25,
/// 10% rolls over to the next draw.
pub fn compute_prize_breakdown(balance_wei: U256) -> PrizeBreakdown {
    // 0.9 * 0.5 = 45/100, 0.9 * 0.25 = 225/1000, 0.10 = 1/10
    let share = |numerator: u64, denominator: u64| {
        fixed_units(
            mul_div_floor(balance_wei, U256::from(numerator), U256::from(denominator)),
            NATIVE_DECIMALS,
            4,
        )
    };

    PrizeBreakdown {
        total: fixed_units(balance_wei, NATIVE_DECIMALS, 5),
        first: share(45, 100),
        second: share(225, 1_000),
        third: share(225, 1_000),
        rollover: share(1, 10),
    }
}

/// `floor(value * numerator / denominator)` without overflow for
/// `numerator <= denominator`. The dropped remainder is under one wei, which
/// never moves a 4-place rounding boundary.
fn mul_div_floor(value: U256, numerator: U256, denominator: U256) -> U256 {
    let whole = value / denominator;
    let rest = value % denominator;
    whole * numerator + rest * numerator / denominator
}

fn fixed_units(value: U256, decimals: u8, places: u32) -> String {
    format_fixed(shift_decimal(value, decimals).as_str(), places).unwrap_or_else(|| "0".to_string())
}
