//! Fixed-point simulation time.
//!
//! A [`TimeValue`] is a signed 64-bit count of ticks. The tick length is
//! `10^scale_exp` seconds, where the scale exponent is a process-wide setting
//! that must be chosen before any time value is created. Once chosen it is
//! fixed for the life of the process.

use crate::core::errors::SimError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use std::sync::atomic::{AtomicI32, Ordering};

const SCALE_UNSET: i32 = i32::MIN;

static SCALE_EXP: AtomicI32 = AtomicI32::new(SCALE_UNSET);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeValue(i64);

impl TimeValue {
    pub const ZERO: TimeValue = TimeValue(0);
    pub const MAX: TimeValue = TimeValue(i64::MAX);
    pub const DEFAULT_SCALE_EXP: i32 = -12;
    pub const MIN_SCALE_EXP: i32 = -18;
    pub const MAX_SCALE_EXP: i32 = 0;

    /// Current scale exponent (tick = 10^exp seconds)
    pub fn scale_exp() -> i32 {
        match SCALE_EXP.load(Ordering::Acquire) {
            SCALE_UNSET => Self::DEFAULT_SCALE_EXP,
            exp => exp,
        }
    }

    /// Fix the scale exponent. The first call decides; later calls succeed
    /// only if they ask for the same exponent, since existing values would
    /// silently change meaning otherwise.
    pub fn set_scale_exp(exp: i32) -> Result<(), SimError> {
        if !(Self::MIN_SCALE_EXP..=Self::MAX_SCALE_EXP).contains(&exp) {
            return Err(SimError::Config(format!(
                "time scale exponent {} out of range [{}, {}]",
                exp,
                Self::MIN_SCALE_EXP,
                Self::MAX_SCALE_EXP
            )));
        }
        match SCALE_EXP.compare_exchange(SCALE_UNSET, exp, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => Ok(()),
            Err(current) if current == exp => Ok(()),
            Err(current) => Err(SimError::Config(format!(
                "time scale exponent is already {}, cannot change it to {}",
                current, exp
            ))),
        }
    }

    /// Ticks per second under the current scale
    pub fn ticks_per_second() -> i64 {
        10i64.pow((-Self::scale_exp()) as u32)
    }

    pub const fn from_raw(ticks: i64) -> Self {
        TimeValue(ticks)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    /// `value * 10^unit_exp` seconds; errors on overflow or when the value is
    /// finer than the current resolution.
    pub fn from_units(value: i64, unit_exp: i32) -> Result<Self, SimError> {
        Self::from_scaled(value as i128, 1, unit_exp)
    }

    /// Whole seconds; saturates at the representable range.
    pub fn from_secs(secs: i64) -> Self {
        TimeValue(secs.saturating_mul(Self::ticks_per_second()))
    }

    /// Milliseconds; truncated when the resolution is coarser than 1ms.
    pub fn from_millis(ms: i64) -> Self {
        Self::from_sub_second(ms, -3)
    }

    pub fn from_micros(us: i64) -> Self {
        Self::from_sub_second(us, -6)
    }

    pub fn from_nanos(ns: i64) -> Self {
        Self::from_sub_second(ns, -9)
    }

    fn from_sub_second(value: i64, unit_exp: i32) -> Self {
        let diff = unit_exp - Self::scale_exp();
        if diff >= 0 {
            TimeValue(value.saturating_mul(10i64.pow(diff as u32)))
        } else {
            TimeValue(value / 10i64.pow((-diff) as u32))
        }
    }

    /// Lossy conversion from floating-point seconds
    pub fn from_secs_f64(secs: f64) -> Result<Self, SimError> {
        if !secs.is_finite() {
            return Err(SimError::runtime(format!("cannot convert {} to simulation time", secs)));
        }
        let ticks = (secs * Self::ticks_per_second() as f64).round();
        if ticks >= i64::MAX as f64 || ticks <= i64::MIN as f64 {
            return Err(SimError::runtime(format!(
                "{}s is out of the representable simulation time range",
                secs
            )));
        }
        Ok(TimeValue(ticks as i64))
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / Self::ticks_per_second() as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: TimeValue) -> Option<TimeValue> {
        self.0.checked_add(other.0).map(TimeValue)
    }

    pub fn checked_sub(self, other: TimeValue) -> Option<TimeValue> {
        self.0.checked_sub(other.0).map(TimeValue)
    }

    pub fn saturating_add(self, other: TimeValue) -> TimeValue {
        TimeValue(self.0.saturating_add(other.0))
    }

    /// Parse a time literal: a plain number of seconds ("1.5"), or one or
    /// more number-unit terms ("20ms", "1h 30min", "1s200ms").
    ///
    /// Supported units: d, h, min, s, ms, us, ns, ps, fs, as.
    pub fn parse(text: &str) -> Result<Self, SimError> {
        let input = text.trim();
        if input.is_empty() {
            return Err(parse_error(text, "empty string"));
        }
        let (negative, mut rest) = match input.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, input.strip_prefix('+').unwrap_or(input)),
        };
        let mut total: i128 = 0;
        let mut terms = 0;
        let mut unitless = false;
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }
            let num_len = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(rest.len());
            if num_len == 0 {
                return Err(parse_error(text, "number expected"));
            }
            let (mantissa, frac_digits) = parse_decimal(&rest[..num_len])
                .ok_or_else(|| parse_error(text, "malformed number"))?;
            rest = &rest[num_len..];
            let unit_len = rest
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(rest.len());
            let unit = &rest[..unit_len];
            rest = &rest[unit_len..];
            let (multiplier, unit_exp) = if unit.is_empty() {
                unitless = true;
                (1, 0)
            } else {
                unit_factor(unit).ok_or_else(|| parse_error(text, &format!("unknown unit '{}'", unit)))?
            };
            let term = Self::from_scaled(mantissa, multiplier, unit_exp - frac_digits as i32)
                .map_err(|e| parse_error(text, &e.to_string()))?;
            total = total
                .checked_add(term.0 as i128)
                .ok_or_else(|| parse_error(text, "overflow"))?;
            terms += 1;
        }
        if unitless && terms > 1 {
            return Err(parse_error(text, "missing unit"));
        }
        if negative {
            total = -total;
        }
        i64::try_from(total)
            .map(TimeValue)
            .map_err(|_| parse_error(text, "out of range"))
    }

    fn from_scaled(mantissa: i128, multiplier: i128, exp: i32) -> Result<Self, SimError> {
        let diff = exp - Self::scale_exp();
        let value = mantissa
            .checked_mul(multiplier)
            .ok_or_else(|| SimError::runtime("time value overflow"))?;
        let ticks = if diff >= 0 {
            10i128
                .checked_pow(diff as u32)
                .and_then(|f| value.checked_mul(f))
                .ok_or_else(|| SimError::runtime("time value overflow"))?
        } else {
            let div = 10i128
                .checked_pow((-diff) as u32)
                .ok_or_else(|| SimError::runtime("time value below resolution"))?;
            if value % div != 0 {
                return Err(SimError::runtime(format!(
                    "value cannot be represented exactly with resolution 1e{}s",
                    Self::scale_exp()
                )));
            }
            value / div
        };
        i64::try_from(ticks)
            .map(TimeValue)
            .map_err(|_| SimError::runtime("time value overflow"))
    }
}

fn parse_error(text: &str, why: &str) -> SimError {
    SimError::runtime(format!("cannot parse time '{}': {}", text, why))
}

fn parse_decimal(s: &str) -> Option<(i128, usize)> {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() || frac_part.contains('.') {
        return None;
    }
    let digits = format!("{}{}", int_part, frac_part);
    let mantissa = digits.parse::<i128>().ok()?;
    Some((mantissa, frac_part.len()))
}

fn unit_factor(unit: &str) -> Option<(i128, i32)> {
    Some(match unit {
        "d" => (86_400, 0),
        "h" => (3_600, 0),
        "min" => (60, 0),
        "s" => (1, 0),
        "ms" => (1, -3),
        "us" => (1, -6),
        "ns" => (1, -9),
        "ps" => (1, -12),
        "fs" => (1, -15),
        "as" => (1, -18),
        _ => return None,
    })
}

impl fmt::Display for TimeValue {
    /// Decimal seconds without trailing zeros, e.g. `0.0015` or `20`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = (-Self::scale_exp()) as usize;
        let scale = Self::ticks_per_second() as i128;
        let raw = self.0 as i128;
        let sign = if raw < 0 { "-" } else { "" };
        let abs = raw.abs();
        let int_part = abs / scale;
        let frac = abs % scale;
        if frac == 0 || digits == 0 {
            return write!(f, "{}{}", sign, int_part);
        }
        let frac_str = format!("{:0width$}", frac, width = digits);
        write!(f, "{}{}.{}", sign, int_part, frac_str.trim_end_matches('0'))
    }
}

impl FromStr for TimeValue {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeValue::parse(s)
    }
}

impl Add for TimeValue {
    type Output = TimeValue;

    fn add(self, rhs: TimeValue) -> TimeValue {
        TimeValue(self.0 + rhs.0)
    }
}

impl AddAssign for TimeValue {
    fn add_assign(&mut self, rhs: TimeValue) {
        self.0 += rhs.0;
    }
}

impl Sub for TimeValue {
    type Output = TimeValue;

    fn sub(self, rhs: TimeValue) -> TimeValue {
        TimeValue(self.0 - rhs.0)
    }
}

impl SubAssign for TimeValue {
    fn sub_assign(&mut self, rhs: TimeValue) {
        self.0 -= rhs.0;
    }
}

impl Neg for TimeValue {
    type Output = TimeValue;

    fn neg(self) -> TimeValue {
        TimeValue(-self.0)
    }
}

impl Mul<i64> for TimeValue {
    type Output = TimeValue;

    fn mul(self, rhs: i64) -> TimeValue {
        TimeValue(self.0 * rhs)
    }
}

impl Div<i64> for TimeValue {
    type Output = TimeValue;

    fn div(self, rhs: i64) -> TimeValue {
        TimeValue(self.0 / rhs)
    }
}
