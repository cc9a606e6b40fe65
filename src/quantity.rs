//! Kubernetes resource quantity arithmetic.
//!
//! `Quantity` from k8s-openapi is an opaque string. Storage and memory checks
//! need to order quantities, so they are parsed into an exact integer count of
//! thousandths of the base unit.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;

/// Error returned for strings that are not valid quantities.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid quantity '{0}'")]
pub struct QuantityError(pub String);

/// A parsed quantity, in thousandths of the base unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MilliValue(i128);

impl MilliValue {
    pub const ZERO: MilliValue = MilliValue(0);

    /// Build from a whole number of base units (bytes, cores).
    pub const fn from_units(units: i128) -> Self {
        Self(units * 1000)
    }

    pub fn millis(&self) -> i128 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for MilliValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 1000 == 0 {
            write!(f, "{}", self.0 / 1000)
        } else {
            write!(f, "{}m", self.0)
        }
    }
}

/// Parse a quantity string such as `1Gi`, `500m`, `1.5G` or `2e3`.
pub fn parse_str(input: &str) -> Result<MilliValue, QuantityError> {
    static QUANTITY_RE: LazyLock<Option<regex::Regex>> = LazyLock::new(|| {
        regex::Regex::new(
            r"^([+-]?)([0-9]+)(?:\.([0-9]*))?(Ki|Mi|Gi|Ti|Pi|Ei|n|u|m|k|M|G|T|P|E|[eE][+-]?[0-9]+)?$",
        )
        .ok()
    });

    let err = || QuantityError(input.to_string());
    let caps = QUANTITY_RE
        .as_ref()
        .and_then(|re| re.captures(input))
        .ok_or_else(err)?;

    let negative = caps.get(1).is_some_and(|m| m.as_str() == "-");
    let whole = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let fraction = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
    let suffix = caps.get(4).map(|m| m.as_str()).unwrap_or_default();

    // Bound the digit count so that every intermediate fits in an i128.
    if whole.len() + fraction.len() > 24 {
        return Err(err());
    }
    let digits: i128 = format!("{whole}{fraction}").parse().map_err(|_| err())?;
    let fraction_scale = pow10(fraction.len() as u32).ok_or_else(err)?;

    let (num, den) = multiplier(suffix).ok_or_else(err)?;
    let value = digits
        .checked_mul(num)
        .and_then(|v| v.checked_mul(1000))
        .ok_or_else(err)?
        / fraction_scale
        / den;

    Ok(MilliValue(if negative { -value } else { value }))
}

/// Parse a k8s-openapi `Quantity`.
pub fn parse(quantity: &Quantity) -> Result<MilliValue, QuantityError> {
    parse_str(&quantity.0)
}

/// Compare two quantities numerically. Unparseable input compares as `None`.
pub fn compare(a: &Quantity, b: &Quantity) -> Option<Ordering> {
    Some(parse(a).ok()?.cmp(&parse(b).ok()?))
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

fn multiplier(suffix: &str) -> Option<(i128, i128)> {
    const KI: i128 = 1024;
    Some(match suffix {
        "" => (1, 1),
        "Ki" => (KI, 1),
        "Mi" => (KI.pow(2), 1),
        "Gi" => (KI.pow(3), 1),
        "Ti" => (KI.pow(4), 1),
        "Pi" => (KI.pow(5), 1),
        "Ei" => (KI.pow(6), 1),
        "n" => (1, 1_000_000_000),
        "u" => (1, 1_000_000),
        "m" => (1, 1_000),
        "k" => (1_000, 1),
        "M" => (1_000_000, 1),
        "G" => (1_000_000_000, 1),
        "T" => (pow10(12)?, 1),
        "P" => (pow10(15)?, 1),
        "E" => (pow10(18)?, 1),
        exp => {
            let power: i32 = exp.get(1..)?.parse().ok()?;
            if power >= 0 {
                (pow10(power.unsigned_abs())?, 1)
            } else {
                (1, pow10(power.unsigned_abs())?)
            }
        }
    })
}
