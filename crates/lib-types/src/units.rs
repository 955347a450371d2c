//! Physical units and engineering-notation numbers.
//!
//! The newtypes keep deck and model-file rendering honest about what a
//! number means. [`parse_number`] is the single entry point for reading
//! numeric tokens out of model-description files, netlists and
//! configuration strings.
//!
//! # Recognized number forms
//!
//! Checked in this order:
//!
//! 1. `NA` (any case) is not-a-number.
//! 2. A token ending in `meg` (any case) is the prefix times `1e6`.
//! 3. A plain float or exponential literal.
//! 4. A float followed by an optional SI scale (`f p n u m k K M G T`) and an
//!    optional unit letter (`V A S`). The unit letter carries no scaling.
//!
//! Scale letters are case-sensitive: `m` is milli and `M` is mega.

use nom::{
    character::complete::one_of,
    combinator::{all_consuming, map, map_res, opt},
    number::complete::recognize_float,
    IResult, Parser,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Time in seconds.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Seconds(pub f64);

impl Seconds {
    #[inline]
    pub fn from_ps(ps: f64) -> Self {
        Self(ps * 1e-12)
    }

    #[inline]
    pub fn from_ns(ns: f64) -> Self {
        Self(ns * 1e-9)
    }
}

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_si(self.0))
    }
}

/// Voltage in Volts.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Volts(pub f64);

impl fmt::Display for Volts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_si(self.0))
    }
}

/// Resistance in Ohms.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Ohms(pub f64);

impl fmt::Display for Ohms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_si(self.0))
    }
}

/// A token that is not a recognizable engineering-notation number.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Invalid number: '{token}'")]
pub struct NumberFormatError {
    pub token: String,
}

impl NumberFormatError {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

/// Parse an engineering-notation token such as `87.88mA`, `1.2meg` or `NA`.
pub fn parse_number(token: &str) -> Result<f64, NumberFormatError> {
    let token = token.trim();

    if token.eq_ignore_ascii_case("na") {
        return Ok(f64::NAN);
    }

    let lower = token.to_ascii_lowercase();
    if let Some(prefix) = lower.strip_suffix("meg") {
        return all_consuming(mantissa)
            .parse(&token[..prefix.len()])
            .map(|(_, value)| value * 1e6)
            .map_err(|_| NumberFormatError::new(token));
    }

    all_consuming(scaled_number)
        .parse(token)
        .map(|(_, value)| value)
        .map_err(|_| NumberFormatError::new(token))
}

/// Whether [`parse_number`] would accept `token`.
pub fn is_number(token: &str) -> bool {
    parse_number(token).is_ok()
}

fn mantissa(input: &str) -> IResult<&str, f64> {
    map_res(recognize_float, str::parse::<f64>).parse(input)
}

fn si_scale(input: &str) -> IResult<&str, f64> {
    map(one_of("fpnumkKMGT"), scale_factor).parse(input)
}

fn scale_factor(letter: char) -> f64 {
    match letter {
        'f' => 1e-15,
        'p' => 1e-12,
        'n' => 1e-9,
        'u' => 1e-6,
        'm' => 1e-3,
        'k' | 'K' => 1e3,
        'M' => 1e6,
        'G' => 1e9,
        'T' => 1e12,
        _ => 1.0,
    }
}

fn scaled_number(input: &str) -> IResult<&str, f64> {
    let (input, value) = mantissa(input)?;
    let (input, scale) = opt(si_scale).parse(input)?;
    let (input, _unit) = opt(one_of("VAS")).parse(input)?;
    Ok((input, value * scale.unwrap_or(1.0)))
}

const SI_PREFIXES: [(f64, &str); 10] = [
    (1e12, "T"),
    (1e9, "G"),
    (1e6, "meg"),
    (1e3, "k"),
    (1.0, ""),
    (1e-3, "m"),
    (1e-6, "u"),
    (1e-9, "n"),
    (1e-12, "p"),
    (1e-15, "f"),
];

/// Format a value with an SI prefix that both SPICE and [`parse_number`] read back.
///
/// Mega is written `meg` since SPICE reads `M` as milli. Not-a-number is
/// written `NA`.
pub fn format_si(value: f64) -> String {
    if value.is_nan() {
        return "NA".to_string();
    }
    if value == 0.0 || !value.is_finite() {
        return format!("{}", value);
    }

    let magnitude = value.abs();
    let (scale, suffix) = SI_PREFIXES
        .iter()
        .copied()
        .find(|(scale, _)| magnitude >= *scale * (1.0 - 1e-9))
        .unwrap_or((1e-15, "f"));

    let text = format!("{:.4}", value / scale);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", text, suffix)
}
