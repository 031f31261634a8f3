// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes resource quantities compared by value.
//!
//! The API server stores quantities in canonical form, so what is read back
//! rarely matches the spelling in a `Database` spec: `1024Mi` comes back as
//! `1Gi` and `0.5` as `500m`. Drift checks compare the parsed values instead.
//!
//! Supported forms: an optionally signed decimal number followed by a binary
//! suffix (`Ki`..`Ei`), a decimal suffix (`n`, `u`, `m`, `k`, `M`, `G`, `T`,
//! `P`, `E`) or a decimal exponent (`1e3`, `5E-1`).

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 1),
    ("Mi", 2),
    ("Gi", 3),
    ("Ti", 4),
    ("Pi", 5),
    ("Ei", 6),
];

const DECIMAL_SUFFIXES: [(&str, i32); 9] = [
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

/// The exact value of a quantity as `mantissa * 10^exponent`.
///
/// Trailing zeros are folded into the exponent, so two spellings of the same
/// value compare equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedQuantity {
    negative: bool,
    mantissa: u128,
    exponent: i32,
}

impl ParsedQuantity {
    /// Parse a quantity string. Returns `None` when it is not a quantity or
    /// does not fit the exact representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (negative, unsigned) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value.strip_prefix('+').unwrap_or(value)),
        };

        let (number, binary_power, mut exponent) = split_suffix(unsigned)?;
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && fraction.is_empty()) || number.ends_with('.') {
            return None;
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let mut mantissa: u128 = 0;
        for digit in whole.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)?
                .checked_add(u128::from(digit - b'0'))?;
        }
        exponent = exponent.checked_sub(i32::try_from(fraction.len()).ok()?)?;
        mantissa = mantissa.checked_mul(1024_u128.checked_pow(binary_power)?)?;

        Some(Self::normalized(negative, mantissa, exponent))
    }

    fn normalized(negative: bool, mut mantissa: u128, mut exponent: i32) -> Self {
        if mantissa == 0 {
            return Self {
                negative: false,
                mantissa: 0,
                exponent: 0,
            };
        }
        while mantissa % 10 == 0 {
            mantissa /= 10;
            exponent = exponent.saturating_add(1);
        }
        Self {
            negative,
            mantissa,
            exponent,
        }
    }
}

/// Split a quantity into its number, binary power and decimal exponent.
fn split_suffix(value: &str) -> Option<(&str, u32, i32)> {
    for (suffix, power) in BINARY_SUFFIXES {
        if let Some(number) = value.strip_suffix(suffix) {
            return Some((number, power, 0));
        }
    }

    // `1e3` is an exponent, a trailing `E` alone is the exa suffix
    if let Some(pos) = value.find(['e', 'E']) {
        let (number, rest) = value.split_at(pos);
        let digits = &rest[1..];
        if !digits.is_empty() {
            return Some((number, 0, digits.parse().ok()?));
        }
    }

    for (suffix, exponent) in DECIMAL_SUFFIXES {
        if let Some(number) = value.strip_suffix(suffix) {
            return Some((number, 0, exponent));
        }
    }

    Some((value, 0, 0))
}

/// Whether two quantity strings denote the same value.
///
/// Strings that do not parse are compared as written.
#[must_use]
pub fn quantities_equal(a: &str, b: &str) -> bool {
    match (ParsedQuantity::parse(a), ParsedQuantity::parse(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

/// Whether two resource lists (`limits` or `requests`) hold the same values.
///
/// A missing list and an empty one are the same.
#[must_use]
pub fn resource_lists_equal(
    a: Option<&BTreeMap<String, Quantity>>,
    b: Option<&BTreeMap<String, Quantity>>,
) -> bool {
    let empty = BTreeMap::new();
    let a = a.unwrap_or(&empty);
    let b = b.unwrap_or(&empty);

    a.len() == b.len()
        && a.iter().all(|(name, quantity)| {
            b.get(name)
                .is_some_and(|other| quantities_equal(&quantity.0, &other.0))
        })
}

#[cfg(test)]
#[path = "quantity_tests.rs"]
mod quantity_tests;
