//! RUC (Peruvian taxpayer id) validation.
//!
//! A RUC is 11 digits: a two-digit taxpayer-type prefix, eight body digits and
//! a mod-11 check digit. This is checked locally before any remote lookup.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use treevu_core::TreevuError;

static RUC_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(10|15|16|17|20)[0-9]{9}$").expect("valid RUC regex"));

const WEIGHTS: [u32; 10] = [5, 4, 3, 2, 7, 6, 5, 4, 3, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RucKind {
    /// Prefix 10: natural person with business income
    Person,
    /// Prefix 20: company
    Company,
    /// Prefixes 15/16/17: special registrations
    Other,
}

/// A RUC that passed format and check-digit validation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ruc(String);

impl Ruc {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> RucKind {
        match &self.0[..2] {
            "10" => RucKind::Person,
            "20" => RucKind::Company,
            _ => RucKind::Other,
        }
    }
}

impl fmt::Display for Ruc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_digit(body: &[u32]) -> u32 {
    let sum: u32 = body.iter().zip(WEIGHTS).map(|(d, w)| d * w).sum();
    match 11 - (sum % 11) {
        10 => 0,
        11 => 1,
        d => d,
    }
}

/// Validate a RUC, tolerating surrounding whitespace and inner spaces/dashes.
pub fn validate_ruc(input: &str) -> Result<Ruc, TreevuError> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if !RUC_FORMAT.is_match(&cleaned) {
        return Err(TreevuError::InvalidRuc(input.trim().to_string()));
    }

    let digits: Vec<u32> = cleaned.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 11 || check_digit(&digits[..10]) != digits[10] {
        return Err(TreevuError::InvalidRuc(input.trim().to_string()));
    }
    Ok(Ruc(cleaned))
}
