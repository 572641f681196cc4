//! Invoice numbering (`YYYY-NNNNN`)
//!
//! Numbers are assigned when a draft is sent. The sequence is per user and per
//! calendar year of the issue date, continuing from the highest number already
//! used by any non-deleted invoice of that year (canceled ones included, so a
//! storno never frees its number for reuse).

use std::fmt;
use std::str::FromStr;

use crate::error::{BillingError, BillingResult};

/// Highest sequence that fits the five-digit suffix
pub const MAX_SEQUENCE: u32 = 99_999;

/// Parsed invoice number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InvoiceNumber {
    pub year: i32,
    pub sequence: u32,
}

impl InvoiceNumber {
    pub fn new(year: i32, sequence: u32) -> BillingResult<Self> {
        if !(1000..=9999).contains(&year) || sequence == 0 || sequence > MAX_SEQUENCE {
            return Err(BillingError::InvalidInvoiceNumber(format!(
                "{:04}-{:05}",
                year, sequence
            )));
        }
        Ok(Self { year, sequence })
    }

    /// Digits only, used as the payment variable symbol (`2026-00012` -> `202600012`)
    pub fn variable_symbol(&self) -> String {
        format!("{:04}{:05}", self.year, self.sequence)
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:05}", self.year, self.sequence)
    }
}

impl FromStr for InvoiceNumber {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BillingError::InvalidInvoiceNumber(s.to_string());

        let (year, seq) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4
            || seq.len() != 5
            || !year.bytes().all(|b| b.is_ascii_digit())
            || !seq.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let year: i32 = year.parse().map_err(|_| invalid())?;
        let sequence: u32 = seq.parse().map_err(|_| invalid())?;
        Self::new(year, sequence).map_err(|_| invalid())
    }
}

/// Next number for `year` given every number already used by the user.
///
/// Numbers from other years and unparseable legacy values are ignored.
pub fn next_invoice_number<'a, I>(year: i32, existing: I) -> BillingResult<InvoiceNumber>
where
    I: IntoIterator<Item = &'a str>,
{
    let highest = existing
        .into_iter()
        .filter_map(|n| n.parse::<InvoiceNumber>().ok())
        .filter(|n| n.year == year)
        .map(|n| n.sequence)
        .max()
        .unwrap_or(0);

    if highest >= MAX_SEQUENCE {
        return Err(BillingError::NumberSequenceExhausted(year));
    }
    InvoiceNumber::new(year, highest + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_is_zero_padded() {
        let n = InvoiceNumber::new(2026, 7).unwrap();
        assert_eq!(n.to_string(), "2026-00007");
        assert_eq!(n.variable_symbol(), "202600007");
    }

    #[test]
    fn test_parse_accepts_exact_format_only() {
        assert_eq!(
            "2026-00042".parse::<InvoiceNumber>().unwrap(),
            InvoiceNumber {
                year: 2026,
                sequence: 42
            }
        );
        for bad in ["2026-42", "26-00042", "2026/00042", "2026-0004x", "2026-00000", ""] {
            assert!(bad.parse::<InvoiceNumber>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_first_number_of_year() {
        let next = next_invoice_number(2026, std::iter::empty()).unwrap();
        assert_eq!(next.to_string(), "2026-00001");
    }

    #[test]
    fn test_continues_from_highest_in_same_year() {
        let existing = ["2025-00120", "2026-00003", "2026-00011", "legacy-7"];
        let next = next_invoice_number(2026, existing).unwrap();
        assert_eq!(next.to_string(), "2026-00012");
    }

    #[test]
    fn test_new_year_restarts_sequence() {
        let existing = ["2025-00120"];
        let next = next_invoice_number(2026, existing).unwrap();
        assert_eq!(next.sequence, 1);
    }

    #[test]
    fn test_sequence_exhausted() {
        let existing = ["2026-99999"];
        assert!(matches!(
            next_invoice_number(2026, existing),
            Err(BillingError::NumberSequenceExhausted(2026))
        ));
    }
}
