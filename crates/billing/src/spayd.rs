//! Czech bank accounts, IBAN conversion and SPAYD payment strings
//!
//! SPAYD ("Short Payment Descriptor") is the text encoded in Czech QR
//! payment codes, e.g.
//! `SPD*1.0*ACC:CZ6508000000192000145399*AM:250.00*CC:CZK*X-VS:202600001*DT:20260315*MSG:Faktura 2026-00001`.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use time::Date;

use crate::error::{BillingError, BillingResult};

const MAX_MESSAGE_LEN: usize = 60;
const MAX_VARIABLE_SYMBOL_LEN: usize = 10;

/// Domestic account in `[prefix-]number/bank` notation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CzechAccount {
    pub prefix: Option<String>,
    pub number: String,
    pub bank_code: String,
}

impl FromStr for CzechAccount {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BillingError::InvalidAccount(s.to_string());
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();

        let (account, bank_code) = compact.split_once('/').ok_or_else(invalid)?;
        let (prefix, number) = match account.split_once('-') {
            Some((p, n)) => (Some(p), n),
            None => (None, account),
        };

        let all_digits = |v: &str| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(number) || number.len() > 10 {
            return Err(invalid());
        }
        if bank_code.len() != 4 || !all_digits(bank_code) {
            return Err(invalid());
        }
        if let Some(p) = prefix {
            if !all_digits(p) || p.len() > 6 {
                return Err(invalid());
            }
        }

        Ok(Self {
            prefix: prefix.map(str::to_string),
            number: number.to_string(),
            bank_code: bank_code.to_string(),
        })
    }
}

impl fmt::Display for CzechAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}-{}/{}", prefix, self.number, self.bank_code),
            None => write!(f, "{}/{}", self.number, self.bank_code),
        }
    }
}

impl CzechAccount {
    /// Basic bank account number: bank code, 6-digit prefix, 10-digit number
    fn bban(&self) -> String {
        format!(
            "{}{:0>6}{:0>10}",
            self.bank_code,
            self.prefix.as_deref().unwrap_or(""),
            self.number
        )
    }

    pub fn to_iban(&self) -> String {
        let bban = self.bban();
        // "CZ00" moved to the end, letters as digits (C=12, Z=35)
        let check = 98 - mod97(&format!("{}123500", bban));
        format!("CZ{:02}{}", check, bban)
    }
}

/// Remainder of a decimal digit string modulo 97, processed digit by digit
fn mod97(digits: &str) -> u32 {
    digits
        .bytes()
        .filter(u8::is_ascii_digit)
        .fold(0u32, |acc, b| (acc * 10 + u32::from(b - b'0')) % 97)
}

/// ISO 13616 check: move the first four characters to the end, map letters to
/// numbers and require the result mod 97 to equal 1.
pub fn iban_checksum_valid(iban: &str) -> bool {
    let iban: String = iban.chars().filter(|c| !c.is_whitespace()).collect();
    if iban.len() < 5 || !iban.is_ascii() {
        return false;
    }

    let (head, tail) = iban.split_at(4);
    let mut numeric = String::with_capacity(iban.len() * 2);
    for c in tail.chars().chain(head.chars()) {
        match c {
            '0'..='9' => numeric.push(c),
            'A'..='Z' | 'a'..='z' => {
                let value = c.to_ascii_uppercase() as u32 - 'A' as u32 + 10;
                numeric.push_str(&value.to_string());
            }
            _ => return false,
        }
    }
    mod97(&numeric) == 1
}

/// Builder for a SPAYD payment string
#[derive(Debug, Clone)]
pub struct Spayd {
    iban: String,
    amount: Decimal,
    currency: String,
    variable_symbol: Option<String>,
    due_date: Option<Date>,
    message: Option<String>,
}

impl Spayd {
    pub fn new(account: &CzechAccount, amount: Decimal, currency: &str) -> Self {
        Self {
            iban: account.to_iban(),
            amount,
            currency: currency.to_ascii_uppercase(),
            variable_symbol: None,
            due_date: None,
            message: None,
        }
    }

    /// Non-digits are dropped; symbols longer than 10 digits are rejected.
    pub fn variable_symbol(mut self, vs: &str) -> BillingResult<Self> {
        let digits: String = vs.chars().filter(char::is_ascii_digit).collect();
        if digits.len() > MAX_VARIABLE_SYMBOL_LEN {
            return Err(BillingError::InvalidInput(format!(
                "variable symbol too long: {}",
                vs
            )));
        }
        if !digits.is_empty() {
            self.variable_symbol = Some(digits);
        }
        Ok(self)
    }

    pub fn due_date(mut self, date: Date) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn message(mut self, msg: &str) -> Self {
        let trimmed: String = msg.trim().chars().take(MAX_MESSAGE_LEN).collect();
        if !trimmed.is_empty() {
            self.message = Some(trimmed);
        }
        self
    }

    pub fn build(&self) -> String {
        let mut amount = self
            .amount
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        amount.rescale(2);

        let mut out = format!(
            "SPD*1.0*ACC:{}*AM:{}*CC:{}",
            self.iban,
            amount,
            escape(&self.currency)
        );
        if let Some(vs) = &self.variable_symbol {
            out.push_str(&format!("*X-VS:{}", vs));
        }
        if let Some(date) = self.due_date {
            out.push_str(&format!(
                "*DT:{:04}{:02}{:02}",
                date.year(),
                u8::from(date.month()),
                date.day()
            ));
        }
        if let Some(msg) = &self.message {
            out.push_str(&format!("*MSG:{}", escape(msg)));
        }
        out
    }
}

fn escape(value: &str) -> String {
    value.replace('*', "%2A")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::macros::date;

    #[test]
    fn test_parse_account_with_prefix() {
        let acc: CzechAccount = "19-123456/0800".parse().unwrap();
        assert_eq!(acc.prefix.as_deref(), Some("19"));
        assert_eq!(acc.number, "123456");
        assert_eq!(acc.bank_code, "0800");
        assert_eq!(acc.to_string(), "19-123456/0800");
    }

    #[test]
    fn test_parse_account_rejects_garbage() {
        for bad in ["123456", "123456/80", "abc/0800", "1234567-1/0800", "12345678901/0800"] {
            assert!(bad.parse::<CzechAccount>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_iban_for_prefixed_account_is_valid() {
        let acc: CzechAccount = "19-123456/0800".parse().unwrap();
        let iban = acc.to_iban();
        assert!(iban.starts_with("CZ"));
        assert_eq!(iban.len(), 24);
        assert!(iban.ends_with("08000000190000123456"));
        assert!(iban_checksum_valid(&iban));
    }

    #[test]
    fn test_iban_known_value() {
        let acc: CzechAccount = "19-2000145399/0800".parse().unwrap();
        assert_eq!(acc.to_iban(), "CZ6508000000192000145399");
    }

    #[test]
    fn test_iban_checksum_detects_typo() {
        assert!(iban_checksum_valid("CZ65 0800 0000 1920 0014 5399"));
        assert!(!iban_checksum_valid("CZ6508000000192000145398"));
        assert!(!iban_checksum_valid("CZ"));
    }

    #[test]
    fn test_spayd_string() {
        let acc: CzechAccount = "19-2000145399/0800".parse().unwrap();
        let spayd = Spayd::new(&acc, dec!(250), "czk")
            .variable_symbol("2026-00001")
            .unwrap()
            .due_date(date!(2026 - 03 - 15))
            .message("Faktura 2026-00001")
            .build();
        assert_eq!(
            spayd,
            "SPD*1.0*ACC:CZ6508000000192000145399*AM:250.00*CC:CZK*X-VS:202600001*DT:20260315*MSG:Faktura 2026-00001"
        );
    }

    #[test]
    fn test_spayd_escapes_and_truncates_message() {
        let acc: CzechAccount = "123456/0100".parse().unwrap();
        let long = format!("a*b{}", "x".repeat(100));
        let spayd = Spayd::new(&acc, dec!(1.005), "CZK").message(&long).build();
        assert!(spayd.contains("*AM:1.01*"));
        let msg = spayd.split("*MSG:").nth(1).unwrap();
        assert!(msg.starts_with("a%2Ab"));
        assert_eq!(msg.replace("%2A", "*").chars().count(), 60);
    }

    #[test]
    fn test_variable_symbol_too_long() {
        let acc: CzechAccount = "123456/0100".parse().unwrap();
        assert!(Spayd::new(&acc, dec!(1), "CZK")
            .variable_symbol("12345678901")
            .is_err());
    }
}
