//! Line item validation and invoice totals

use rust_decimal::{Decimal, RoundingStrategy};
use time::{Date, Duration};

use crate::error::{BillingError, BillingResult};
use crate::models::InvoiceItemInput;

/// Default unit for items submitted without one
pub const DEFAULT_UNIT: &str = "ks";

const MAX_DESCRIPTION_LEN: usize = 500;

/// Scales of `invoice_items.quantity` NUMERIC(12,3) and `unit_price` NUMERIC(14,2)
const QUANTITY_SCALE: u32 = 3;
const PRICE_SCALE: u32 = 2;

/// Largest values those columns (and `invoices.total_amount`) can hold
/// 999 999 999.999
const MAX_QUANTITY: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 3);
/// 999 999 999 999.99
const MAX_AMOUNT: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

fn round_to(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// `None` when the product does not fit in a `Decimal`
pub fn line_total(quantity: Decimal, unit_price: Decimal) -> Option<Decimal> {
    quantity.checked_mul(unit_price)
}

/// Sum of `quantity * unit_price`, rounded to hellers (2 dp, half away from zero).
/// Expects items that went through [`normalize_items`].
pub fn invoice_total(items: &[InvoiceItemInput]) -> BillingResult<Decimal> {
    let sum = items
        .iter()
        .try_fold(Decimal::ZERO, |acc, i| {
            line_total(i.quantity, i.unit_price).and_then(|line| acc.checked_add(line))
        })
        .ok_or_else(|| BillingError::InvalidInput("invoice total is out of range".to_string()))?;

    let total = round_to(sum, PRICE_SCALE);
    if total > MAX_AMOUNT {
        return Err(BillingError::InvalidInput(
            "invoice total is out of range".to_string(),
        ));
    }
    Ok(total)
}

pub fn due_date(issue_date: Date, days: i32) -> Date {
    issue_date.saturating_add(Duration::days(i64::from(days)))
}

/// Validate items and round quantity and unit price to the precision they are
/// stored with, so the total always matches the persisted rows.
pub fn normalize_items(items: &[InvoiceItemInput]) -> BillingResult<Vec<InvoiceItemInput>> {
    let mut normalized = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let row = idx + 1;
        let description = item.description.trim();
        if description.is_empty() {
            return Err(BillingError::InvalidInput(format!(
                "item {}: description is required",
                row
            )));
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(BillingError::InvalidInput(format!(
                "item {}: description is too long",
                row
            )));
        }

        let quantity = round_to(item.quantity, QUANTITY_SCALE);
        let unit_price = round_to(item.unit_price, PRICE_SCALE);

        if quantity <= Decimal::ZERO {
            return Err(BillingError::InvalidInput(format!(
                "item {}: quantity must be positive",
                row
            )));
        }
        if quantity > MAX_QUANTITY {
            return Err(BillingError::InvalidInput(format!(
                "item {}: quantity is too large",
                row
            )));
        }
        if unit_price < Decimal::ZERO {
            return Err(BillingError::InvalidInput(format!(
                "item {}: unit price cannot be negative",
                row
            )));
        }
        if unit_price > MAX_AMOUNT {
            return Err(BillingError::InvalidInput(format!(
                "item {}: unit price is too large",
                row
            )));
        }

        normalized.push(InvoiceItemInput {
            description: description.to_string(),
            quantity,
            unit_price,
            unit: item.unit.clone(),
        });
    }
    Ok(normalized)
}

pub fn validate_currency(currency: &str) -> BillingResult<String> {
    let code = currency.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(BillingError::InvalidInput(format!(
            "invalid currency code: {}",
            currency
        )));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn item(quantity: Decimal, unit_price: Decimal) -> InvoiceItemInput {
        InvoiceItemInput {
            description: "Práce".to_string(),
            quantity,
            unit_price,
            unit: None,
        }
    }

    #[test]
    fn test_total_of_two_lines() {
        let items = vec![item(dec!(2), dec!(100)), item(dec!(1), dec!(50))];
        assert_eq!(invoice_total(&items).unwrap(), dec!(250));
    }

    #[test]
    fn test_total_rounds_half_away_from_zero() {
        let items = vec![item(dec!(0.5), dec!(0.01))];
        assert_eq!(invoice_total(&items).unwrap(), dec!(0.01));
        let items = vec![item(dec!(1.5), dec!(33.33))];
        assert_eq!(invoice_total(&items).unwrap(), dec!(50.00));
    }

    #[test]
    fn test_empty_total_is_zero() {
        assert_eq!(invoice_total(&[]).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_column_limits_match_schema() {
        assert_eq!(MAX_QUANTITY, dec!(999999999.999));
        assert_eq!(MAX_AMOUNT, dec!(999999999999.99));
    }

    #[test]
    fn test_total_matches_stored_precision() {
        // 0.335 is stored as 0.34, so the total is 3 * 0.34
        let items = normalize_items(&[item(dec!(3), dec!(0.335))]).unwrap();
        assert_eq!(items[0].unit_price, dec!(0.34));
        assert_eq!(invoice_total(&items).unwrap(), dec!(1.02));

        let items = normalize_items(&[item(dec!(1.0005), dec!(10))]).unwrap();
        assert_eq!(items[0].quantity, dec!(1.001));
        assert_eq!(invoice_total(&items).unwrap(), dec!(10.01));
    }

    #[test]
    fn test_huge_values_rejected_without_panic() {
        assert!(normalize_items(&[item(Decimal::MAX, dec!(2))]).is_err());
        assert!(normalize_items(&[item(dec!(1), Decimal::MAX)]).is_err());
        assert!(normalize_items(&[item(dec!(1000000000), dec!(1))]).is_err());
        assert!(normalize_items(&[item(dec!(1), dec!(1000000000000))]).is_err());

        // Unvalidated input overflows the sum and is reported, not panicked on
        assert!(invoice_total(&[item(Decimal::MAX, dec!(2))]).is_err());
        assert!(invoice_total(&[item(Decimal::MAX, dec!(1)), item(Decimal::MAX, dec!(1))]).is_err());

        // Within column limits but a total that would not fit total_amount
        let items = normalize_items(&[item(dec!(999999999.999), dec!(999999999999.99))]).unwrap();
        assert!(invoice_total(&items).is_err());
    }

    #[test]
    fn test_due_date_adds_term_days() {
        assert_eq!(due_date(date!(2026 - 01 - 25), 14), date!(2026 - 02 - 08));
        assert_eq!(due_date(date!(2026 - 02 - 20), 30), date!(2026 - 03 - 22));
    }

    #[test]
    fn test_normalize_items() {
        assert!(normalize_items(&[item(dec!(1), dec!(0))]).is_ok());
        assert!(normalize_items(&[item(dec!(0), dec!(10))]).is_err());
        assert!(normalize_items(&[item(dec!(0.0004), dec!(10))]).is_err());
        assert!(normalize_items(&[item(dec!(1), dec!(-1))]).is_err());

        let mut blank = item(dec!(1), dec!(1));
        blank.description = "   ".to_string();
        assert!(normalize_items(&[blank]).is_err());

        let mut padded = item(dec!(1), dec!(1));
        padded.description = "  Konzultace ".to_string();
        assert_eq!(normalize_items(&[padded]).unwrap()[0].description, "Konzultace");
    }

    #[test]
    fn test_validate_currency() {
        assert_eq!(validate_currency("czk").unwrap(), "CZK");
        assert!(validate_currency("KČ").is_err());
        assert!(validate_currency("EURO").is_err());
    }
}
