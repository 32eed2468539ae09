//! Pure money math and invoice validation.
//!
//! Everything here is synchronous and side-effect free. Failures are values:
//! arithmetic returns [`CalculationError`], validation returns an ordered
//! list of human-readable messages that goes straight into the response
//! envelope. Out-of-range discounts are rejected, never clamped.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::dtos::{InvoiceItemRequest, InvoiceRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CalculationError {
    #[error("Quantity must be greater than 0")]
    QuantityNotPositive,

    #[error("Unit price cannot be negative")]
    NegativeUnitPrice,

    #[error("Discount percentage must be between 0 and 100")]
    DiscountPercentageOutOfRange,

    #[error("Discount amount cannot be negative")]
    NegativeDiscountAmount,

    #[error("Total discount cannot exceed line subtotal")]
    DiscountExceedsSubtotal,

    #[error("Tax rate must be between 0 and 100")]
    TaxRateOutOfRange,
}

/// Line total: `quantity * unit_price` minus the percentage discount and
/// the flat discount. By construction the result is never negative because
/// a combined discount larger than the line subtotal is an error.
pub fn calculate_line_total(
    quantity: Decimal,
    unit_price: Decimal,
    discount_percentage: Decimal,
    discount_amount: Decimal,
) -> Result<Decimal, CalculationError> {
    if quantity <= Decimal::ZERO {
        return Err(CalculationError::QuantityNotPositive);
    }
    if unit_price < Decimal::ZERO {
        return Err(CalculationError::NegativeUnitPrice);
    }
    if discount_percentage < Decimal::ZERO || discount_percentage > Decimal::ONE_HUNDRED {
        return Err(CalculationError::DiscountPercentageOutOfRange);
    }
    if discount_amount < Decimal::ZERO {
        return Err(CalculationError::NegativeDiscountAmount);
    }

    let line_subtotal = quantity * unit_price;
    let percentage_discount = line_subtotal * (discount_percentage / Decimal::ONE_HUNDRED);
    let total_discount = percentage_discount + discount_amount;

    if total_discount > line_subtotal {
        return Err(CalculationError::DiscountExceedsSubtotal);
    }

    Ok(line_subtotal - total_discount)
}

/// Sum of line totals for a set of items.
pub fn calculate_subtotal(items: &[InvoiceItemRequest]) -> Result<Decimal, CalculationError> {
    let mut subtotal = Decimal::ZERO;
    for item in items {
        subtotal += calculate_line_total(
            item.quantity,
            item.unit_price,
            item.discount_percentage,
            item.discount_amount,
        )?;
    }
    Ok(subtotal)
}

/// `subtotal * tax_rate / 100`. The rate is a percentage in `[0, 100]`.
pub fn calculate_tax_amount(
    subtotal: Decimal,
    tax_rate: Decimal,
) -> Result<Decimal, CalculationError> {
    if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE_HUNDRED {
        return Err(CalculationError::TaxRateOutOfRange);
    }
    Ok(subtotal * (tax_rate / Decimal::ONE_HUNDRED))
}

pub fn calculate_grand_total(subtotal: Decimal, tax_amount: Decimal) -> Decimal {
    subtotal + tax_amount
}

/// Per-item validation. Returns every violated rule, in field order, so the
/// client sees the complete picture in one round trip.
pub fn validate_invoice_item(item: &InvoiceItemRequest) -> Vec<String> {
    let mut errors = Vec::new();

    if item.product_name.trim().is_empty() {
        errors.push("Product name is required".to_string());
    } else if item.product_name.len() > 255 {
        errors.push("Product name cannot exceed 255 characters".to_string());
    }

    if let Some(description) = &item.description {
        if description.len() > 500 {
            errors.push("Description cannot exceed 500 characters".to_string());
        }
    }

    if item.quantity <= Decimal::ZERO {
        errors.push(CalculationError::QuantityNotPositive.to_string());
    }

    if item.unit_price < Decimal::ZERO {
        errors.push(CalculationError::NegativeUnitPrice.to_string());
    }

    if item.discount_percentage < Decimal::ZERO || item.discount_percentage > Decimal::ONE_HUNDRED
    {
        errors.push(CalculationError::DiscountPercentageOutOfRange.to_string());
    }

    if item.discount_amount < Decimal::ZERO {
        errors.push(CalculationError::NegativeDiscountAmount.to_string());
    }

    if let Some(unit) = &item.unit {
        if unit.len() > 50 {
            errors.push("Unit cannot exceed 50 characters".to_string());
        }
    }

    // The combined-discount rule only makes sense once the individual
    // fields are in range.
    if errors.is_empty() {
        if let Err(err) = calculate_line_total(
            item.quantity,
            item.unit_price,
            item.discount_percentage,
            item.discount_amount,
        ) {
            errors.push(err.to_string());
        }
    }

    errors
}

/// Whole-invoice validation: header rules first, then each item's errors
/// prefixed with its 1-based position.
pub fn validate_invoice(invoice: &InvoiceRequest) -> Vec<String> {
    let mut errors = Vec::new();

    if invoice.customer_id <= 0 {
        errors.push("Valid Customer ID is required".to_string());
    }

    if invoice.tax_rate < Decimal::ZERO || invoice.tax_rate > Decimal::ONE_HUNDRED {
        errors.push(CalculationError::TaxRateOutOfRange.to_string());
    }

    if let Some(notes) = &invoice.notes {
        if notes.len() > 500 {
            errors.push("Notes cannot exceed 500 characters".to_string());
        }
    }

    if invoice.invoice_items.is_empty() {
        errors.push("At least one invoice item is required".to_string());
    } else {
        for (index, item) in invoice.invoice_items.iter().enumerate() {
            for error in validate_invoice_item(item) {
                errors.push(format!("Item {}: {}", index + 1, error));
            }
        }
    }

    if let Some(due_date) = invoice.due_date {
        if due_date < invoice.invoice_date {
            errors.push("Due date cannot be earlier than invoice date".to_string());
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn item(quantity: &str, unit_price: &str, pct: &str, amount: &str) -> InvoiceItemRequest {
        InvoiceItemRequest {
            product_name: "Widget".to_string(),
            quantity: dec(quantity),
            unit_price: dec(unit_price),
            discount_percentage: dec(pct),
            discount_amount: dec(amount),
            ..Default::default()
        }
    }

    #[test]
    fn line_total_applies_both_discounts() {
        // 2 * 100 = 200; 10% = 20, plus flat 5 => 175
        let total = calculate_line_total(dec("2"), dec("100"), dec("10"), dec("5")).unwrap();
        assert_eq!(total, dec("175"));
    }

    #[test]
    fn line_total_without_discounts() {
        let total = calculate_line_total(dec("3"), dec("19.99"), dec("0"), dec("0")).unwrap();
        assert_eq!(total, dec("59.97"));
    }

    #[test]
    fn zero_or_negative_quantity_is_rejected() {
        assert_eq!(
            calculate_line_total(dec("0"), dec("10"), dec("0"), dec("0")),
            Err(CalculationError::QuantityNotPositive)
        );
        assert_eq!(
            calculate_line_total(dec("-1"), dec("10"), dec("0"), dec("0")),
            Err(CalculationError::QuantityNotPositive)
        );
    }

    #[test]
    fn negative_unit_price_is_rejected() {
        assert_eq!(
            calculate_line_total(dec("1"), dec("-0.01"), dec("0"), dec("0")),
            Err(CalculationError::NegativeUnitPrice)
        );
    }

    #[test]
    fn discount_percentage_must_stay_in_range() {
        assert_eq!(
            calculate_line_total(dec("1"), dec("10"), dec("100.01"), dec("0")),
            Err(CalculationError::DiscountPercentageOutOfRange)
        );
        assert_eq!(
            calculate_line_total(dec("1"), dec("10"), dec("-1"), dec("0")),
            Err(CalculationError::DiscountPercentageOutOfRange)
        );
    }

    #[test]
    fn full_percentage_discount_reaches_zero_not_error() {
        let total = calculate_line_total(dec("4"), dec("25"), dec("100"), dec("0")).unwrap();
        assert_eq!(total, Decimal::ZERO);
    }

    #[test]
    fn oversized_discount_is_rejected_not_clamped() {
        // 1 * 50 = 50; flat discount 60 exceeds the line subtotal
        assert_eq!(
            calculate_line_total(dec("1"), dec("50"), dec("0"), dec("60")),
            Err(CalculationError::DiscountExceedsSubtotal)
        );
        // Same once both discounts are combined
        assert_eq!(
            calculate_line_total(dec("1"), dec("50"), dec("100"), dec("0.01")),
            Err(CalculationError::DiscountExceedsSubtotal)
        );
    }

    #[test]
    fn subtotal_sums_line_totals() {
        let items = vec![
            item("2", "100", "10", "5"), // 175
            item("1", "25", "0", "0"),   // 25
        ];
        assert_eq!(calculate_subtotal(&items).unwrap(), dec("200"));
    }

    #[test]
    fn subtotal_propagates_item_errors() {
        let items = vec![item("2", "100", "0", "0"), item("0", "10", "0", "0")];
        assert_eq!(
            calculate_subtotal(&items),
            Err(CalculationError::QuantityNotPositive)
        );
    }

    #[test]
    fn tax_amount_is_a_percentage_of_subtotal() {
        assert_eq!(
            calculate_tax_amount(dec("200"), dec("8.25")).unwrap(),
            dec("16.50")
        );
        assert_eq!(
            calculate_tax_amount(dec("200"), dec("0")).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn tax_rate_must_stay_in_range() {
        assert_eq!(
            calculate_tax_amount(dec("100"), dec("101")),
            Err(CalculationError::TaxRateOutOfRange)
        );
        assert_eq!(
            calculate_tax_amount(dec("100"), dec("-0.5")),
            Err(CalculationError::TaxRateOutOfRange)
        );
    }

    #[test]
    fn grand_total_adds_tax() {
        assert_eq!(calculate_grand_total(dec("200"), dec("16.50")), dec("216.50"));
    }

    #[test]
    fn item_validation_requires_product_name() {
        let mut bad = item("1", "10", "0", "0");
        bad.product_name = "   ".to_string();
        assert_eq!(
            validate_invoice_item(&bad),
            vec!["Product name is required".to_string()]
        );
    }

    #[test]
    fn item_validation_collects_all_field_errors_in_order() {
        let mut bad = item("0", "-1", "150", "-2");
        bad.product_name = String::new();
        assert_eq!(
            validate_invoice_item(&bad),
            vec![
                "Product name is required".to_string(),
                "Quantity must be greater than 0".to_string(),
                "Unit price cannot be negative".to_string(),
                "Discount percentage must be between 0 and 100".to_string(),
                "Discount amount cannot be negative".to_string(),
            ]
        );
    }

    #[test]
    fn item_validation_reports_oversized_combined_discount() {
        let bad = item("1", "50", "0", "60");
        assert_eq!(
            validate_invoice_item(&bad),
            vec!["Total discount cannot exceed line subtotal".to_string()]
        );
    }

    #[test]
    fn valid_item_produces_no_errors() {
        assert!(validate_invoice_item(&item("2", "9.99", "5", "0")).is_empty());
    }

    fn invoice(customer_id: i32, items: Vec<InvoiceItemRequest>) -> InvoiceRequest {
        InvoiceRequest {
            customer_id,
            invoice_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            due_date: None,
            tax_rate: Decimal::ZERO,
            notes: None,
            invoice_items: items,
        }
    }

    #[test]
    fn invoice_validation_requires_customer_and_items() {
        let bad = invoice(0, Vec::new());
        assert_eq!(
            validate_invoice(&bad),
            vec![
                "Valid Customer ID is required".to_string(),
                "At least one invoice item is required".to_string(),
            ]
        );
    }

    #[test]
    fn invoice_validation_prefixes_item_errors_with_position() {
        let bad = invoice(1, vec![item("1", "10", "0", "0"), item("0", "10", "0", "0")]);
        assert_eq!(
            validate_invoice(&bad),
            vec!["Item 2: Quantity must be greater than 0".to_string()]
        );
    }

    #[test]
    fn invoice_validation_rejects_due_date_before_invoice_date() {
        let mut bad = invoice(1, vec![item("1", "10", "0", "0")]);
        bad.due_date = Some(NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
        assert_eq!(
            validate_invoice(&bad),
            vec!["Due date cannot be earlier than invoice date".to_string()]
        );
    }

    #[test]
    fn invoice_validation_rejects_out_of_range_tax_rate() {
        let mut bad = invoice(1, vec![item("1", "10", "0", "0")]);
        bad.tax_rate = dec("120");
        assert_eq!(
            validate_invoice(&bad),
            vec!["Tax rate must be between 0 and 100".to_string()]
        );
    }

    #[test]
    fn valid_invoice_produces_no_errors() {
        let mut good = invoice(7, vec![item("2", "100", "10", "5")]);
        good.due_date = Some(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        good.tax_rate = dec("8.25");
        assert!(validate_invoice(&good).is_empty());
    }
}
