//! Utility functions and helpers

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Strip formatting punctuation from a CPF/CNPJ, keeping digits only.
pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Compare two tax IDs ignoring formatting. Empty IDs never match.
pub fn same_tax_id(left: &str, right: &str) -> bool {
    let left = digits_only(left);
    !left.is_empty() && left == digits_only(right)
}

/// Parse a monetary amount leniently.
///
/// Accepts `1234.56`, `1234,56`, `1.234,56` and `1,234.56`. The separator
/// that comes last is the decimal one. Absent, malformed or negative input
/// yields zero; this never fails.
pub fn parse_amount(raw: &str) -> Decimal {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Decimal::ZERO;
    }

    let normalized = match (trimmed.rfind(','), trimmed.rfind('.')) {
        (Some(comma), Some(dot)) if dot > comma => trimmed.replace(',', ""),
        (Some(_), _) => trimmed.replace('.', "").replace(',', "."),
        _ => trimmed.to_string(),
    };

    match Decimal::from_str(&normalized) {
        Ok(value) if value >= Decimal::ZERO => value,
        _ => Decimal::ZERO,
    }
}

/// Parse the calendar date at the start of a portal timestamp.
///
/// Handles `2025-01-15`, `2025-01-15T10:20:30-03:00` and `15/01/2025`.
pub fn parse_issue_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(head, "%d/%m/%Y"))
        .ok()
}
