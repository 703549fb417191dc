use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::lead::LeadId;
use crate::errors::DomainError;

pub const CURRENCY_SCALE: u32 = 2;

/// Formats a monetary amount the Brazilian way: `1234.56` -> `"1.234,56"`.
/// The `R$` prefix is left to the caller.
pub fn format_brl(value: Decimal) -> String {
    let rounded = value.round_dp(CURRENCY_SCALE);
    let text = format!("{rounded:.2}");
    let (integer, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let digits: Vec<char> = integer.chars().collect();
    let mut grouped = String::new();
    for (index, digit) in digits.iter().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(*digit);
    }

    format!("{grouped},{fraction}")
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

impl QuoteId {
    /// Human-legible identifier incorporating issuance time, e.g.
    /// `ORC-20250114-8F3A2C`. The uuid suffix keeps two quotes issued in the
    /// same minute distinct.
    pub fn allocate(issued_at: DateTime<Utc>) -> Self {
        let suffix: String =
            Uuid::new_v4().simple().to_string().chars().take(6).collect::<String>().to_uppercase();
        Self(format!("ORC-{}-{suffix}", issued_at.format("%Y%m%d")))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLineItem {
    pub product: String,
    /// Quantities may be fractional (e.g. meters of gutter).
    pub quantity: Decimal,
    pub unit: String,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl QuoteLineItem {
    pub fn new(
        product: impl Into<String>,
        quantity: Decimal,
        unit: impl Into<String>,
        unit_price: Decimal,
    ) -> Result<Self, DomainError> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::InvariantViolation(
                "quote line quantity must be positive".to_string(),
            ));
        }
        if unit_price < Decimal::ZERO {
            return Err(DomainError::InvariantViolation(
                "quote line unit price cannot be negative".to_string(),
            ));
        }

        let line_total = (quantity * unit_price).round_dp(CURRENCY_SCALE);
        Ok(Self {
            product: product.into(),
            quantity,
            unit: unit.into(),
            unit_price,
            line_total,
        })
    }
}

/// An immutable priced proposal issued to a lead. Created exactly once per
/// customer-approved request; superseding one requires a new identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub lead_id: LeadId,
    pub items: Vec<QuoteLineItem>,
    pub total: Decimal,
    pub issued_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// Public retrieval reference for the rendered document. Empty when
    /// artifact storage failed; the quote record survives regardless.
    pub document_url: Option<String>,
    pub notes: Option<String>,
}

impl Quote {
    pub fn issue(
        lead_id: LeadId,
        items: Vec<QuoteLineItem>,
        issued_at: DateTime<Utc>,
        validity_days: i64,
        notes: Option<String>,
    ) -> Result<Self, DomainError> {
        if items.is_empty() {
            return Err(DomainError::InvariantViolation(
                "a quote requires at least one line item".to_string(),
            ));
        }

        let total =
            items.iter().map(|item| item.line_total).sum::<Decimal>().round_dp(CURRENCY_SCALE);

        Ok(Self {
            id: QuoteId::allocate(issued_at),
            lead_id,
            items,
            total,
            issued_at,
            valid_until: issued_at + Duration::days(validity_days),
            document_url: None,
            notes,
        })
    }
}
