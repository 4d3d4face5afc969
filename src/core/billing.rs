use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// The only currency the agency bills in.
pub const DOMAIN_CURRENCY: &str = "CHF";

/// A client of the agency, as read from the persistence collaborator.
///
/// Every field except the id is optional: the back office accepts partially
/// filled client cards, and consumers decide what they need.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    /// Natural-person name.
    pub name: Option<String>,
    /// Company name; preferred over `name` when present.
    pub company_name: Option<String>,
    /// Street and house number on one line.
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    /// Country name or ISO 3166-1 alpha-2 code.
    pub country: Option<String>,
}

impl Client {
    /// Company name if set, otherwise the person's name. Blank values count as absent.
    pub fn company_name_or_name(&self) -> Option<&str> {
        non_blank(&self.company_name).or_else(|| non_blank(&self.name))
    }
}

/// An invoice line: quantity times unit price, net of VAT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
        }
    }

    /// Net amount of the line, rounded to two digits.
    pub fn amount(&self) -> Decimal {
        round_money(self.quantity * self.unit_price)
    }
}

/// An invoice, as read from the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    /// Display number, e.g. `FAC-2025-0001`.
    pub number: String,
    pub client_id: i64,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub lines: Vec<LineItem>,
    /// VAT rate in percent (e.g. `8.1`).
    pub vat_rate: Decimal,
    /// Free text appended to the QR-bill message.
    pub additional_info: Option<String>,
}

/// Computed invoice totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub net: Decimal,
    pub vat: Decimal,
    pub gross: Decimal,
}

impl Invoice {
    /// Net, VAT and gross totals. VAT is a fixed-rate multiply on the net total.
    pub fn totals(&self) -> InvoiceTotals {
        let net: Decimal = self.lines.iter().map(LineItem::amount).sum();
        let vat = round_money(net * self.vat_rate / Decimal::ONE_HUNDRED);
        InvoiceTotals {
            net,
            vat,
            gross: net + vat,
        }
    }

    /// Additional information, if present and not blank.
    pub fn additional_info(&self) -> Option<&str> {
        non_blank(&self.additional_info)
    }
}

/// Billing settings of the agency (the creditor on every QR-bill).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgencySettings {
    /// Legal name of the agency.
    pub company_name: Option<String>,
    /// Person legally representing the agency.
    pub represented_by: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    /// Country name or ISO code; Switzerland when absent.
    pub country: Option<String>,
    /// Conventional IBAN.
    pub iban: Option<String>,
    /// Dedicated QR-IBAN for structured references.
    pub qr_iban: Option<String>,
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub(crate) fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
