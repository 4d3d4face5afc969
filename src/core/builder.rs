use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::billing::*;
use super::error::BelegError;
use super::types::DocumentNumber;

/// Default Swiss standard VAT rate in percent.
pub const DEFAULT_VAT_RATE: Decimal = dec!(8.1);

/// Builder for invoices handed to the generators.
///
/// ```
/// use kontor::core::*;
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let invoice = InvoiceBuilder::new(42, "FAC-2025-0001", NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
///     .client(7)
///     .add_line(LineItem::new("Conseil", dec!(10), dec!(150)))
///     .additional_info("Mandat annuel")
///     .build()
///     .unwrap();
/// assert_eq!(invoice.totals().gross, dec!(1621.50));
/// ```
pub struct InvoiceBuilder {
    id: i64,
    number: String,
    client_id: Option<i64>,
    issue_date: NaiveDate,
    due_date: Option<NaiveDate>,
    lines: Vec<LineItem>,
    vat_rate: Decimal,
    additional_info: Option<String>,
}

impl InvoiceBuilder {
    pub fn new(id: i64, number: impl Into<String>, issue_date: NaiveDate) -> Self {
        Self {
            id,
            number: number.into(),
            client_id: None,
            issue_date,
            due_date: None,
            lines: Vec::new(),
            vat_rate: DEFAULT_VAT_RATE,
            additional_info: None,
        }
    }

    pub fn client(mut self, client_id: i64) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn due_date(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn add_line(mut self, line: LineItem) -> Self {
        self.lines.push(line);
        self
    }

    pub fn vat_rate(mut self, rate: Decimal) -> Self {
        self.vat_rate = rate;
        self
    }

    pub fn additional_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }

    /// Build the invoice. The number must be a valid invoice display number.
    pub fn build(self) -> Result<Invoice, BelegError> {
        let client_id = self
            .client_id
            .ok_or_else(|| BelegError::InvalidInput("client is required".into()))?;

        let number = DocumentNumber::parse(&self.number)?;
        if number.family != super::DocumentFamily::Invoice {
            return Err(BelegError::InvalidInput(format!(
                "{} is not an invoice number",
                self.number
            )));
        }

        if self.lines.len() > 10_000 {
            return Err(BelegError::InvalidInput(
                "invoice cannot have more than 10,000 line items".into(),
            ));
        }
        if self.vat_rate.is_sign_negative() || self.vat_rate > Decimal::ONE_HUNDRED {
            return Err(BelegError::InvalidInput(format!(
                "VAT rate {} out of range",
                self.vat_rate
            )));
        }

        Ok(Invoice {
            id: self.id,
            number: self.number,
            client_id,
            issue_date: self.issue_date,
            due_date: self.due_date,
            lines: self.lines,
            vat_rate: self.vat_rate,
            additional_info: self.additional_info,
        })
    }
}

/// Builder for client records.
pub struct ClientBuilder {
    client: Client,
}

impl ClientBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            client: Client {
                id,
                ..Default::default()
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.client.name = Some(name.into());
        self
    }

    pub fn company_name(mut self, name: impl Into<String>) -> Self {
        self.client.company_name = Some(name.into());
        self
    }

    /// Street line, postal code and city in one go.
    pub fn address(
        mut self,
        street: impl Into<String>,
        postal_code: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        self.client.address = Some(street.into());
        self.client.postal_code = Some(postal_code.into());
        self.client.city = Some(city.into());
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.client.country = Some(country.into());
        self
    }

    pub fn build(self) -> Client {
        self.client
    }
}
