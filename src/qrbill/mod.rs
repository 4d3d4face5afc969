//! Swiss QR-bill generation.
//!
//! Resolves the creditor account from the agency settings, assembles the
//! payment data set of an invoice, encodes it as Swiss Payments Code (SPC)
//! and renders the payment slip into a PDF page.
//!
//! ```
//! use chrono::NaiveDate;
//! use kontor::core::*;
//! use kontor::qrbill::*;
//! use rust_decimal_macros::dec;
//!
//! let settings = AgencySettings {
//!     represented_by: Some("Claire Rochat".into()),
//!     street: Some("Rue du Marché 8".into()),
//!     postal_code: Some("1204".into()),
//!     city: Some("Genève".into()),
//!     iban: Some("CH93 0076 2011 6238 5295 7".into()),
//!     ..Default::default()
//! };
//! let invoice = InvoiceBuilder::new(42, "FAC-2025-0001", NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
//!     .client(1)
//!     .add_line(LineItem::new("Conseil", dec!(1), dec!(100)))
//!     .build()
//!     .unwrap();
//! let client = ClientBuilder::new(1).name("Jean Dupont").build();
//!
//! let creditor = resolve_creditor(&settings).unwrap();
//! let payload = QrPayloadBuilder::new(&invoice, &client, &creditor).build().unwrap();
//! assert_eq!(payload.reference, PaymentReference::None);
//! assert!(payload.to_spc().unwrap().starts_with("SPC\n0200\n1\nCH9300762011623852957\n"));
//! ```

mod creditor;
mod payload;
mod reference;
mod render;

pub use creditor::{CreditorAccount, format_iban, resolve_creditor};
pub use payload::{
    DebtorParty, MAX_AMOUNT, MESSAGE_MAX_CHARS, QrBillPayload, QrPayloadBuilder, SPC_MAX_CHARS,
    message,
};
pub use reference::{INVOICE_ID_DIGITS, PaymentReference, RANDOM_DIGITS};
pub use render::{qr_bill_page, render_qr_bill};
