//! # kontor
//!
//! Document identity and payment-code generation for an agency back office.
//! Invoice and contract numbers are unique per family and year, invoices
//! become Swiss QR-bills and PDF artifacts, and the artifacts land in a store
//! with interchangeable filesystem and object-storage backends.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//!
//! ## Quick Start
//!
//! ```rust
//! use kontor::core::*;
//!
//! let number = DocumentNumber::new(DocumentFamily::Contract, 2025, 1);
//! assert_eq!(number.to_string(), "CTR-2025-0001");
//! assert_eq!(DocumentNumber::parse("CTR-2025-0001").unwrap(), number);
//!
//! assert_eq!(check_digit("21000000000313947143000901").unwrap(), 7);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Numbering, checksum, billing data, repository traits |
//! | `pdf` | PDF page writer and invoice rendering |
//! | `qrbill` | Swiss QR-bill payload, SPC encoding and rendering |
//! | `storage` | Artifact store with local and object-storage backends |
//! | `sqlite` | SQLite persistence collaborator |
//! | `service` | Document generation façade and configuration loading |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "pdf")]
pub mod pdf;

#[cfg(feature = "qrbill")]
pub mod qrbill;

#[cfg(feature = "storage")]
pub mod storage;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "service")]
pub mod config;

#[cfg(feature = "service")]
pub mod service;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
