//! Core document identity: numbering, checksums, billing data and the
//! persistence seams.
//!
//! Everything here is free of PDF, QR and storage concerns so the numbering
//! rules can be used and tested on their own.

mod billing;
mod builder;
mod checksum;
mod countries;
mod error;
mod numbering;
mod repository;
mod settings;
mod types;

pub use billing::*;
pub use builder::*;
pub use checksum::*;
pub use countries::{DEFAULT_COUNTRY, is_known_country_code, normalize_country};
pub use error::*;
pub use numbering::*;
pub use repository::*;
pub use settings::*;
pub use types::*;
