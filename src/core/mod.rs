//! Core document types, validation, access keys and sequential numbering.
//!
//! Everything here is pure and synchronous except the
//! [`SequentialCounter`], which talks to an async [`SequenceStore`].

mod access_key;
mod builder;
mod error;
mod sequential;
pub mod tax_codes;
mod types;
mod validation;

pub use access_key::*;
pub use builder::*;
pub use error::*;
pub use sequential::*;
pub use tax_codes::{IVA_TAX_CODE, TaxRateCode};
pub use types::*;
pub use validation::*;
