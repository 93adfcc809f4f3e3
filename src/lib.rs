//! # comprobante
//!
//! Electronic tax documents (comprobantes electrónicos) for Ecuador's SRI:
//! sequential numbering, the 49-digit access key, `factura` and
//! `notaCredito` XML, XAdES-BES signing and the offline reception and
//! authorization web services.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use comprobante::core::*;
//! use rust_decimal_macros::dec;
//!
//! let date = NaiveDate::from_ymd_opt(2026, 1, 26).unwrap();
//! let invoice = DocumentBuilder::invoice(date)
//!     .emitter(EmitterBuilder::new("0999999999001", "ACME S.A.", "Av. Amazonas N34-12").build())
//!     .customer(Customer::final_consumer())
//!     .add_item(LineItemBuilder::new("P001", "Servicio", dec!(2), dec!(30.00)).build())
//!     .build()
//!     .unwrap();
//! assert_eq!(invoice.totals.as_ref().unwrap().total, dec!(69.00));
//!
//! let key = AccessKeyBuilder::for_document(&invoice, 11).build().unwrap();
//! assert!(validate_access_key(key.as_str()));
//! assert_eq!(key.fields().issue_date, "26/01/2026");
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Document model, totals, validation, access keys, sequential counter |
//! | `xml` | `factura` 2.1.0 and `notaCredito` 1.1.0 generation |
//! | `xades` | XAdES-BES enveloped signatures (RSA-SHA1), exclusive C14N |
//! | `sri` | SOAP client for reception and authorization with polling |
//! | `all` | Everything, plus the [`issuance`] pipeline |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "xml")]
pub mod xml;

#[cfg(feature = "xades")]
pub mod xades;

#[cfg(feature = "sri")]
pub mod sri;

#[cfg(all(feature = "xades", feature = "sri"))]
pub mod issuance;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
