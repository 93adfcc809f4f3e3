//! Comprobante XML generation.
//!
//! Produces the authority's schemas for invoices (`factura` 2.1.0) and
//! credit notes (`notaCredito` 1.1.0). Element order is fixed by the schema;
//! free text is sanitized; quantities and unit prices carry six decimals and
//! money two.
//!
//! # Example
//!
//! ```no_run
//! use comprobante::core::*;
//! use comprobante::xml;
//!
//! let doc: Document = todo!(); // build via DocumentBuilder
//! let key = AccessKeyBuilder::for_document(&doc, 11).build().unwrap();
//! let unsigned = xml::to_xml(&doc, 11, &key).unwrap();
//! ```

mod common;
mod credit_note;
mod invoice;
pub(crate) mod xml_utils;

pub use credit_note::to_credit_note_xml;
pub use invoice::to_invoice_xml;
pub use xml_utils::{clean_text, format_amount, format_quantity, sanitize_text};

use crate::core::{AccessKey, ComprobanteError, DocType, Document};

/// `id` attribute of every document root; the signature references it.
pub const ROOT_ID: &str = "comprobante";

/// `factura` schema version.
pub const INVOICE_VERSION: &str = "2.1.0";

/// `notaCredito` schema version.
pub const CREDIT_NOTE_VERSION: &str = "1.1.0";

/// Generate the unsigned XML for any supported document type.
pub fn to_xml(doc: &Document, sequential: u64, key: &AccessKey) -> Result<String, ComprobanteError> {
    match doc.doc_type {
        DocType::Invoice => to_invoice_xml(doc, sequential, key),
        DocType::CreditNote => to_credit_note_xml(doc, sequential, key),
        other => Err(ComprobanteError::Validation(format!(
            "XML generation for document type {} is not supported",
            other.code()
        ))),
    }
}
