//! XAdES-BES enveloped signatures.
//!
//! [`sign`] takes the unsigned comprobante XML and the taxpayer's
//! [`SigningCredentials`] and appends a `ds:Signature` as the last child of
//! the root element. Digests are SHA-1, the signature is RSA-SHA1 and every
//! canonicalization step is exclusive C14N.
//!
//! ```no_run
//! use comprobante::xades::{SigningCredentials, sign};
//!
//! # fn run(xml: &str, key: &str, cert: &str) -> Result<(), comprobante::ComprobanteError> {
//! let credentials = SigningCredentials::from_pem(key, cert, Some("passphrase"))?;
//! let signed = sign(xml, &credentials)?;
//! # let _ = signed;
//! # Ok(())
//! # }
//! ```

pub mod c14n;
mod credentials;
mod signer;

pub use c14n::{EXC_C14N, canonicalize, canonicalize_enveloped, canonicalize_subtree};
pub use credentials::{CertificateInfo, SigningCredentials};
pub use signer::{
    SignOptions, SignatureIds, sign, sign_with, verify, verify_integrity, verify_reference_digests,
};

/// XML-DSig namespace.
pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
/// XAdES v1.3.2 namespace.
pub const ETSI_NS: &str = "http://uri.etsi.org/01903/v1.3.2#";

pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
pub const SIGNED_PROPERTIES_TYPE: &str = "http://uri.etsi.org/01903#SignedProperties";
