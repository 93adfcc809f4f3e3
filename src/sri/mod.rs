//! Authority Protocol Client for the SRI offline web services.
//!
//! A signed document goes to `RecepcionComprobantesOffline`; once RECIBIDA,
//! `AutorizacionComprobantesOffline` is polled with the access key until it
//! answers AUTORIZADO or NO AUTORIZADO, or the polling budget runs out.
//!
//! ```text
//! submit ──► RECIBIDA ──► settle ──► poll ──► AUTORIZADO
//!    │                                 │ ├──► NO_AUTORIZADO
//!    ├─► DEVUELTA ──► RECHAZADO        │ ├──► ERROR
//!    └─► ERROR                         └─┴──► EN_PROCESO (retries exhausted)
//! ```
//!
//! Network failures never escape as errors: every call returns a status the
//! caller can persist.

mod client;
mod config;
mod soap;
mod transport;

pub use client::{AuthorizationResult, DocumentStatus, SriClient};
pub use config::SriConfig;
pub use soap::{
    AUTHORIZATION_NS, AuthorizationOutcome, AuthorizationStatus, RECEPTION_NS, ReceptionResult,
    ReceptionStatus, SOAP_ENV_NS, authorization_envelope, parse_authorization_response,
    parse_reception_response, reception_envelope,
};
pub use transport::{HttpTransport, SoapResponse, SoapTransport, TransportError};
