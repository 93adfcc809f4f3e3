use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while preparing, numbering or signing a comprobante.
///
/// Transport failures are not part of this enum: the authority client folds
/// them into the `ERROR` status of its result instead of raising them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ComprobanteError {
    /// One or more validation rules failed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A fixed-width value had the wrong number of digits.
    #[error("invalid length: expected {expected} characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The sequence store could not allocate a number.
    #[error("sequence store unavailable: {0}")]
    StoreUnavailable(String),

    /// The private key or certificate could not be loaded.
    #[error("certificate load error: {0}")]
    CertificateLoad(String),

    /// Canonicalization, digest or RSA signing failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// XML generation or parsing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// The authority refused the document.
    #[error("rejected by the authority: {}", format_messages(.0))]
    AuthorityRejected(Vec<AuthorityMessage>),
}

fn format_messages(messages: &[AuthorityMessage]) -> String {
    if messages.is_empty() {
        return "no messages".to_string();
    }
    messages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single validation error with field path and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dot-separated path to the invalid field (e.g. "customer.identification").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Severity attached to a message returned by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageSeverity {
    Error,
    Warning,
    Info,
}

impl MessageSeverity {
    /// Map the authority's `tipo` token. Unknown tokens are treated as errors.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_uppercase().as_str() {
            "ADVERTENCIA" | "WARNING" => Self::Warning,
            "INFORMATIVO" | "INFO" => Self::Info,
            _ => Self::Error,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "ADVERTENCIA",
            Self::Info => "INFORMATIVO",
        }
    }
}

/// A message from the authority, or one synthesized by the client for
/// transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityMessage {
    /// Authority message code (`identificador`), e.g. "35" or "43".
    pub code: String,
    /// Message text (`mensaje`).
    pub text: String,
    /// Extra detail (`informacionAdicional`), often naming the offending field.
    pub additional_info: Option<String>,
    pub severity: MessageSeverity,
}

impl AuthorityMessage {
    pub fn new(code: impl Into<String>, text: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            code: code.into(),
            text: text.into(),
            additional_info: None,
            severity,
        }
    }

    pub fn with_additional_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }

    /// Local error message for failures that never reached the authority.
    pub fn local_error(text: impl Into<String>) -> Self {
        Self::new("", text, MessageSeverity::Error)
    }
}

impl std::fmt::Display for AuthorityMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.code.is_empty() {
            write!(f, "[{}] ", self.code)?;
        }
        write!(f, "{}", self.text)?;
        if let Some(info) = &self.additional_info {
            write!(f, " ({info})")?;
        }
        Ok(())
    }
}
