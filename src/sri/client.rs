use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::SriConfig;
use super::soap::{
    AuthorizationOutcome, AuthorizationStatus, ReceptionResult, ReceptionStatus,
    authorization_envelope, parse_authorization_response, parse_reception_response,
    reception_envelope,
};
use super::transport::{HttpTransport, SoapResponse, SoapTransport, TransportError};
use crate::core::{AccessKey, AuthorityMessage, ComprobanteError, MessageSeverity};

const IN_PROCESS_MESSAGE: &str = "Documento en proceso de autorización";

/// Final business status of one issuance attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentStatus {
    /// AUTORIZADO
    Authorized,
    /// NO_AUTORIZADO: received, then refused at authorization.
    NotAuthorized,
    /// RECHAZADO: returned (DEVUELTA) at reception.
    Rejected,
    /// EN_PROCESO after the polling budget ran out. Requery or resend later.
    InProcess,
    /// ERROR: transport failure or unreadable response.
    Error,
}

impl DocumentStatus {
    pub fn token(&self) -> &'static str {
        match self {
            Self::Authorized => "AUTORIZADO",
            Self::NotAuthorized => "NO_AUTORIZADO",
            Self::Rejected => "RECHAZADO",
            Self::InProcess => "EN_PROCESO",
            Self::Error => "ERROR",
        }
    }

    /// Whether the authority's answer is definitive for this document.
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::InProcess | Self::Error)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// Outcome of [`SriClient::submit_and_authorize`]. Built once, never
/// updated: a resend yields a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    pub status: DocumentStatus,
    pub authorization_number: Option<String>,
    pub authorized_at: Option<DateTime<FixedOffset>>,
    pub environment: Option<String>,
    /// The authorized XML as returned by the authority.
    pub authorized_document: Option<String>,
    pub messages: Vec<AuthorityMessage>,
    /// Authorization queries performed.
    pub attempts: u32,
}

impl AuthorizationResult {
    fn new(status: DocumentStatus, messages: Vec<AuthorityMessage>, attempts: u32) -> Self {
        Self {
            status,
            authorization_number: None,
            authorized_at: None,
            environment: None,
            authorized_document: None,
            messages,
            attempts,
        }
    }

    fn from_outcome(outcome: AuthorizationOutcome, attempts: u32) -> Self {
        let status = match outcome.status {
            AuthorizationStatus::Authorized => DocumentStatus::Authorized,
            AuthorizationStatus::NotAuthorized => DocumentStatus::NotAuthorized,
            AuthorizationStatus::InProcess => DocumentStatus::InProcess,
            AuthorizationStatus::Error => DocumentStatus::Error,
        };
        Self {
            status,
            authorization_number: outcome.authorization_number,
            authorized_at: outcome.authorized_at,
            environment: outcome.environment,
            authorized_document: outcome.document,
            messages: outcome.messages,
            attempts,
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.status == DocumentStatus::Authorized
    }

    /// Turn a business rejection (`Rejected`, `NotAuthorized`) into
    /// [`ComprobanteError::AuthorityRejected`]. Every other status passes.
    pub fn into_result(self) -> Result<Self, ComprobanteError> {
        match self.status {
            DocumentStatus::Rejected | DocumentStatus::NotAuthorized => {
                Err(ComprobanteError::AuthorityRejected(self.messages))
            }
            _ => Ok(self),
        }
    }
}

fn transport_message(err: &TransportError) -> String {
    match err {
        TransportError::Timeout(_) => "Timeout al conectar con SRI".to_string(),
        other => format!("Error de conexión: {other}"),
    }
}

/// Client for the reception and authorization web services.
#[derive(Debug, Clone)]
pub struct SriClient<T = HttpTransport> {
    config: SriConfig,
    transport: T,
}

impl SriClient<HttpTransport> {
    /// Client over HTTPS with the configured timeout.
    pub fn new(config: SriConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(config.timeout)?;
        Ok(Self { config, transport })
    }
}

impl<T: SoapTransport> SriClient<T> {
    pub fn with_transport(config: SriConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &SriConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn call(&self, endpoint: &str, envelope: String) -> Result<SoapResponse, String> {
        let resp = self
            .transport
            .post(endpoint, envelope)
            .await
            .map_err(|e| {
                warn!(endpoint, error = %e, "SOAP call failed");
                transport_message(&e)
            })?;
        debug!(endpoint, status = resp.status, "SOAP call completed");
        if resp.body.trim().is_empty() {
            return Err(format!("Respuesta vacía del SRI (HTTP {})", resp.status));
        }
        Ok(resp)
    }

    /// Send the signed document to the reception service.
    pub async fn submit(&self, signed_xml: &str) -> ReceptionResult {
        let envelope = reception_envelope(signed_xml);
        match self.call(&self.config.reception_url, envelope).await {
            Ok(resp) => parse_reception_response(&resp.body),
            Err(message) => ReceptionResult::error(message),
        }
    }

    /// Ask the authorization service about one access key.
    pub async fn check_authorization(&self, access_key: &AccessKey) -> AuthorizationOutcome {
        let envelope = authorization_envelope(access_key);
        match self.call(&self.config.authorization_url, envelope).await {
            Ok(resp) => parse_authorization_response(&resp.body),
            Err(message) => AuthorizationOutcome::error(message),
        }
    }

    /// Submit, then poll for authorization with the configured cadence.
    pub async fn submit_and_authorize(
        &self,
        signed_xml: &str,
        access_key: &AccessKey,
    ) -> AuthorizationResult {
        self.submit_and_authorize_with(
            signed_xml,
            access_key,
            self.config.max_retries,
            self.config.retry_delay,
        )
        .await
    }

    /// Submit, wait the settle delay, then query authorization up to
    /// `max_retries` times with `retry_delay` between queries.
    ///
    /// A DEVUELTA reception returns [`DocumentStatus::Rejected`] without any
    /// authorization query. Transport failures come back as
    /// [`DocumentStatus::Error`].
    pub async fn submit_and_authorize_with(
        &self,
        signed_xml: &str,
        access_key: &AccessKey,
        max_retries: u32,
        retry_delay: Duration,
    ) -> AuthorizationResult {
        info!(access_key = %access_key, "submitting document");
        let reception = self.submit(signed_xml).await;
        match reception.status {
            ReceptionStatus::Returned => {
                warn!(access_key = %access_key, messages = ?reception.messages, "document returned at reception");
                return AuthorizationResult::new(DocumentStatus::Rejected, reception.messages, 0);
            }
            ReceptionStatus::Error => {
                warn!(access_key = %access_key, messages = ?reception.messages, "reception failed");
                return AuthorizationResult::new(DocumentStatus::Error, reception.messages, 0);
            }
            ReceptionStatus::Received => {
                debug!(access_key = %access_key, "document received");
            }
        }

        tokio::time::sleep(self.config.settle_delay).await;
        self.poll_authorization(access_key, max_retries, retry_delay)
            .await
    }

    /// Query authorization only, for a document the authority already
    /// received.
    pub async fn poll_authorization(
        &self,
        access_key: &AccessKey,
        max_retries: u32,
        retry_delay: Duration,
    ) -> AuthorizationResult {
        for attempt in 1..=max_retries {
            let outcome = self.check_authorization(access_key).await;
            debug!(access_key = %access_key, attempt, status = ?outcome.status, "authorization query");
            if outcome.status != AuthorizationStatus::InProcess {
                let result = AuthorizationResult::from_outcome(outcome, attempt);
                match result.status {
                    DocumentStatus::Authorized => info!(
                        access_key = %access_key,
                        number = result.authorization_number.as_deref().unwrap_or(""),
                        attempt,
                        "document authorized"
                    ),
                    status => warn!(
                        access_key = %access_key,
                        status = %status,
                        messages = ?result.messages,
                        "document not authorized"
                    ),
                }
                return result;
            }
            if attempt < max_retries {
                tokio::time::sleep(retry_delay).await;
            }
        }

        info!(access_key = %access_key, attempts = max_retries, "authorization still in process");
        AuthorizationResult::new(
            DocumentStatus::InProcess,
            vec![AuthorityMessage::new("", IN_PROCESS_MESSAGE, MessageSeverity::Info)],
            max_retries,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tokens() {
        assert_eq!(DocumentStatus::Rejected.token(), "RECHAZADO");
        assert_eq!(DocumentStatus::InProcess.to_string(), "EN_PROCESO");
        assert!(DocumentStatus::NotAuthorized.is_final());
        assert!(!DocumentStatus::InProcess.is_final());
        assert!(!DocumentStatus::Error.is_final());
    }

    #[test]
    fn test_into_result_rejects_business_refusals() {
        let msg = AuthorityMessage::new("35", "ARCHIVO NO CUMPLE ESTRUCTURA XML", MessageSeverity::Error);
        let rejected = AuthorizationResult::new(DocumentStatus::Rejected, vec![msg.clone()], 0);
        match rejected.into_result() {
            Err(ComprobanteError::AuthorityRejected(messages)) => assert_eq!(messages, vec![msg]),
            other => panic!("unexpected {other:?}"),
        }

        let pending = AuthorizationResult::new(DocumentStatus::InProcess, Vec::new(), 3);
        assert!(pending.into_result().is_ok());
    }

    #[test]
    fn test_transport_messages() {
        assert_eq!(
            transport_message(&TransportError::Timeout(Duration::from_secs(30))),
            "Timeout al conectar con SRI"
        );
        assert!(transport_message(&TransportError::Connection("refused".into())).contains("refused"));
    }
}
