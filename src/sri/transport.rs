use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Raw HTTP reply to a SOAP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapResponse {
    pub status: u16,
    pub body: String,
}

/// Failures below the SOAP layer. The client turns them into an `Error`
/// status; they are never returned to callers of the client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("could not read response body: {0}")]
    Body(String),
}

/// Posts a SOAP envelope and returns the raw reply.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    async fn post(&self, endpoint: &str, envelope: String) -> Result<SoapResponse, TransportError>;
}

#[async_trait]
impl<T: SoapTransport + ?Sized> SoapTransport for Arc<T> {
    async fn post(&self, endpoint: &str, envelope: String) -> Result<SoapResponse, TransportError> {
        (**self).post(endpoint, envelope).await
    }
}

/// HTTPS transport over `reqwest` with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl SoapTransport for HttpTransport {
    async fn post(&self, endpoint: &str, envelope: String) -> Result<SoapResponse, TransportError> {
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::Connection(e.to_string())
            }
        };

        let resp = self
            .client
            .post(endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", "")
            .body(envelope)
            .send()
            .await
            .map_err(map_err)?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::Body(e.to_string())
            }
        })?;
        debug!(endpoint, status, bytes = body.len(), "SOAP response received");
        Ok(SoapResponse { status, body })
    }
}
