//! End-to-end issuance: counter, access key, XML, signature, authority.
//!
//! The number is allocated only after the document passed validation, and
//! a retry never allocates a new one: [`Issuer::resend`] and
//! [`Issuer::requery`] reuse the original access key and signed XML.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::{
    AccessKey, AccessKeyBuilder, ComprobanteError, CounterKey, Document, SequenceStore,
    SequentialCounter, format_doc_number, validate_document,
};
use crate::sri::{AuthorizationResult, HttpTransport, SoapTransport, SriClient};
use crate::xades::{self, SigningCredentials};
use crate::xml;

/// A numbered, signed document that has not been sent yet. Persist it
/// before submission so an interrupted send can be resent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedDocument {
    pub sequential: u64,
    /// `EEE-PPP-SSSSSSSSS`
    pub doc_number: String,
    pub access_key: AccessKey,
    pub signed_xml: String,
}

/// A prepared document together with the authority's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedDocument {
    pub sequential: u64,
    pub doc_number: String,
    pub access_key: AccessKey,
    pub signed_xml: String,
    pub result: AuthorizationResult,
}

/// Issues documents for one tenant with one signing certificate.
pub struct Issuer<S, T = HttpTransport> {
    tenant_id: String,
    counter: SequentialCounter<S>,
    credentials: SigningCredentials,
    client: SriClient<T>,
}

impl<S: SequenceStore, T: SoapTransport> Issuer<S, T> {
    pub fn new(
        tenant_id: impl Into<String>,
        counter: SequentialCounter<S>,
        credentials: SigningCredentials,
        client: SriClient<T>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            counter,
            credentials,
            client,
        }
    }

    pub fn counter(&self) -> &SequentialCounter<S> {
        &self.counter
    }

    pub fn client(&self) -> &SriClient<T> {
        &self.client
    }

    /// Validate, allocate the next number, generate the access key, render
    /// and sign. No network call.
    ///
    /// Validation failures happen before allocation. Once a number is
    /// allocated, a later failure leaves a gap the caller must account for.
    pub async fn prepare(&self, doc: &Document) -> Result<PreparedDocument, ComprobanteError> {
        if doc.environment != self.client.config().environment {
            return Err(ComprobanteError::Validation(format!(
                "document environment {:?} does not match the client environment {:?}",
                doc.environment,
                self.client.config().environment
            )));
        }
        if doc.totals.is_none() {
            return Err(ComprobanteError::Validation(
                "totals must be calculated before issuance".into(),
            ));
        }
        let errors = validate_document(doc);
        if !errors.is_empty() {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(ComprobanteError::Validation(msgs.join("; ")));
        }

        let key = CounterKey::new(
            self.tenant_id.clone(),
            doc.establishment.clone(),
            doc.emission_point.clone(),
            doc.doc_type,
        );
        let sequential = self.counter.next_for(&key).await?;
        let access_key = AccessKeyBuilder::for_document(doc, sequential).build()?;
        let unsigned = xml::to_xml(doc, sequential, &access_key)?;
        let signed_xml = xades::sign(&unsigned, &self.credentials)?;

        Ok(PreparedDocument {
            sequential,
            doc_number: format_doc_number(&doc.establishment, &doc.emission_point, sequential),
            access_key,
            signed_xml,
        })
    }

    /// Send a prepared document and wait for the authority's answer.
    pub async fn submit(&self, prepared: PreparedDocument) -> IssuedDocument {
        let result = self
            .client
            .submit_and_authorize(&prepared.signed_xml, &prepared.access_key)
            .await;
        log_result(&prepared.access_key, &result);
        IssuedDocument {
            sequential: prepared.sequential,
            doc_number: prepared.doc_number,
            access_key: prepared.access_key,
            signed_xml: prepared.signed_xml,
            result,
        }
    }

    /// [`Issuer::prepare`] then [`Issuer::submit`].
    pub async fn issue(&self, doc: &Document) -> Result<IssuedDocument, ComprobanteError> {
        let prepared = self.prepare(doc).await?;
        info!(
            access_key = %prepared.access_key,
            doc_number = %prepared.doc_number,
            "document prepared"
        );
        Ok(self.submit(prepared).await)
    }

    /// Submit an already signed document again, keeping its access key.
    pub async fn resend(&self, signed_xml: &str, access_key: &AccessKey) -> AuthorizationResult {
        let result = self.client.submit_and_authorize(signed_xml, access_key).await;
        log_result(access_key, &result);
        result
    }

    /// Query authorization only, for a document the authority already holds.
    pub async fn requery(&self, access_key: &AccessKey) -> AuthorizationResult {
        let config = self.client.config();
        let result = self
            .client
            .poll_authorization(access_key, config.max_retries.max(1), config.retry_delay)
            .await;
        log_result(access_key, &result);
        result
    }
}

fn log_result(access_key: &AccessKey, result: &AuthorizationResult) {
    if result.is_authorized() || !result.status.is_final() {
        info!(access_key = %access_key, status = %result.status, "issuance finished");
    } else {
        warn!(access_key = %access_key, status = %result.status, "issuance refused");
    }
}
