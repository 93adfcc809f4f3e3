//! Gap-free sequential numbers per (tenant, establishment, emission point,
//! document type).
//!
//! The counter itself holds no state. Atomicity lives in the
//! [`SequenceStore`]: `increment` must be a single upsert-and-increment at
//! the storage layer (e.g. `INSERT ... ON CONFLICT DO UPDATE SET value =
//! value + 1 RETURNING value`), so the guarantee holds across processes.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::error::ComprobanteError;
use super::types::DocType;

/// Identifies one independent sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterKey {
    pub tenant_id: String,
    pub establishment: String,
    pub emission_point: String,
    pub doc_type: DocType,
}

impl CounterKey {
    pub fn new(
        tenant_id: impl Into<String>,
        establishment: impl Into<String>,
        emission_point: impl Into<String>,
        doc_type: DocType,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            establishment: establishment.into(),
            emission_point: emission_point.into(),
            doc_type,
        }
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}-{}/{}",
            self.tenant_id,
            self.establishment,
            self.emission_point,
            self.doc_type.code()
        )
    }
}

/// The backing store could not be reached or refused the operation.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Keyed integer storage with an atomic fetch-and-add.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Atomically increment the value for `key`, creating it at 1 if it does
    /// not exist, and return the new value.
    async fn increment(&self, key: &CounterKey) -> Result<u64, StoreError>;

    /// Current value without incrementing, `None` if the key was never used.
    async fn current(&self, key: &CounterKey) -> Result<Option<u64>, StoreError>;

    /// Overwrite the value for `key`. Not atomic with respect to `increment`.
    async fn overwrite(&self, key: &CounterKey, value: u64) -> Result<(), StoreError>;
}

/// Process-local store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemorySequenceStore {
    values: Mutex<HashMap<CounterKey, u64>>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn increment(&self, key: &CounterKey) -> Result<u64, StoreError> {
        let mut values = self.values.lock();
        let value = values.entry(key.clone()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn current(&self, key: &CounterKey) -> Result<Option<u64>, StoreError> {
        Ok(self.values.lock().get(key).copied())
    }

    async fn overwrite(&self, key: &CounterKey, value: u64) -> Result<(), StoreError> {
        self.values.lock().insert(key.clone(), value);
        Ok(())
    }
}

#[async_trait]
impl<S: SequenceStore + ?Sized> SequenceStore for std::sync::Arc<S> {
    async fn increment(&self, key: &CounterKey) -> Result<u64, StoreError> {
        (**self).increment(key).await
    }

    async fn current(&self, key: &CounterKey) -> Result<Option<u64>, StoreError> {
        (**self).current(key).await
    }

    async fn overwrite(&self, key: &CounterKey, value: u64) -> Result<(), StoreError> {
        (**self).overwrite(key, value).await
    }
}

/// Allocates sequential document numbers from a [`SequenceStore`].
#[derive(Debug)]
pub struct SequentialCounter<S> {
    store: S,
}

impl<S: SequenceStore> SequentialCounter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Allocate the next number for the key. The first call returns 1.
    ///
    /// On `StoreUnavailable` no number was allocated and issuance must stop.
    pub async fn next(
        &self,
        tenant_id: &str,
        establishment: &str,
        emission_point: &str,
        doc_type: DocType,
    ) -> Result<u64, ComprobanteError> {
        let key = CounterKey::new(tenant_id, establishment, emission_point, doc_type);
        self.next_for(&key).await
    }

    pub async fn next_for(&self, key: &CounterKey) -> Result<u64, ComprobanteError> {
        let value = self
            .store
            .increment(key)
            .await
            .map_err(|e| ComprobanteError::StoreUnavailable(e.to_string()))?;
        debug!(counter = %key, value, "allocated sequential");
        Ok(value)
    }

    /// Last allocated number, 0 if none. For diagnostics only: the next
    /// document's number must come from [`SequentialCounter::next`].
    pub async fn current(
        &self,
        tenant_id: &str,
        establishment: &str,
        emission_point: &str,
        doc_type: DocType,
    ) -> Result<u64, ComprobanteError> {
        let key = CounterKey::new(tenant_id, establishment, emission_point, doc_type);
        let value = self
            .store
            .current(&key)
            .await
            .map_err(|e| ComprobanteError::StoreUnavailable(e.to_string()))?;
        Ok(value.unwrap_or(0))
    }

    /// Administrative override of the stored value.
    ///
    /// Not atomic: a concurrent `next` may be lost or repeated. Setting the
    /// value below an already issued number makes the authority reject the
    /// duplicates with "CLAVE ACCESO REGISTRADA".
    pub async fn override_unchecked(
        &self,
        tenant_id: &str,
        establishment: &str,
        emission_point: &str,
        doc_type: DocType,
        value: u64,
    ) -> Result<(), ComprobanteError> {
        let key = CounterKey::new(tenant_id, establishment, emission_point, doc_type);
        warn!(counter = %key, value, "sequential overridden administratively");
        self.store
            .overwrite(&key, value)
            .await
            .map_err(|e| ComprobanteError::StoreUnavailable(e.to_string()))
    }
}
