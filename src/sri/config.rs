use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::Environment;

const TEST_HOST: &str = "https://celcer.sri.gob.ec";
const PRODUCTION_HOST: &str = "https://cel.sri.gob.ec";
const RECEPTION_PATH: &str = "/comprobantes-electronicos-ws/RecepcionComprobantesOffline";
const AUTHORIZATION_PATH: &str = "/comprobantes-electronicos-ws/AutorizacionComprobantesOffline";

/// Endpoints, timeout and polling cadence for the authority client.
///
/// Durations serialize as milliseconds. Missing fields take the test
/// environment defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SriConfig {
    pub environment: Environment,
    pub reception_url: String,
    pub authorization_url: String,
    /// Per-request timeout.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Authorization queries after a successful reception.
    pub max_retries: u32,
    /// Pause between two authorization queries.
    #[serde(rename = "retry_delay_ms", with = "duration_ms")]
    pub retry_delay: Duration,
    /// Pause between reception and the first authorization query.
    #[serde(rename = "settle_delay_ms", with = "duration_ms")]
    pub settle_delay: Duration,
}

impl Default for SriConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Test)
    }
}

impl SriConfig {
    /// Official endpoints for `environment` with the default cadence:
    /// 30s timeout, 3 queries, 2s between queries, 1s settle delay.
    pub fn for_environment(environment: Environment) -> Self {
        let host = match environment {
            Environment::Test => TEST_HOST,
            Environment::Production => PRODUCTION_HOST,
        };
        Self {
            environment,
            reception_url: format!("{host}{RECEPTION_PATH}"),
            authorization_url: format!("{host}{AUTHORIZATION_PATH}"),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            settle_delay: Duration::from_secs(1),
        }
    }

    /// Point both services at another host, keeping the official paths.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.reception_url = format!("{base}{RECEPTION_PATH}");
        self.authorization_url = format!("{base}{AUTHORIZATION_PATH}");
        self
    }

    pub fn with_reception_url(mut self, url: impl Into<String>) -> Self {
        self.reception_url = url.into();
        self
    }

    pub fn with_authorization_url(mut self, url: impl Into<String>) -> Self {
        self.authorization_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
