//! exporter config
//!
//! Built in code with the `with_*` setters or deserialized from YAML/JSON, then
//! completed from the environment with [`Config::init`].

use std::collections::BTreeMap;
use std::time::Duration;

use api_types::KeyValue;
use serde::Deserialize;
use serde::Deserializer;

use crate::checkpoint::Resource;

pub const DSN_ENV: &str = "UPTRACE_DSN";
pub const DISABLED_ENV: &str = "UPTRACE_DISABLED";

/// Metrics exporter config.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// connection string, `scheme://token@host/project_id`
    pub dsn: String,
    /// never send anything
    pub disabled: bool,
    /// collection period of the push controller
    #[serde(deserialize_with = "deserialize_secs")]
    pub period: Duration,
    /// HTTP request timeout for one delivery
    #[serde(deserialize_with = "deserialize_secs")]
    pub request_timeout: Duration,
    /// how long shutdown waits for in-flight deliveries
    #[serde(deserialize_with = "deserialize_secs")]
    pub shutdown_timeout: Duration,
    /// max deliveries in flight
    pub max_in_flight: usize,
    /// batches waiting for an in-flight slot; further batches are dropped
    pub max_queued: usize,
    /// resource labels attached ahead of every record's labels
    pub resource: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            disabled: false,
            period: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            max_in_flight: 4,
            max_queued: 4,
            resource: BTreeMap::new(),
        }
    }
}

impl Config {
    /// create new config with default parameters.
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            ..Default::default()
        }
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_max_queued(mut self, max_queued: usize) -> Self {
        self.max_queued = max_queued;
        self
    }

    pub fn with_resource_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.resource.insert(key.into(), value.into());
        self
    }

    /// Fills unset fields from `UPTRACE_DSN` and `UPTRACE_DISABLED`.
    pub fn init(&mut self) {
        self.init_from(|key| std::env::var(key).ok());
    }

    fn init_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.dsn.trim().is_empty() {
            if let Some(dsn) = lookup(DSN_ENV) {
                self.dsn = dsn;
            }
        }
        if let Some(disabled) = lookup(DISABLED_ENV) {
            let disabled = disabled.trim().to_lowercase();
            if matches!(disabled.as_str(), "1" | "true" | "yes") {
                self.disabled = true;
            }
        }
        if self.max_in_flight == 0 {
            self.max_in_flight = 1;
        }
    }

    /// Resource built from the configured labels.
    pub fn resource(&self) -> Resource {
        Resource::new(
            self.resource
                .iter()
                .map(|(key, value)| KeyValue::new(key.as_str(), value.as_str())),
        )
    }
}

/// Accepts seconds as a number (`2.5`) or a string (`"2.5"`).
fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrFloat {
        String(String),
        Float(f64),
    }

    let secs = match StringOrFloat::deserialize(deserializer)? {
        StringOrFloat::String(s) => match s.trim().parse::<f64>() {
            Ok(secs) => secs,
            Err(e) => {
                let msg = format!("Failed to parse seconds from string '{s}': {e}");
                return Err(serde::de::Error::custom(msg));
            }
        },
        StringOrFloat::Float(f) => f,
    };
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
