use std::{net::SocketAddr, path::PathBuf};

use serde::Deserialize;
use url::Url;

use crate::auth::TrustLevel;

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub listen_address: Option<SocketAddr>,
    /// SQLite connection string, e.g. `sqlite://data/market.db`.
    pub db: String,
    pub storage: StorageConfig,
    pub broker: BrokerConfig,
    pub mail: Option<MailConfig>,
    #[serde(default)]
    pub fanout: FanOutConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    pub metrics: Option<MetricConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for uploaded files.
    pub path: PathBuf,
    /// Public prefix under which `path` is served.
    pub base_url: Url,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BrokerConfig {
    /// Base URL of the upload-token broker.
    pub url: Url,
    #[serde(default = "default_broker_timeout")]
    pub timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MailConfig {
    /// Mail relay endpoint accepting one JSON message per request.
    pub url: Url,
    pub sender: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct FanOutConfig {
    /// Rows per transaction. Capped per payload so one insert stays under SQLite's bind limit.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Trust thresholds gating each class of mutation.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyConfig {
    #[serde(default = "TrustLevel::reviewer")]
    pub review: TrustLevel,
    #[serde(default = "TrustLevel::operator")]
    pub operate: TrustLevel,
    #[serde(default = "TrustLevel::administrator")]
    pub edit_others: TrustLevel,
    /// Alternate mirrors added by an actor at or above this level skip review.
    #[serde(default = "TrustLevel::reviewer")]
    pub mirror_auto_approve: TrustLevel,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            review: TrustLevel::reviewer(),
            operate: TrustLevel::operator(),
            edit_others: TrustLevel::administrator(),
            mirror_auto_approve: TrustLevel::reviewer(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PrometheusConfig {
    /// The URL of the Prometheus server's exporter endpoint.
    pub url: Url,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum MetricConfig {
    PrometheusPush(PrometheusConfig),
}

const fn default_batch_size() -> usize {
    500
}

const fn default_broker_timeout() -> u64 {
    10
}
