//! Connection configuration.
//!
//! A [`QueueConfig`] is built once, validated when the manager connects, and
//! never changes afterwards. It can come from code, from the queue-worker
//! environment variables, or from a TOML document.

use crate::error::{QueueError, Result};
use crate::proto;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Topic used when neither the config nor the request names one.
pub const DEFAULT_TOPIC: &str = "faas-request";
pub const DEFAULT_PORT: u16 = 4222;
pub const DEFAULT_MAX_RECONNECT: u32 = 120;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

const SCHEMES: &[&str] = &["nats", "tcp", "ws", "wss", "memory"];

/// Identity, location and retry policy for one backend session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Session identity presented to the backend.
    pub client_id: String,
    /// Backend cluster the session belongs to.
    pub cluster_id: String,
    /// Backend URL, e.g. `nats://nats:4222`.
    pub url: String,
    /// Default queue for requests without an override.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Attempts made after a disconnect before giving up.
    #[serde(default = "default_max_reconnect")]
    pub max_reconnect: u32,
    /// Unit of the linear backoff between reconnect attempts.
    #[serde(default = "default_reconnect_delay", with = "humantime_serde")]
    pub reconnect_delay: Duration,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_max_reconnect() -> u32 {
    DEFAULT_MAX_RECONNECT
}

fn default_reconnect_delay() -> Duration {
    DEFAULT_RECONNECT_DELAY
}

impl QueueConfig {
    /// Config for `nats://address:port`. An empty `channel` selects
    /// [`DEFAULT_TOPIC`].
    pub fn new(
        address: &str,
        port: u16,
        cluster_id: impl Into<String>,
        channel: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        let channel = channel.into();
        Self {
            client_id: client_id.into(),
            cluster_id: cluster_id.into(),
            url: format!("nats://{address}:{port}"),
            topic: if channel.is_empty() {
                default_topic()
            } else {
                channel
            },
            max_reconnect: DEFAULT_MAX_RECONNECT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_max_reconnect(mut self, attempts: u32) -> Self {
        self.max_reconnect = attempts;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Wait before reconnect attempt `attempt` (0-based): `attempt × delay`.
    pub fn reconnect_wait(&self, attempt: u32) -> Duration {
        self.reconnect_delay.saturating_mul(attempt)
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(invalid("client_id must not be empty"));
        }
        if self.cluster_id.trim().is_empty() {
            return Err(invalid("cluster_id must not be empty"));
        }
        if let Err(e) = proto::validate_subject(&self.topic) {
            return Err(invalid(format!("topic: {e}")));
        }

        let url = url::Url::parse(&self.url)
            .map_err(|e| invalid(format!("url {:?}: {e}", self.url)))?;
        if !SCHEMES.contains(&url.scheme()) {
            return Err(invalid(format!(
                "url scheme {:?} is not one of {}",
                url.scheme(),
                SCHEMES.join(", ")
            )));
        }
        if url.scheme() != "memory" && url.host_str().is_none_or(str::is_empty) {
            return Err(invalid(format!("url {:?} has no host", self.url)));
        }
        Ok(())
    }

    /// Read the queue-worker environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let address = var("faas_nats_address").unwrap_or_else(|| "nats".to_string());
        let port = match var("faas_nats_port") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| invalid(format!("faas_nats_port: {raw:?} is not a port")))?,
            None => DEFAULT_PORT,
        };
        let cluster = var("faas_nats_cluster_name").unwrap_or_else(|| "faas-cluster".to_string());
        let channel = var("faas_nats_channel").unwrap_or_default();
        let client_id =
            var("faas_client_id").unwrap_or_else(|| format!("faas-publisher-{}", std::process::id()));

        let mut config = Self::new(&address, port, cluster, channel, client_id);
        if let Some(raw) = var("faas_max_reconnect") {
            config.max_reconnect = raw
                .trim()
                .parse()
                .map_err(|_| invalid(format!("faas_max_reconnect: {raw:?} is not a count")))?;
        }
        if let Some(raw) = var("faas_reconnect_delay") {
            config.reconnect_delay = humantime::parse_duration(raw.trim())
                .map_err(|e| invalid(format!("faas_reconnect_delay: {raw:?}: {e}")))?;
        }
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(msg: impl Into<String>) -> QueueError {
    QueueError::InvalidConfig(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_channel_uses_default_topic() {
        let config = QueueConfig::new("nats", 4222, "faas-cluster", "", "gw-1");
        assert_eq!(config.topic, DEFAULT_TOPIC);
        assert_eq!(config.url, "nats://nats:4222");
        config.validate().unwrap();
    }

    #[test]
    fn linear_backoff() {
        let config = QueueConfig::new("nats", 4222, "c", "q", "id")
            .with_reconnect_delay(Duration::from_secs(1));
        assert_eq!(config.reconnect_wait(0), Duration::ZERO);
        assert_eq!(config.reconnect_wait(1), Duration::from_secs(1));
        assert_eq!(config.reconnect_wait(4), Duration::from_secs(4));
    }

    #[test]
    fn rejects_bad_configs() {
        let good = QueueConfig::new("nats", 4222, "c", "q", "id");
        assert!(good.clone().with_url("http://nats:4222").validate().is_err());
        assert!(good.clone().with_url("not a url").validate().is_err());
        assert!(good.clone().with_topic("two words").validate().is_err());

        let mut no_client = good.clone();
        no_client.client_id = " ".into();
        assert!(matches!(no_client.validate(), Err(QueueError::InvalidConfig(_))));

        let mut no_cluster = good;
        no_cluster.cluster_id.clear();
        assert!(no_cluster.validate().is_err());
    }

    #[test]
    fn env_defaults() {
        let config = QueueConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.url, "nats://nats:4222");
        assert_eq!(config.cluster_id, "faas-cluster");
        assert_eq!(config.topic, DEFAULT_TOPIC);
        assert_eq!(config.max_reconnect, DEFAULT_MAX_RECONNECT);
        assert_eq!(config.reconnect_delay, DEFAULT_RECONNECT_DELAY);
        assert!(config.client_id.starts_with("faas-publisher-"));
    }

    #[test]
    fn env_overrides() {
        let config = QueueConfig::from_lookup(lookup(&[
            ("faas_nats_address", "queue.internal"),
            ("faas_nats_port", "4333"),
            ("faas_nats_cluster_name", "prod"),
            ("faas_nats_channel", "gpu-requests"),
            ("faas_client_id", "gateway-7"),
            ("faas_max_reconnect", "5"),
            ("faas_reconnect_delay", "250ms"),
        ]))
        .unwrap();
        assert_eq!(config.url, "nats://queue.internal:4333");
        assert_eq!(config.cluster_id, "prod");
        assert_eq!(config.topic, "gpu-requests");
        assert_eq!(config.client_id, "gateway-7");
        assert_eq!(config.max_reconnect, 5);
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
    }

    #[test]
    fn env_rejects_garbage() {
        assert!(QueueConfig::from_lookup(lookup(&[("faas_nats_port", "99999")])).is_err());
        assert!(QueueConfig::from_lookup(lookup(&[("faas_max_reconnect", "-1")])).is_err());
        assert!(QueueConfig::from_lookup(lookup(&[("faas_reconnect_delay", "soon")])).is_err());
    }

    #[test]
    fn env_delay_takes_go_style_units() {
        let delay = |raw: &str| {
            QueueConfig::from_lookup(lookup(&[("faas_reconnect_delay", raw)]))
                .map(|c| c.reconnect_delay)
        };
        assert_eq!(delay("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(delay("1500ms").unwrap(), Duration::from_millis(1500));
        assert_eq!(delay("500us").unwrap(), Duration::from_micros(500));
        assert_eq!(delay("250ns").unwrap(), Duration::from_nanos(250));
        assert_eq!(delay("1m 30s").unwrap(), Duration::from_secs(90));
        assert!(delay("s").is_err());
        assert!(delay("5 fortnights").is_err());
    }

    #[test]
    fn sub_millisecond_delay_survives_toml() {
        let config = QueueConfig::new("nats", 4222, "c", "q", "id")
            .with_reconnect_delay(Duration::from_micros(1500));
        let text = toml::to_string(&config).unwrap();
        let back = QueueConfig::from_toml(&text).unwrap();
        assert_eq!(back.reconnect_delay, Duration::from_micros(1500));
    }

    #[test]
    fn toml_document() {
        let config = QueueConfig::from_toml(
            r#"
            client_id = "gateway"
            cluster_id = "faas-cluster"
            url = "ws://nats:8080"
            max_reconnect = 3
            reconnect_delay = "1s"
            "#,
        )
        .unwrap();
        assert_eq!(config.topic, DEFAULT_TOPIC);
        assert_eq!(config.max_reconnect, 3);
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));

        let text = toml::to_string(&config).unwrap();
        assert_eq!(QueueConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn toml_is_validated() {
        let err = QueueConfig::from_toml(
            r#"
            client_id = ""
            cluster_id = "c"
            url = "nats://nats:4222"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, QueueError::InvalidConfig(_)));
    }
}
