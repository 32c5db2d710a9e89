use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TrackerConfig {
    pub facility_id: String,
    pub backend: BackendConf,
    pub poll: PollConf,
    pub map: MapConf,
    pub http: HttpConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BackendConf {
    pub base_url: String, // ex: "http://localhost:3000/api"
    pub timeout_ms: u64,
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PollConf {
    pub interval_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MapBackend {
    Scene,
    Mqtt,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MapConf {
    pub backend: MapBackend,
    pub init_timeout_ms: u64,
    pub mqtt: MapMqttConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MapMqttConf {
    pub host: String,
    pub port: u16,
    pub command_topic: String,
    pub click_topic: String,
    /// Commandes tamponnées pendant une coupure broker avant échec de publication
    pub queue_capacity: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub listen: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("facility_id is required")]
    MissingFacility,
    #[error("poll.interval_ms must be > 0")]
    ZeroInterval,
    #[error("backend.base_url is required")]
    MissingBackend,
    #[error("map.mqtt.queue_capacity must be > 0")]
    ZeroQueue,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            facility_id: String::new(),
            backend: BackendConf::default(),
            poll: PollConf::default(),
            map: MapConf::default(),
            http: HttpConf::default(),
        }
    }
}

impl Default for BackendConf {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".into(),
            timeout_ms: 4_000,
            token: None,
        }
    }
}

impl Default for PollConf {
    fn default() -> Self {
        Self { interval_ms: 5_000 }
    }
}

impl Default for MapConf {
    fn default() -> Self {
        Self {
            backend: MapBackend::Scene,
            init_timeout_ms: 5_000,
            mqtt: MapMqttConf::default(),
        }
    }
}

impl Default for MapMqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            command_topic: "dispatch/map/command@v1".into(),
            click_topic: "dispatch/map/click@v1".into(),
            queue_capacity: 4_096,
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { listen: "0.0.0.0:8080".into() }
    }
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll.interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.facility_id.trim().is_empty() {
            return Err(ConfigError::MissingFacility);
        }
        if self.poll.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::MissingBackend);
        }
        if self.map.backend == MapBackend::Mqtt && self.map.mqtt.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueue);
        }
        Ok(())
    }

    /// Variables d'env prioritaires sur le fichier
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("DISPATCH_FACILITY_ID") {
            self.facility_id = v;
        }
        if let Some(v) = lookup("DISPATCH_BACKEND_URL") {
            self.backend.base_url = v;
        }
        if let Some(v) = lookup("DISPATCH_BACKEND_TOKEN") {
            self.backend.token = Some(v);
        }
    }
}

pub fn parse_config(txt: &str) -> TrackerConfig {
    if txt.trim().is_empty() {
        return TrackerConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        warn!("[config] invalid config: {e}");
        TrackerConfig::default()
    })
}

pub async fn load_config() -> TrackerConfig {
    let path = std::env::var("DISPATCH_TRACKER_CONFIG").unwrap_or_else(|_| "tracker.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        parse_config(&txt)
    } else {
        warn!("[config] no {path}, using default config");
        TrackerConfig::default()
    };
    cfg.apply_env_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = TrackerConfig::default();
        assert_eq!(cfg.poll_interval(), Duration::from_millis(5_000));
        assert_eq!(cfg.map.backend, MapBackend::Scene);
        assert_eq!(cfg.map.mqtt.port, 1883);
        assert_eq!(cfg.map.mqtt.queue_capacity, 4_096);
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingFacility)));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = parse_config(
            r#"
facility_id: "hosp-42"
poll:
  interval_ms: 2500
map:
  backend: mqtt
  mqtt:
    host: broker.lan
    queue_capacity: 512
"#,
        );
        assert_eq!(cfg.facility_id, "hosp-42");
        assert_eq!(cfg.poll.interval_ms, 2500);
        assert_eq!(cfg.map.backend, MapBackend::Mqtt);
        assert_eq!(cfg.map.mqtt.host, "broker.lan");
        assert_eq!(cfg.map.mqtt.queue_capacity, 512);
        assert_eq!(cfg.map.mqtt.command_topic, "dispatch/map/command@v1");
        assert_eq!(cfg.backend.timeout_ms, 4_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_invalid_yaml_falls_back() {
        let cfg = parse_config("poll: [not, a, map]");
        assert_eq!(cfg.poll.interval_ms, 5_000);
        assert!(parse_config("   ").facility_id.is_empty());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut cfg = TrackerConfig::default();
        cfg.facility_id = "f".into();
        cfg.poll.interval_ms = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroInterval)));
    }

    #[test]
    fn test_zero_mqtt_queue_rejected() {
        let mut cfg = TrackerConfig::default();
        cfg.facility_id = "f".into();
        cfg.map.mqtt.queue_capacity = 0;
        assert!(cfg.validate().is_ok());
        cfg.map.backend = MapBackend::Mqtt;
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroQueue)));
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = TrackerConfig::default();
        cfg.apply_env_overrides(|key| match key {
            "DISPATCH_FACILITY_ID" => Some("fac-1".into()),
            "DISPATCH_BACKEND_TOKEN" => Some("secret".into()),
            _ => None,
        });
        assert_eq!(cfg.facility_id, "fac-1");
        assert_eq!(cfg.backend.token.as_deref(), Some("secret"));
        assert_eq!(cfg.backend.base_url, "http://localhost:3000/api");
    }
}
