use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // MQTT configuration
    /// Broker host
    #[serde(default = "default_mqtt_broker_host")]
    pub mqtt_broker_host: String,

    /// Broker port
    #[serde(default = "default_mqtt_broker_port")]
    pub mqtt_broker_port: u16,

    /// Client identifier presented to the broker
    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    /// Sensor telemetry topic
    #[serde(default = "default_sensor_topic")]
    pub sensor_topic: String,

    /// Control command topic
    #[serde(default = "default_control_topic")]
    pub control_topic: String,

    /// Reconnect attempts before the subscriber gives up
    #[serde(default = "default_mqtt_max_retry_attempts")]
    pub mqtt_max_retry_attempts: u32,

    /// Delay between reconnect attempts in seconds
    #[serde(default = "default_mqtt_retry_delay_secs")]
    pub mqtt_retry_delay_secs: u64,

    // Workflow configuration
    /// Decision workflow run endpoint
    #[serde(default = "default_workflow_url")]
    pub workflow_url: String,

    /// Bearer credential for the workflow endpoint
    #[serde(default = "default_workflow_api_key")]
    pub workflow_api_key: String,

    /// Static user identifier sent with every run
    #[serde(default = "default_workflow_user_id")]
    pub workflow_user_id: String,

    /// Request timeout in seconds
    #[serde(default = "default_workflow_timeout_secs")]
    pub workflow_timeout_secs: u64,

    /// Retries when the workflow returns no control output
    #[serde(default = "default_max_empty_retries")]
    pub max_empty_retries: u32,

    /// Retries when the workflow answers HTTP 429
    #[serde(default = "default_rate_limit_max_retries")]
    pub rate_limit_max_retries: u32,

    /// Cap on the exponential retry backoff in seconds
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,

    // Deduplication windows
    /// Suppression window for pairs already committed, in seconds
    #[serde(default = "default_recent_success_window_secs")]
    pub recent_success_window_secs: u64,

    /// TTL for outstanding workflow calls, in seconds
    #[serde(default = "default_in_flight_ttl_secs")]
    pub in_flight_ttl_secs: u64,

    // Control log
    /// Path of the persisted control log
    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// Newest entries kept per save cycle
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Entries older than this many days are pruned
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_log_level() -> String {
    "info".to_string()
}

// MQTT defaults
fn default_mqtt_broker_host() -> String {
    "broker.emqx.io".to_string()
}

fn default_mqtt_broker_port() -> u16 {
    1883
}

fn default_mqtt_client_id() -> String {
    "tandem-correlator".to_string()
}

fn default_sensor_topic() -> String {
    "plc/sensordata".to_string()
}

fn default_control_topic() -> String {
    "plc/control_cmd".to_string()
}

fn default_mqtt_max_retry_attempts() -> u32 {
    5
}

fn default_mqtt_retry_delay_secs() -> u64 {
    10
}

// Workflow defaults
fn default_workflow_url() -> String {
    "http://localhost:5001/v1/workflows/run".to_string()
}

fn default_workflow_api_key() -> String {
    "change-me".to_string()
}

fn default_workflow_user_id() -> String {
    "abc-123".to_string()
}

fn default_workflow_timeout_secs() -> u64 {
    30
}

fn default_max_empty_retries() -> u32 {
    3
}

fn default_rate_limit_max_retries() -> u32 {
    2
}

fn default_backoff_cap_secs() -> u64 {
    30
}

// Deduplication defaults
fn default_recent_success_window_secs() -> u64 {
    120
}

fn default_in_flight_ttl_secs() -> u64 {
    300
}

// Control log defaults
fn default_log_file() -> String {
    "control_log.json".to_string()
}

fn default_max_history() -> usize {
    1000
}

fn default_retention_days() -> i64 {
    7
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("TANDEM"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure tests run serially and don't interfere with each other
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        std::env::remove_var("TANDEM_SENSOR_TOPIC");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.sensor_topic, "plc/sensordata");
        assert_eq!(config.control_topic, "plc/control_cmd");
        assert_eq!(config.recent_success_window_secs, 120);
        assert_eq!(config.in_flight_ttl_secs, 300);
        assert_eq!(config.max_history, 1000);
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        std::env::set_var("TANDEM_SENSOR_TOPIC", "factory/telemetry");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.sensor_topic, "factory/telemetry");

        std::env::remove_var("TANDEM_SENSOR_TOPIC");
    }
}
