use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ra_manager::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub device: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub retries: u32,           // Extra attempts after a timeout or UART error
    pub retry_backoff_ms: u64,  // Backoff grows linearly with the attempt number
    pub queue_depth: usize,     // Pending commands before callers have to wait
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            device: String::from("/dev/serial0"),
            baud_rate: 9600,
            read_timeout_ms: 2000,
            retries: 2,
            retry_backoff_ms: 100,
            queue_depth: 16,
        }
    }
}

impl SerialConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            retries: self.retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub listen: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            listen: String::from("0.0.0.0:8333"),
        }
    }
}

/// Used with --emulation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulationConfig {
    pub assigned_zones: Vec<u8>,
    pub randomize: bool,
    pub debug: bool,
}

impl Default for EmulationConfig {
    fn default() -> Self {
        EmulationConfig {
            assigned_zones: (1..=8).collect(),
            randomize: false,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub name: String,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default = "BridgeConfig::default_database")]
    pub database: String,
    #[serde(default)]
    pub emulation: EmulationConfig,
}

impl BridgeConfig {
    fn default_database() -> String {
        String::from("db.sqlite")
    }

    pub fn new(name: &str) -> BridgeConfig {
        BridgeConfig {
            name: name.to_owned(),
            serial: SerialConfig::default(),
            http: HttpConfig::default(),
            database: BridgeConfig::default_database(),
            emulation: EmulationConfig::default(),
        }
    }
}

#[test]
fn test_parse_config() {
    let config_json = String::from(
        r#"{
                "name": "House",
                "serial": {
                    "device": "/dev/ttyUSB0",
                    "read_timeout_ms": 500
                },
                "http": { "listen": "127.0.0.1:8080" }
            }
        "#);

    let config: BridgeConfig = serde_json::from_str(&config_json).unwrap();

    assert_eq!(config.serial.device, "/dev/ttyUSB0");
    assert_eq!(config.serial.baud_rate, 9600);
    assert_eq!(config.serial.retry_policy().read_timeout, Duration::from_millis(500));
    assert_eq!(config.http.listen, "127.0.0.1:8080");
    assert_eq!(config.database, "db.sqlite");
    assert_eq!(config.emulation.assigned_zones.len(), 8);
}
