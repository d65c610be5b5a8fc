use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Filter used when `RUST_LOG` is not set
    pub log_level: String,
    /// IANA zone rules are evaluated in, e.g. "Europe/Berlin". Detected from
    /// the system when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), time_zone: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbusConfig {
    pub service_name: String,
    pub object_path: String,
    /// Register on the system bus instead of the session bus
    pub system_bus: bool,
}

impl Default for DbusConfig {
    fn default() -> Self {
        Self {
            service_name: "org.dots.FocusDaemon".to_string(),
            object_path: "/org/dots/FocusDaemon".to_string(),
            system_bus: false,
        }
    }
}
