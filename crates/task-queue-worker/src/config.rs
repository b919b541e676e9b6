use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use task_queue_client::{BrokerConfig, ManagerConfig};

/// Worker application configuration, fixed for the lifetime of a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerApplicationConfig {
    /// Worker name, unique per deployment
    pub name: String,
    pub broker: BrokerConfig,
    pub manager: ManagerConfig,
    pub log_level: String,
}

impl Default for WorkerApplicationConfig {
    fn default() -> Self {
        WorkerApplicationConfig {
            name: generate_worker_name(),
            broker: BrokerConfig::default(),
            manager: ManagerConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl WorkerApplicationConfig {
    pub fn new(name: impl Into<String>, broker: BrokerConfig, manager: ManagerConfig) -> Self {
        WorkerApplicationConfig {
            name: name.into(),
            broker,
            manager,
            log_level: "info".to_string(),
        }
    }

    /// Load from an optional file, then `TQ_`-prefixed environment variables
    /// (nested keys separated by `__`, e.g. `TQ_BROKER__ADDRESS`)
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("TQ")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize()
    }
}

/// `<hostname>-<pid>-<random>`
pub fn generate_worker_name() -> String {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let pid = std::process::id();
    let random = uuid::Uuid::new_v4().simple().to_string();

    format!("{}-{}-{}", hostname, pid, &random[..8])
}
