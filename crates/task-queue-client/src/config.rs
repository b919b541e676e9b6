use serde::{Deserialize, Serialize};

/// Broker connection settings; `transport` selects the client variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum BrokerConfig {
    Tcp {
        address: String,
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },
    InMemory,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig::Tcp {
            address: "127.0.0.1:6379".to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
        }
    }
}

/// Manager connection settings; `transport` selects the client variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ManagerConfig {
    Tcp { address: String },
    InMemory,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig::Tcp {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}
