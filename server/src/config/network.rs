use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use super::ConfigError;
use crate::models::Address;

/// Per-network deployment entry of the dapp's `config.json`
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub url: String,
    #[serde(default)]
    pub ws_url: Option<String>,
    pub app_address: Address,
    #[serde(default)]
    pub data_address: Option<Address>,
}

impl NetworkConfig {
    pub fn load(path: &Path, network: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content, network)
    }

    pub fn from_json_str(content: &str, network: &str) -> Result<Self, ConfigError> {
        let mut networks: HashMap<String, Value> =
            serde_json::from_str(content).map_err(ConfigError::Parse)?;

        let entry = networks
            .remove(network)
            .ok_or_else(|| ConfigError::UnknownNetwork(network.to_string()))?;

        let config: NetworkConfig =
            serde_json::from_value(entry).map_err(|source| ConfigError::InvalidNetwork {
                network: network.to_string(),
                source,
            })?;

        if config.url.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "network {network} has an empty url"
            )));
        }

        Ok(config)
    }

    /// WebSocket endpoint for log subscriptions. Falls back to the HTTP url
    /// with its scheme swapped (`http` -> `ws`, `https` -> `wss`).
    pub fn websocket_url(&self) -> String {
        if let Some(ws_url) = &self.ws_url {
            return ws_url.clone();
        }

        match self.url.strip_prefix("http") {
            Some(rest) => format!("ws{rest}"),
            None => self.url.clone(),
        }
    }
}
