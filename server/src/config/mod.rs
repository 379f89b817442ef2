//! Server configuration.
//!
//! Deployment addresses come from the dapp's `config.json` keyed by network
//! name; everything else is read from the environment (after `.env`).

use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

mod network;

pub use network::NetworkConfig;

const DEFAULT_CONFIG_PATH: &str = "config.json";
const DEFAULT_NETWORK: &str = "localhost";
const ONE_ETHER_WEI: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config file is not valid JSON: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("network {0} not found in config file")]
    UnknownNetwork(String),
    #[error("invalid entry for network {network}: {source}")]
    InvalidNetwork {
        network: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidVar {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Which ledger accounts act as oracles
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OracleSelection {
    /// Accounts to skip at the front of `eth_accounts` (owner, airlines, passengers)
    pub offset: usize,
    pub count: Option<usize>,
}

impl OracleSelection {
    pub fn select<T: Clone>(&self, accounts: &[T]) -> Vec<T> {
        let available = accounts.iter().skip(self.offset);
        match self.count {
            Some(count) => available.take(count).cloned().collect(),
            None => available.cloned().collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub network: String,
    pub ledger: NetworkConfig,
    pub host: IpAddr,
    pub port: u16,
    pub submission_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub subscription_ping_interval: Duration,
    pub subscription_idle_timeout: Duration,
    pub oracles: OracleSelection,
    pub register_oracles: bool,
    pub registration_fee_wei: u128,
    pub gas_limit: u64,
    pub registry_refresh: Option<Duration>,
    pub cors_allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = PathBuf::from(
            lookup("FLIGHTSURETY_CONFIG").unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string()),
        );
        let network =
            lookup("FLIGHTSURETY_NETWORK").unwrap_or_else(|| DEFAULT_NETWORK.to_string());
        let ledger = NetworkConfig::load(&config_path, &network)?;
        Self::with_network(network, ledger, lookup)
    }

    /// Like [`ServerConfig::from_lookup`] with the network entry already resolved.
    pub fn with_network<F>(
        network: String,
        ledger: NetworkConfig,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = parse_var(&lookup, "HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = parse_var(&lookup, "PORT", 3000u16)?;
        let submission_timeout =
            Duration::from_millis(parse_var(&lookup, "SUBMISSION_TIMEOUT_MS", 5_000u64)?);
        let reconnect_base =
            Duration::from_millis(parse_var(&lookup, "RECONNECT_BASE_MS", 500u64)?);
        let reconnect_max =
            Duration::from_millis(parse_var(&lookup, "RECONNECT_MAX_MS", 30_000u64)?);
        let subscription_ping_interval = Duration::from_millis(parse_var(
            &lookup,
            "SUBSCRIPTION_PING_INTERVAL_MS",
            15_000u64,
        )?);
        let subscription_idle_timeout = Duration::from_millis(parse_var(
            &lookup,
            "SUBSCRIPTION_IDLE_TIMEOUT_MS",
            45_000u64,
        )?);
        let offset = parse_var(&lookup, "ORACLE_ACCOUNT_OFFSET", 0usize)?;
        let count = parse_optional_var::<usize, _>(&lookup, "ORACLE_COUNT")?;
        let register_oracles = parse_bool_var(&lookup, "REGISTER_ORACLES", false)?;
        let registration_fee_wei =
            parse_var(&lookup, "ORACLE_REGISTRATION_FEE_WEI", ONE_ETHER_WEI)?;
        let gas_limit = parse_var(&lookup, "TX_GAS_LIMIT", 3_000_000u64)?;
        let registry_refresh = parse_optional_var::<u64, _>(&lookup, "REGISTRY_REFRESH_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:8000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        if submission_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "SUBMISSION_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }
        if reconnect_base.is_zero() || reconnect_max < reconnect_base {
            return Err(ConfigError::Invalid(
                "RECONNECT_BASE_MS must be positive and not exceed RECONNECT_MAX_MS".to_string(),
            ));
        }
        if subscription_ping_interval.is_zero()
            || subscription_idle_timeout <= subscription_ping_interval
        {
            return Err(ConfigError::Invalid(
                "SUBSCRIPTION_PING_INTERVAL_MS must be positive and below SUBSCRIPTION_IDLE_TIMEOUT_MS"
                    .to_string(),
            ));
        }

        Ok(Self {
            network,
            ledger,
            host,
            port,
            submission_timeout,
            reconnect_base,
            reconnect_max,
            subscription_ping_interval,
            subscription_idle_timeout,
            oracles: OracleSelection { offset, count },
            register_oracles,
            registration_fee_wei,
            gas_limit,
            registry_refresh,
            cors_allowed_origins,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_optional_var(lookup, key)?.unwrap_or(default))
}

fn parse_optional_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            match parsed {
                Ok(parsed) => Ok(Some(parsed)),
                Err(e) => Err(ConfigError::InvalidVar {
                    key,
                    reason: e.to_string(),
                    value,
                }),
            }
        }
    }
}

fn parse_bool_var<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidVar {
                key,
                value: v.clone(),
                reason: "expected a boolean".to_string(),
            }),
        },
    }
}
