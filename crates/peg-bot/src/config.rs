//! Application configuration.

use std::path::Path;
use std::time::Duration;

use alloy::primitives::Address;
use peg_core::{Price, Size, TradeSizingConfig};
use peg_gateway::GatewayConfig;
use peg_optimizer::OptimizerConfig;
use peg_risk::CircuitBreakerConfig;
use peg_ws::{FeedConfig, PRICE_UPDATE_EVENT};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Feed/gateway API key.
pub const API_KEY_ENV: &str = "PEG_API_KEY";
/// Hex private key of the trading account.
pub const TRADING_KEY_ENV: &str = "PEG_TRADING_KEY";

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSection {
    #[serde(default = "default_feed_url")]
    pub url: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_event_types")]
    pub event_types: Vec<String>,
}

fn default_feed_url() -> String {
    "wss://ws.tatum.io/v3/polygon".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_event_types() -> Vec<String> {
    vec![PRICE_UPDATE_EVENT.to_string()]
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            event_types: default_event_types(),
        }
    }
}

impl FeedSection {
    pub fn to_feed_config(&self, api_key: Option<String>) -> FeedConfig {
        FeedConfig {
            url: self.url.clone(),
            api_key,
            reconnect_delay_ms: self.reconnect_delay_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSection {
    /// Stable token contract address (0x...).
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Decimals of `getLatestPrice()`.
    #[serde(default = "default_price_decimals")]
    pub price_decimals: u32,
    /// If set, the loaded trading key must derive this address.
    #[serde(default)]
    pub trading_address: Option<String>,
}

fn default_chain_id() -> u64 {
    137
}

fn default_price_decimals() -> u32 {
    8
}

impl Default for ContractSection {
    fn default() -> Self {
        Self {
            address: String::new(),
            chain_id: default_chain_id(),
            price_decimals: default_price_decimals(),
            trading_address: None,
        }
    }
}

impl ContractSection {
    pub fn contract_address(&self) -> AppResult<Address> {
        parse_address("contract.address", &self.address)
    }

    pub fn expected_trading_address(&self) -> AppResult<Option<Address>> {
        self.trading_address
            .as_deref()
            .map(|a| parse_address("contract.trading_address", a))
            .transpose()
    }
}

fn parse_address(field: &str, value: &str) -> AppResult<Address> {
    value
        .parse()
        .map_err(|e| AppError::Config(format!("invalid {field} {value:?}: {e}")))
}

/// Admission, sizing and execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default)]
    pub sizing: TradeSizingConfig,
    /// Smallest |price - target| worth trading once a trade has happened.
    #[serde(default = "default_min_deviation")]
    pub min_deviation: Decimal,
    #[serde(default = "default_min_trade_interval_secs")]
    pub min_trade_interval_secs: u64,
    #[serde(default = "default_min_trade_size")]
    pub min_trade_size: Size,
    /// Horizon handed to the optimizer when planning.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    /// Plan and log without signing or broadcasting.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_min_deviation() -> Decimal {
    dec!(0.01)
}

fn default_min_trade_interval_secs() -> u64 {
    300
}

fn default_min_trade_size() -> Size {
    Size::new(dec!(100))
}

fn default_max_wait_secs() -> u64 {
    300
}

fn default_receipt_poll_interval_ms() -> u64 {
    2000
}

fn default_receipt_timeout_secs() -> u64 {
    120
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            sizing: TradeSizingConfig::default(),
            min_deviation: default_min_deviation(),
            min_trade_interval_secs: default_min_trade_interval_secs(),
            min_trade_size: default_min_trade_size(),
            max_wait_secs: default_max_wait_secs(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
            dry_run: false,
        }
    }
}

impl TradingConfig {
    pub fn target_price(&self) -> Price {
        self.sizing.target_price
    }

    pub fn min_trade_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.min_trade_interval_secs as i64)
    }

    pub fn max_wait(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_wait_secs as i64)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

/// Periodic background tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
    #[serde(default = "default_gas_sample_interval_secs")]
    pub gas_sample_interval_secs: u64,
}

fn default_status_interval_secs() -> u64 {
    60
}

fn default_prune_interval_secs() -> u64 {
    60
}

fn default_gas_sample_interval_secs() -> u64 {
    30
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: default_status_interval_secs(),
            prune_interval_secs: default_prune_interval_secs(),
            gas_sample_interval_secs: default_gas_sample_interval_secs(),
        }
    }
}

impl MaintenanceConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs.max(1))
    }

    pub fn gas_sample_interval(&self) -> Duration {
        Duration::from_secs(self.gas_sample_interval_secs.max(1))
    }
}

// ============================================================================
// AppConfig
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub contract: ContractSection,
    #[serde(default)]
    pub risk: CircuitBreakerConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

impl AppConfig {
    /// Load, apply environment secrets and validate.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {}: {e}", path.display())))?;

        let mut config = Self::from_toml(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Pull the API key from the environment.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.gateway.api_key = Some(key);
            }
        }
    }

    pub fn api_key(&self) -> Option<String> {
        self.gateway.api_key.clone()
    }

    pub fn validate(&self) -> AppResult<()> {
        self.risk.validate()?;
        self.optimizer.validate()?;
        self.contract.contract_address()?;
        self.contract.expected_trading_address()?;

        if self.feed.event_types.is_empty() {
            return Err(AppError::Config("feed.event_types must not be empty".to_string()));
        }
        if self.trading.min_trade_size.inner() < Decimal::ZERO {
            return Err(AppError::Config("trading.min_trade_size must not be negative".to_string()));
        }
        if self.trading.receipt_poll_interval_ms == 0 {
            return Err(AppError::Config(
                "trading.receipt_poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [contract]
        address = "0x1111111111111111111111111111111111111111"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.feed.event_types, vec!["PRICE_UPDATE"]);
        assert_eq!(config.feed.reconnect_delay_ms, 5000);
        assert_eq!(config.gateway.min_spacing_ms, 200);
        assert_eq!(config.risk.cooldown_secs, 900);
        assert_eq!(config.trading.min_trade_size, Size::new(dec!(100)));
        assert_eq!(config.trading.max_wait(), chrono::Duration::seconds(300));
        assert_eq!(config.trading.target_price(), Price::ONE);
        assert_eq!(config.contract.chain_id, 137);
        assert!(!config.trading.dry_run);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_toml(
            r#"
            [contract]
            address = "0x1111111111111111111111111111111111111111"

            [trading]
            dry_run = true
            min_trade_interval_secs = 60

            [trading.sizing]
            max_fraction = "0.02"

            [risk]
            volatility_threshold = "0.08"
            "#,
        )
        .unwrap();

        assert!(config.trading.dry_run);
        assert_eq!(config.trading.min_trade_interval_secs, 60);
        assert_eq!(config.trading.sizing.max_fraction, dec!(0.02));
        assert_eq!(config.risk.volatility_threshold, dec!(0.08));
    }

    #[test]
    fn test_missing_contract_address_is_config_error() {
        let config = AppConfig::from_toml("").unwrap();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            AppConfig::from_toml("[trading\n"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_feed_config_carries_api_key() {
        let feed = FeedSection::default().to_feed_config(Some("k".to_string()));
        assert_eq!(feed.endpoint(), "wss://ws.tatum.io/v3/polygon?apiKey=k");
    }
}
