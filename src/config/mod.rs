use crate::message::MessageTemplate;
use crate::notify::ParseMode;
use alloy::primitives::Address;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
    #[error("invalid {field}: {value}")]
    Invalid { field: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub message: MessageConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint; `ws(s)://` switches to pubsub - env RPC_URL
    #[serde(default)]
    pub rpc_url: String,
    /// Chain the endpoint must serve (56 = BNB Smart Chain) - env CHAIN_ID
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Raffle contract - env RAFFLE_ADDRESS
    #[serde(default)]
    pub raffle_address: String,
    /// Ticket token contract - env BUNNY_ADDRESS
    #[serde(default)]
    pub token_address: String,
    /// ABI artifact of the raffle contract
    #[serde(default = "default_raffle_abi_path")]
    pub raffle_abi_path: PathBuf,
    /// ABI artifact of the token contract
    #[serde(default = "default_token_abi_path")]
    pub token_abi_path: PathBuf,
    /// Log polling interval for HTTP endpoints
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot API base URL
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
    /// Bot token - env TELEGRAM_TOKEN
    #[serde(default)]
    pub token: String,
    /// Destination chat or channel id - env CHAT_ID
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub parse_mode: ParseMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageConfig {
    /// Video attached to every notification (path or URL)
    #[serde(default = "default_media")]
    pub media: String,
    /// Ticker of the native currency the prize pool is held in
    #[serde(default = "default_native_symbol")]
    pub native_symbol: String,
    #[serde(default = "default_play_url")]
    pub play_url: String,
    /// Explorer base; the raffle address page is linked
    #[serde(default = "default_explorer_url")]
    pub explorer_url: String,
    #[serde(default = "default_social_url")]
    pub social_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Wait before re-registering a failed subscription.
    #[serde(default = "default_resubscribe_delay_secs")]
    pub resubscribe_delay_secs: u64,
    /// Wait between an uncaught fault and process exit.
    #[serde(default = "default_restart_delay_secs")]
    pub restart_delay_secs: u64,
    /// Concurrent event handlers (0 = unbounded).
    #[serde(default)]
    pub max_concurrent_handlers: usize,
    /// Read raffle state at the event's block instead of the latest one.
    #[serde(default)]
    pub read_at_event_block: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_chain_id() -> u64 {
    56
}
fn default_raffle_abi_path() -> PathBuf {
    PathBuf::from("./BaseRaffle.json")
}
fn default_token_abi_path() -> PathBuf {
    PathBuf::from("./CashBunny.json")
}
fn default_poll_interval_ms() -> u64 {
    4_000
}
fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}
fn default_media() -> String {
    "./video.mp4".to_string()
}
fn default_native_symbol() -> String {
    "BNB".to_string()
}
fn default_play_url() -> String {
    "https://cashbunny.fun/raffle".to_string()
}
fn default_explorer_url() -> String {
    "https://bscscan.com".to_string()
}
fn default_social_url() -> String {
    "https://x.com/CashBunnydotfun".to_string()
}
fn default_resubscribe_delay_secs() -> u64 {
    crate::relay::RESUBSCRIBE_DELAY.as_secs()
}
fn default_restart_delay_secs() -> u64 {
    crate::relay::fault::RESTART_DELAY.as_secs()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            chain_id: default_chain_id(),
            raffle_address: String::new(),
            token_address: String::new(),
            raffle_abi_path: default_raffle_abi_path(),
            token_abi_path: default_token_abi_path(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: default_telegram_api_url(),
            token: String::new(),
            chat_id: String::new(),
            parse_mode: ParseMode::default(),
        }
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            media: default_media(),
            native_symbol: default_native_symbol(),
            play_url: default_play_url(),
            explorer_url: default_explorer_url(),
            social_url: default_social_url(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            resubscribe_delay_secs: default_resubscribe_delay_secs(),
            restart_delay_secs: default_restart_delay_secs(),
            max_concurrent_handlers: 0,
            read_at_event_block: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl ChainConfig {
    pub fn raffle_address(&self) -> Result<Address, ConfigError> {
        parse_address("chain.raffle_address", &self.raffle_address)
    }

    pub fn token_address(&self) -> Result<Address, ConfigError> {
        parse_address("chain.token_address", &self.token_address)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl RelayConfig {
    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_secs(self.resubscribe_delay_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }
}

impl MessageConfig {
    /// Template with the explorer link pointing at `raffle_address`, spelled
    /// the way it was configured.
    pub fn template(&self, raffle_address: &str) -> MessageTemplate {
        MessageTemplate {
            native_symbol: self.native_symbol.clone(),
            play_url: self.play_url.clone(),
            explorer_url: format!(
                "{}/address/{}",
                self.explorer_url.trim_end_matches('/'),
                raffle_address
            ),
            social_url: self.social_url.clone(),
            media: self.media.clone(),
        }
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    Address::from_str(value.trim()).map_err(|_| ConfigError::Invalid {
        field,
        value: value.to_string(),
    })
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.overlay(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment variables (no file needed).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.overlay(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply deployment values and secrets from `lookup` (never stored in the
    /// config file).
    pub fn overlay(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = lookup("RPC_URL") {
            self.chain.rpc_url = url;
        }
        if let Some(id) = lookup("CHAIN_ID") {
            self.chain.chain_id = id.trim().parse().map_err(|_| ConfigError::Invalid {
                field: "CHAIN_ID",
                value: id.clone(),
            })?;
        }
        if let Some(addr) = lookup("RAFFLE_ADDRESS") {
            self.chain.raffle_address = addr;
        }
        if let Some(addr) = lookup("BUNNY_ADDRESS") {
            self.chain.token_address = addr;
        }
        if let Some(token) = lookup("TELEGRAM_TOKEN") {
            self.telegram.token = token;
        }
        if let Some(chat) = lookup("CHAT_ID") {
            self.telegram.chat_id = chat;
        }
        Ok(())
    }

    /// Every required value is present and the addresses parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("RPC_URL", &self.chain.rpc_url),
            ("RAFFLE_ADDRESS", &self.chain.raffle_address),
            ("BUNNY_ADDRESS", &self.chain.token_address),
            ("TELEGRAM_TOKEN", &self.telegram.token),
            ("CHAT_ID", &self.telegram.chat_id),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConfigError::MissingEnv(name.to_string()));
        }
        self.chain.raffle_address()?;
        self.chain.token_address()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chain: ChainConfig::default(),
            telegram: TelegramConfig::default(),
            message: MessageConfig::default(),
            relay: RelayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
