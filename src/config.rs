use crate::devnet::{DEFAULT_MATURITY_DELAY, DevnetConfig, default_block_reward};
use crate::runtime::compaction::{
    CompactionConfig, DEFAULT_COMPACTION_INTERVAL, DEFAULT_COMPACTION_THRESHOLD,
};
use crate::service::{NetworkIdentifier, ServiceConfig};
use crate::types::{Address, Currency};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use std::{fs, io};

fn default_db_path() -> String {
    "./db".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_compaction_interval_secs() -> u64 {
    DEFAULT_COMPACTION_INTERVAL.as_secs()
}

fn default_compaction_threshold_bytes() -> u64 {
    DEFAULT_COMPACTION_THRESHOLD
}

fn default_maturity_delay() -> u64 {
    DEFAULT_MATURITY_DELAY
}

fn default_blockchain() -> String {
    "Sia".to_string()
}

fn default_network_name() -> String {
    "Mainnet".to_string()
}

fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSection {
    #[serde(default = "default_blockchain")]
    pub blockchain: String,
    #[serde(default = "default_network_name")]
    pub network: String,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self { blockchain: default_blockchain(), network: default_network_name() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevnetSection {
    #[serde(default = "default_maturity_delay")]
    pub maturity_delay: u64,
    /// 0 disables auto-mining.
    #[serde(default)]
    pub block_interval_ms: u64,
    #[serde(default)]
    pub payout_address: Option<String>,
    /// Base units, decimal.
    #[serde(default)]
    pub block_reward: Option<String>,
    #[serde(default)]
    pub peers: Vec<String>,
}

impl Default for DevnetSection {
    fn default() -> Self {
        Self {
            maturity_delay: default_maturity_delay(),
            block_interval_ms: 0,
            payout_address: None,
            block_reward: None,
            peers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_compaction_interval_secs")]
    pub compaction_interval_secs: u64,
    #[serde(default = "default_compaction_threshold_bytes")]
    pub compaction_threshold_bytes: u64,
    #[serde(default)]
    pub devnet: DevnetSection,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            port: default_port(),
            network: NetworkSection::default(),
            log_level: default_log_level(),
            request_timeout_ms: default_request_timeout_ms(),
            compaction_interval_secs: default_compaction_interval_secs(),
            compaction_threshold_bytes: default_compaction_threshold_bytes(),
            devnet: DevnetSection::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub network: NetworkIdentifier,
    pub log_level: String,
    pub request_timeout: Duration,
    pub compaction: CompactionConfig,
    pub devnet: DevnetConfig,
    /// `None` when blocks are only mined on demand.
    pub block_interval: Option<Duration>,
    pub payout_address: Address,
}

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// Path to JSON config file. Defaults apply when it does not exist.
    #[arg(long, default_value = "./config.json")]
    pub config_path: String,

    /// Overrides `db_path` from the config file.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Overrides `log_level` from the config file.
    #[arg(long)]
    pub log_level: Option<String>,
}

fn load_config_file(path: &str) -> Result<ConfigFile> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ConfigFile::default()),
        Err(e) => return Err(e).with_context(|| format!("failed to read config file: {path}")),
    };
    serde_json::from_str(&raw).context("failed to parse config JSON")
}

impl AppConfig {
    pub fn load(args: &CliArgs) -> Result<Self> {
        let mut file = load_config_file(&args.config_path)?;
        if let Some(dir) = &args.data_dir {
            file.db_path = dir.to_string_lossy().into_owned();
        }
        if let Some(level) = &args.log_level {
            file.log_level = level.clone();
        }
        Self::from_file(file)
    }

    pub fn from_file(file: ConfigFile) -> Result<Self> {
        if file.db_path.trim().is_empty() {
            anyhow::bail!("db_path must be provided");
        }
        let db_path = PathBuf::from(file.db_path.trim());
        if db_path.exists() && !db_path.is_dir() {
            anyhow::bail!("db_path is not a directory: {}", db_path.display());
        }

        let blockchain = file.network.blockchain.trim().to_string();
        let network = file.network.network.trim().to_string();
        if blockchain.is_empty() || network.is_empty() {
            anyhow::bail!("network.blockchain and network.network must be non-empty");
        }

        if file.request_timeout_ms == 0 {
            anyhow::bail!("request_timeout_ms must be greater than 0");
        }
        if file.compaction_interval_secs == 0 {
            anyhow::bail!("compaction_interval_secs must be greater than 0");
        }

        let block_reward = match normalize_optional_string(file.devnet.block_reward) {
            Some(raw) => raw
                .parse::<Currency>()
                .with_context(|| format!("invalid devnet.block_reward: {raw}"))?,
            None => default_block_reward(),
        };
        let payout_address = match normalize_optional_string(file.devnet.payout_address) {
            Some(raw) => raw
                .parse::<Address>()
                .with_context(|| format!("invalid devnet.payout_address: {raw}"))?,
            None => Address::VOID,
        };

        Ok(Self {
            db_path,
            port: file.port,
            network: NetworkIdentifier { blockchain, network },
            log_level: file.log_level.trim().to_string(),
            request_timeout: Duration::from_millis(file.request_timeout_ms),
            compaction: CompactionConfig {
                interval: Duration::from_secs(file.compaction_interval_secs),
                threshold_bytes: file.compaction_threshold_bytes,
            },
            devnet: DevnetConfig {
                maturity_delay: file.devnet.maturity_delay,
                block_reward,
                peers: file.devnet.peers,
                ..DevnetConfig::default()
            },
            block_interval: (file.devnet.block_interval_ms > 0)
                .then(|| Duration::from_millis(file.devnet.block_interval_ms)),
            payout_address,
        })
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            db_path: self.db_path.clone(),
            network: self.network.clone(),
            compaction: self.compaction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(json: &str) -> Result<AppConfig> {
        AppConfig::from_file(serde_json::from_str(json)?)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse("{}").unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("./db"));
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.network.blockchain, "Sia");
        assert_eq!(cfg.network.network, "Mainnet");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.compaction.interval, Duration::from_secs(60));
        assert_eq!(cfg.compaction.threshold_bytes, 1 << 30);
        assert_eq!(cfg.devnet.maturity_delay, 144);
        assert_eq!(cfg.devnet.block_reward, default_block_reward());
        assert!(cfg.block_interval.is_none());
        assert_eq!(cfg.payout_address, Address::VOID);
    }

    #[test]
    fn devnet_section_is_parsed() {
        let payout = fixtures::address_for(&fixtures::test_key(9));
        let cfg = parse(&format!(
            r#"{{"devnet": {{"maturity_delay": 3, "block_interval_ms": 250,
                "payout_address": "{payout}", "block_reward": "1000"}}}}"#
        ))
        .unwrap();
        assert_eq!(cfg.devnet.maturity_delay, 3);
        assert_eq!(cfg.devnet.block_reward, Currency::from(1000));
        assert_eq!(cfg.block_interval, Some(Duration::from_millis(250)));
        assert_eq!(cfg.payout_address, payout);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(parse(r#"{"request_timeout_ms": 0}"#).is_err());
        assert!(parse(r#"{"network": {"blockchain": " "}}"#).is_err());
        assert!(parse(r#"{"devnet": {"block_reward": "-5"}}"#).is_err());
        assert!(parse(r#"{"devnet": {"payout_address": "abc"}}"#).is_err());
        assert!(parse(r#"{"port": "eighty"}"#).is_err());
    }

    #[test]
    fn cli_overrides_file_and_missing_file_is_default() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"db_path": "/from/file", "log_level": "warn"}}"#).unwrap();
        let args = CliArgs {
            config_path: file.path().to_string_lossy().into_owned(),
            data_dir: Some(PathBuf::from("/from/cli")),
            log_level: None,
        };
        let cfg = AppConfig::load(&args).unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("/from/cli"));
        assert_eq!(cfg.log_level, "warn");

        let missing = CliArgs {
            config_path: "/nonexistent/config.json".into(),
            data_dir: None,
            log_level: Some("debug".into()),
        };
        let cfg = AppConfig::load(&missing).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.log_level, "debug");
    }
}
