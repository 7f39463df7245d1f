use crate::config::AppConfig;
use crate::config::ConfigFile;
use crate::service::NetworkIdentifier;
use crate::types::{Address, Currency};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Builder for test `AppConfig` instances backed by temporary directories.
pub struct TestConfigBuilder {
    config: AppConfig,
    temp_dirs: Vec<TempDir>,
}

impl TestConfigBuilder {
    /// Defaults from an empty config file, with the store in a fresh temp
    /// dir, port 0 and a fast devnet.
    pub fn new() -> Self {
        let db_temp = TempDir::new().expect("create temp index db");
        let mut config =
            AppConfig::from_file(ConfigFile::default()).expect("default config is valid");
        config.db_path = db_temp.path().to_path_buf();
        config.port = 0;
        config.request_timeout = Duration::from_secs(5);
        config.devnet.maturity_delay = 1;
        config.devnet.block_reward = Currency::from(100);

        Self { config, temp_dirs: vec![db_temp] }
    }

    pub fn with_network(mut self, blockchain: &str, network: &str) -> Self {
        self.config.network =
            NetworkIdentifier { blockchain: blockchain.to_string(), network: network.to_string() };
        self
    }

    pub fn with_maturity_delay(mut self, delay: u64) -> Self {
        self.config.devnet.maturity_delay = delay;
        self
    }

    pub fn with_block_reward(mut self, reward: u64) -> Self {
        self.config.devnet.block_reward = Currency::from(reward);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn with_block_interval(mut self, interval: Duration) -> Self {
        self.config.block_interval = Some(interval);
        self
    }

    pub fn with_payout_address(mut self, address: Address) -> Self {
        self.config.payout_address = address;
        self
    }

    /// Create a new temporary directory and return its path
    pub fn create_temp_dir(&mut self) -> PathBuf {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = temp_dir.path().to_path_buf();
        self.temp_dirs.push(temp_dir);
        path
    }

    /// Build and return the config along with temp directory handles
    /// The caller must keep the TempDir handles alive to prevent cleanup
    pub fn build(self) -> (AppConfig, Vec<TempDir>) {
        (self.config, self.temp_dirs)
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder_defaults() {
        let (config, _temp_dirs) = TestConfigBuilder::new().build();

        assert_eq!(config.network.blockchain, "Sia");
        assert_eq!(config.port, 0);
        assert_eq!(config.devnet.maturity_delay, 1);
        assert!(config.block_interval.is_none());
    }

    #[test]
    fn test_config_builder_customization() {
        let (config, _temp_dirs) = TestConfigBuilder::new()
            .with_network("Sia", "Zen")
            .with_maturity_delay(7)
            .with_block_interval(Duration::from_millis(10))
            .build();

        assert_eq!(config.network.network, "Zen");
        assert_eq!(config.devnet.maturity_delay, 7);
        assert_eq!(config.block_interval, Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_temp_dirs_exist() {
        let mut builder = TestConfigBuilder::new();
        let extra = builder.create_temp_dir();
        let (config, temp_dirs) = builder.build();

        assert!(config.db_path.exists());
        assert!(extra.exists());
        assert_eq!(temp_dirs.len(), 2);
    }
}
