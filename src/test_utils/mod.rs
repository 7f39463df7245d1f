// Test utilities shared by unit and integration tests

pub use tempfile::TempDir;

pub mod chain_builder;
pub mod config_builder;
pub mod fixtures;
pub mod recorder;

pub use chain_builder::ChainBuilder;
pub use config_builder::TestConfigBuilder;
pub use recorder::RecordingSubscriber;

use std::sync::Arc;

use crate::chain::NodeHandles;
use crate::devnet::Devnet;
use crate::runtime::compaction::CompactionConfig;
use crate::service::{IndexerService, NetworkIdentifier, ServiceConfig};

/// Network every test service is configured for.
pub fn test_network() -> NetworkIdentifier {
    NetworkIdentifier { blockchain: "Sia".to_string(), network: "Mainnet".to_string() }
}

/// Open a service over `node` with its store in a fresh temp dir. Keep the
/// returned dir alive for as long as the service is used.
pub fn open_service(node: Arc<Devnet>) -> (IndexerService, TempDir) {
    let dir = TempDir::new().expect("create temp index db");
    let cfg = ServiceConfig {
        db_path: dir.path().to_path_buf(),
        network: test_network(),
        compaction: CompactionConfig::default(),
    };
    let svc = IndexerService::open(cfg, NodeHandles::from_node(node)).expect("open service");
    (svc, dir)
}
