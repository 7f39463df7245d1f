/// Integration test harness for the Rosetta indexer
///
/// Combines:
/// - an in-process devnet (block production, mempool, reorgs)
/// - an indexer service following the devnet's diff stream
/// - the HTTP router over that service

use anyhow::Result;
use axum::Router;
use axum::http::StatusCode;
use rosetta_index::chain::NodeHandles;
use rosetta_index::config::AppConfig;
use rosetta_index::devnet::Devnet;
use rosetta_index::server::{ApiState, router};
use rosetta_index::service::IndexerService;
use rosetta_index::test_utils::TestConfigBuilder;
use rosetta_index::types::{Address, Block};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub struct RosettaTestHarness {
    pub node: Arc<Devnet>,
    pub service: Arc<IndexerService>,
    pub config: AppConfig,
    app: Router,

    // Resource cleanup
    _temp_dirs: Vec<TempDir>,
}

impl RosettaTestHarness {
    /// Harness over a fresh devnet at genesis with test defaults.
    pub fn new() -> Result<Self> {
        Self::with_config(TestConfigBuilder::new())
    }

    pub fn with_config(builder: TestConfigBuilder) -> Result<Self> {
        let (config, temp_dirs) = builder.build();
        let node = Arc::new(Devnet::new(config.devnet.clone()));
        let service = Arc::new(IndexerService::open(
            config.service_config(),
            NodeHandles::from_node(node.clone()),
        )?);
        let app = router(ApiState { service: service.clone(), timeout: config.request_timeout });
        Ok(Self { node, service, config, app, _temp_dirs: temp_dirs })
    }

    /// Mine `count` blocks paying `payout`.
    pub fn mine_blocks(&self, count: usize, payout: Address) -> Result<Vec<Block>> {
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            blocks.push(self.node.mine_block(payout)?);
        }
        Ok(blocks)
    }

    /// Replace the last `depth` blocks with one block per entry of `payouts`.
    pub fn simulate_reorg(&self, depth: usize, payouts: &[Address]) -> Result<Vec<Block>> {
        Ok(self.node.reorg(depth, payouts)?)
    }

    pub fn network_identifier(&self) -> Value {
        json!({
            "blockchain": self.config.network.blockchain,
            "network": self.config.network.network,
        })
    }

    /// POST a JSON body through the router.
    pub async fn post(&self, path: &str, body: Value) -> Result<(StatusCode, Value)> {
        let response = self
            .app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .method(axum::http::Method::POST)
                    .uri(path)
                    .header(axum::http::header::CONTENT_TYPE, "application/json")
                    .body(axum::body::Body::from(body.to_string()))?,
            )
            .await?;

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body_json: Value = serde_json::from_slice(&body_bytes)?;
        Ok((status, body_json))
    }

    /// POST and expect 200.
    pub async fn post_ok(&self, path: &str, body: Value) -> Result<Value> {
        let (status, value) = self.post(path, body).await?;
        anyhow::ensure!(status == StatusCode::OK, "{path} returned {status}: {value}");
        Ok(value)
    }
}
