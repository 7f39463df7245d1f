//! The indexer service: owns the index store, keeps it in step with the
//! diff stream, and answers Rosetta data and construction requests.

pub mod account;
pub mod block;
pub mod construction;
pub mod convert;
pub mod errors;
pub mod mempool;
pub mod models;
pub mod network;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use crate::chain::{NodeHandles, SubscriptionId};
use crate::core::Ingester;
use crate::runtime::compaction::{CompactionConfig, CompactionTask};
use crate::runtime::{ChainCursor, IndexError, IndexStore};

pub use errors::{ApiError, ErrorClass, ErrorKind};
pub use models::NetworkIdentifier;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub network: NetworkIdentifier,
    pub compaction: CompactionConfig,
}

/// Background pieces torn down by `close`, in field order.
#[derive(Default)]
struct Lifecycle {
    compaction: Option<CompactionTask>,
    subscription: Option<SubscriptionId>,
}

pub struct IndexerService {
    network: NetworkIdentifier,
    store: IndexStore,
    node: NodeHandles,
    lifecycle: Mutex<Lifecycle>,
}

impl IndexerService {
    /// Open the store, start compaction, and subscribe from the last
    /// committed resume token. The subscription replays missed batches
    /// before this returns.
    pub fn open(cfg: ServiceConfig, node: NodeHandles) -> Result<Self, IndexError> {
        let genesis_id = node.chain.genesis_block().id();
        let store = IndexStore::open(&cfg.db_path, genesis_id)?;
        let ingester = Arc::new(Ingester::new(store.clone(), &genesis_id));

        let compaction = match CompactionTask::spawn(store.clone(), cfg.compaction) {
            Ok(task) => task,
            Err(e) => {
                let _ = store.close();
                return Err(e.into());
            }
        };

        let subscription = store
            .cursor()
            .and_then(|cursor| {
                info!(height = cursor.height, "subscribing to consensus changes");
                Ok(node.consensus.subscribe(ingester, cursor.token)?)
            });
        let subscription = match subscription {
            Ok(id) => id,
            Err(e) => {
                compaction.stop();
                let _ = store.close();
                return Err(e);
            }
        };

        let cursor = store.cursor()?;
        info!(height = cursor.height, block = %cursor.block_id, "indexer service ready");
        Ok(Self {
            network: cfg.network,
            store,
            node,
            lifecycle: Mutex::new(Lifecycle {
                compaction: Some(compaction),
                subscription: Some(subscription),
            }),
        })
    }

    pub fn network(&self) -> &NetworkIdentifier {
        &self.network
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn node(&self) -> &NodeHandles {
        &self.node
    }

    pub fn cursor(&self) -> Result<ChainCursor, IndexError> {
        self.store.cursor()
    }

    pub fn check_network(&self, requested: &NetworkIdentifier) -> Result<(), ApiError> {
        if *requested == self.network {
            Ok(())
        } else {
            Err(ErrorKind::UnknownNetwork
                .with(format!("{}/{}", requested.blockchain, requested.network)))
        }
    }

    /// Stop compaction, unsubscribe, then close the store. Idempotent.
    pub fn close(&self) -> Result<(), IndexError> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = lifecycle.compaction.take() {
            task.stop();
        }
        if let Some(id) = lifecycle.subscription.take() {
            self.node.consensus.unsubscribe(id);
        }
        self.store.close()
    }
}

impl Drop for IndexerService {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "error closing indexer service");
        }
    }
}
