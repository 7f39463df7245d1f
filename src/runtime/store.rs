use borsh::{BorshDeserialize, BorshSerialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::chain::ResumeToken;
use crate::runtime::error::IndexError;
use crate::runtime::mdb::{Mdb, MdbView};
use crate::types::{Address, BlockId, Currency, OutputId};

pub const STORE_NAMESPACE: &[u8] = b"idx:";
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Relative key layout inside the store namespace.
pub mod keys {
    use super::*;

    pub const VERSION: &[u8] = b"version";
    pub const CURRENT_HEIGHT: &[u8] = b"currentheight";
    pub const CURRENT_BLOCK_ID: &[u8] = b"currentblockid";
    pub const CONSENSUS_CHANGE_ID: &[u8] = b"consensuschangeid";
    pub const VOID_BALANCE: &[u8] = b"voidbalance";

    pub const ADDRESS_PREFIX: &[u8] = b"addrs";
    pub const BLOCK_PREFIX: &[u8] = b"blocks";
    pub const OUTPUT_PREFIX: &[u8] = b"utxos";

    fn tagged(tag: &[u8], id: &[u8; 32]) -> Vec<u8> {
        let mut k = Vec::with_capacity(tag.len() + 32);
        k.extend_from_slice(tag);
        k.extend_from_slice(id);
        k
    }

    pub fn address(addr: &Address) -> Vec<u8> {
        tagged(ADDRESS_PREFIX, &addr.0)
    }

    pub fn block(id: &BlockId) -> Vec<u8> {
        tagged(BLOCK_PREFIX, id.as_bytes())
    }

    pub fn output(id: &OutputId) -> Vec<u8> {
        tagged(OUTPUT_PREFIX, id.as_bytes())
    }
}

/// Anything the index can be read through: a snapshot view or an open write
/// transaction (which sees its own staged writes).
pub trait KvRead {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexError>;

    fn get_decoded<T: BorshDeserialize>(&self, key: &[u8]) -> Result<Option<T>, IndexError> {
        match self.get_raw(key)? {
            Some(bytes) => {
                T::try_from_slice(&bytes).map(Some).map_err(|e| IndexError::corrupt(key, e))
            }
            None => Ok(None),
        }
    }

    fn must_get<T: BorshDeserialize>(&self, key: &[u8]) -> Result<T, IndexError> {
        self.get_decoded(key)?.ok_or_else(|| IndexError::missing(key))
    }
}

/// How much of the diff stream the index reflects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainCursor {
    /// Number of blocks applied; the next block lands at this height.
    pub height: u64,
    pub block_id: BlockId,
    pub token: ResumeToken,
}

impl ChainCursor {
    pub fn load(r: &impl KvRead) -> Result<Self, IndexError> {
        Ok(Self {
            height: r.must_get(keys::CURRENT_HEIGHT)?,
            block_id: r.must_get(keys::CURRENT_BLOCK_ID)?,
            token: r.must_get(keys::CONSENSUS_CHANGE_ID)?,
        })
    }

    /// Height and id of the newest indexed block, if any.
    pub fn tip(&self) -> Option<(u64, BlockId)> {
        self.height.checked_sub(1).map(|h| (h, self.block_id))
    }
}

#[derive(Clone)]
pub struct IndexStore {
    mdb: Mdb,
    closed: Arc<AtomicBool>,
}

impl IndexStore {
    /// Open (creating if needed) the store at `path`. A fresh store starts at
    /// height 0 pointing at `genesis_id`.
    pub fn open(path: impl AsRef<Path>, genesis_id: BlockId) -> Result<Self, IndexError> {
        let mdb = Mdb::open(path, STORE_NAMESPACE)?;
        let store = Self { mdb, closed: Arc::new(AtomicBool::new(false)) };
        store.init(genesis_id)?;
        Ok(store)
    }

    fn init(&self, genesis_id: BlockId) -> Result<(), IndexError> {
        let mut tx = self.begin_write()?;
        match tx.get_decoded::<String>(keys::VERSION)? {
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            Some(v) => Err(IndexError::corrupt(keys::VERSION, format!("unsupported schema {v}"))),
            None => {
                info!(version = SCHEMA_VERSION, "initializing index store");
                tx.put(keys::VERSION, &SCHEMA_VERSION.to_string())?;
                tx.put(keys::VOID_BALANCE, &Currency::ZERO)?;
                tx.put_cursor(&ChainCursor {
                    height: 0,
                    block_id: genesis_id,
                    token: ResumeToken::BEGINNING,
                })?;
                tx.commit()
            }
        }
    }

    fn ensure_open(&self) -> Result<(), IndexError> {
        if self.is_closed() { Err(IndexError::Closed) } else { Ok(()) }
    }

    pub fn read(&self) -> Result<ReadView<'_>, IndexError> {
        self.ensure_open()?;
        Ok(ReadView { view: self.mdb.view() })
    }

    pub fn begin_write(&self) -> Result<WriteTxn<'_>, IndexError> {
        self.ensure_open()?;
        Ok(WriteTxn { store: self, pending: BTreeMap::new() })
    }

    pub fn cursor(&self) -> Result<ChainCursor, IndexError> {
        ChainCursor::load(&self.read()?)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flush, stop RocksDB background work and refuse further use through
    /// every clone. Idempotent.
    ///
    /// Clones share one `DB` handle; its files and lock are released when the
    /// last clone drops, so callers that reopen the path must drop theirs
    /// first. `IndexerService` holds the only long-lived clones and drops
    /// them after closing.
    pub fn close(&self) -> Result<(), IndexError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.mdb.shutdown()?;
        info!("index store closed");
        Ok(())
    }

    pub fn disk_size(&self) -> Result<u64, IndexError> {
        self.ensure_open()?;
        Ok(self.mdb.disk_size()?)
    }

    pub fn compact(&self) -> Result<(), IndexError> {
        self.ensure_open()?;
        self.mdb.compact();
        Ok(())
    }

    /// Every key/value pair under the store namespace, in key order.
    pub fn dump(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, IndexError> {
        self.ensure_open()?;
        Ok(self.mdb.scan_prefix(b"")?)
    }
}

pub struct ReadView<'a> {
    view: MdbView<'a>,
}

impl KvRead for ReadView<'_> {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexError> {
        Ok(self.view.get(key)?)
    }
}

/// Writes staged in memory and committed as one RocksDB batch.
pub struct WriteTxn<'a> {
    store: &'a IndexStore,
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteTxn<'_> {
    pub fn put_raw(&mut self, key: &[u8], value: Vec<u8>) {
        self.pending.insert(key.to_vec(), Some(value));
    }

    pub fn put<T: BorshSerialize>(&mut self, key: &[u8], value: &T) -> Result<(), IndexError> {
        let bytes = borsh::to_vec(value).map_err(|e| IndexError::corrupt(key, e))?;
        self.put_raw(key, bytes);
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.pending.insert(key.to_vec(), None);
    }

    pub fn put_cursor(&mut self, cursor: &ChainCursor) -> Result<(), IndexError> {
        self.put(keys::CURRENT_HEIGHT, &cursor.height)?;
        self.put(keys::CURRENT_BLOCK_ID, &cursor.block_id)?;
        self.put(keys::CONSENSUS_CHANGE_ID, &cursor.token)
    }

    pub fn commit(self) -> Result<(), IndexError> {
        self.store.ensure_open()?;
        let pending = self.pending;
        self.store.mdb.bulk_write(|b| {
            for (k, v) in &pending {
                match v {
                    Some(v) => b.put(k, v),
                    None => b.delete(k),
                }
            }
        })?;
        Ok(())
    }
}

impl KvRead for WriteTxn<'_> {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexError> {
        match self.pending.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => Ok(self.store.mdb.get(key)?),
        }
    }
}
