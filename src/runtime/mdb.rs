use rocksdb::{
    BlockBasedOptions, Cache, DB, Direction, Error as RocksError, IteratorMode, Options,
    ReadOptions, Snapshot, WriteBatch,
};
use std::{path::Path, sync::Arc};

/// ===== Cache / open-time tuning =====
/// LRU block cache (data + index/filter blocks).
pub const ROCKS_BLOCK_CACHE_BYTES: usize = 256 << 20;

/// Bloom filter bits/key (helps point lookups).
pub const BLOOM_BITS_PER_KEY: f64 = 10.0;

/// A key namespace inside a shared RocksDB instance. All keys passed in are
/// relative; the namespace prefix is added on the way down.
#[derive(Clone)]
pub struct Mdb {
    db: Arc<DB>,
    prefix: Vec<u8>,
}

impl Mdb {
    pub fn from_db(db: Arc<DB>, prefix: impl AsRef<[u8]>) -> Self {
        Self { db, prefix: prefix.as_ref().to_vec() }
    }

    pub fn open(path: impl AsRef<Path>, prefix: impl AsRef<[u8]>) -> Result<Self, RocksError> {
        let cache = Cache::new_lru_cache(ROCKS_BLOCK_CACHE_BYTES);

        let mut table = BlockBasedOptions::default();
        table.set_block_cache(&cache);
        table.set_cache_index_and_filter_blocks(true);
        table.set_pin_l0_filter_and_index_blocks_in_cache(true);
        table.set_bloom_filter(BLOOM_BITS_PER_KEY, false);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(-1);
        opts.set_block_based_table_factory(&table);

        let db = DB::open(&opts, path)?;
        Ok(Self::from_db(Arc::new(db), prefix))
    }

    #[inline]
    pub fn prefixed(&self, k: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + k.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(k);
        out
    }

    pub fn get(&self, k: &[u8]) -> Result<Option<Vec<u8>>, RocksError> {
        self.db.get(self.prefixed(k))
    }

    /// Point-in-time view; later writes are invisible through it.
    pub fn view(&self) -> MdbView<'_> {
        MdbView { mdb: self, snap: self.db.snapshot() }
    }

    /// Build a batch and write it atomically.
    pub fn bulk_write<F>(&self, build: F) -> Result<(), RocksError>
    where
        F: FnOnce(&mut MdbBatch<'_>),
    {
        let mut wb = WriteBatch::default();
        {
            let mut mb = MdbBatch { mdb: self, wb: &mut wb };
            build(&mut mb);
        }
        self.db.write(wb)
    }

    /// Every (relative key, value) pair whose key starts with `rel_prefix`.
    pub fn scan_prefix(&self, rel_prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, RocksError> {
        let start = self.prefixed(rel_prefix);

        let mut ro = ReadOptions::default();
        if let Some(ub) = upper_bound(&start) {
            ro.set_iterate_upper_bound(ub);
        }
        ro.set_total_order_seek(true);

        let it = self.db.iterator_opt(IteratorMode::From(&start, Direction::Forward), ro);
        let mut out = Vec::new();
        for kv in it {
            let (k_full, v) = kv?;
            if !k_full.starts_with(&start) {
                break;
            }
            out.push((k_full[self.prefix.len()..].to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    /// Total size of live SST files, the number compaction is keyed on.
    pub fn disk_size(&self) -> Result<u64, RocksError> {
        Ok(self.db.property_int_value("rocksdb.total-sst-files-size")?.unwrap_or(0))
    }

    /// Compact this namespace's key range.
    pub fn compact(&self) {
        let start = self.prefix.clone();
        let end = upper_bound(&start);
        self.db.compact_range(Some(start.as_slice()), end.as_deref());
    }

    pub fn flush(&self) -> Result<(), RocksError> {
        self.db.flush()
    }

    /// Flush memtables and stop background flush/compaction jobs, waiting for
    /// running ones. The handle itself closes when the last clone drops.
    pub fn shutdown(&self) -> Result<(), RocksError> {
        self.db.flush()?;
        self.db.cancel_all_background_work(true);
        Ok(())
    }
}

/// Smallest key strictly greater than every key starting with `prefix`.
fn upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut ub = prefix.to_vec();
    while let Some(last) = ub.pop() {
        if last != 0xff {
            ub.push(last + 1);
            return Some(ub);
        }
    }
    None
}

pub struct MdbView<'a> {
    mdb: &'a Mdb,
    snap: Snapshot<'a>,
}

impl MdbView<'_> {
    pub fn get(&self, k: &[u8]) -> Result<Option<Vec<u8>>, RocksError> {
        self.snap.get(self.mdb.prefixed(k))
    }
}

pub struct MdbBatch<'a> {
    mdb: &'a Mdb,
    wb: &'a mut WriteBatch,
}

impl MdbBatch<'_> {
    #[inline]
    pub fn put(&mut self, k: &[u8], v: &[u8]) {
        self.wb.put(self.mdb.prefixed(k), v);
    }

    #[inline]
    pub fn delete(&mut self, k: &[u8]) {
        self.wb.delete(self.mdb.prefixed(k));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn namespaces_do_not_leak() {
        let dir = TempDir::new().unwrap();
        let a = Mdb::open(dir.path(), b"a:").unwrap();
        let b = Mdb::from_db(a.db.clone(), b"b:");
        a.bulk_write(|w| w.put(b"k", b"1")).unwrap();
        assert_eq!(a.get(b"k").unwrap(), Some(b"1".to_vec()));
        assert_eq!(b.get(b"k").unwrap(), None);
    }

    #[test]
    fn view_is_isolated_from_later_writes() {
        let dir = TempDir::new().unwrap();
        let m = Mdb::open(dir.path(), b"n:").unwrap();
        m.bulk_write(|w| w.put(b"k", b"old")).unwrap();
        let view = m.view();
        m.bulk_write(|w| {
            w.put(b"k", b"new");
            w.put(b"other", b"x");
        })
        .unwrap();
        assert_eq!(view.get(b"k").unwrap(), Some(b"old".to_vec()));
        assert_eq!(view.get(b"other").unwrap(), None);
        assert_eq!(m.get(b"k").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn scan_prefix_returns_relative_keys() {
        let dir = TempDir::new().unwrap();
        let m = Mdb::open(dir.path(), b"n:").unwrap();
        m.bulk_write(|w| {
            w.put(b"utxos1", b"a");
            w.put(b"utxos2", b"b");
            w.put(b"blocks1", b"c");
        })
        .unwrap();
        let got = m.scan_prefix(b"utxos").unwrap();
        assert_eq!(got, vec![(b"utxos1".to_vec(), b"a".to_vec()), (b"utxos2".to_vec(), b"b".to_vec())]);
    }

    #[test]
    fn upper_bound_carries() {
        assert_eq!(upper_bound(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(upper_bound(&[0x01, 0xff]), Some(vec![0x02]));
        assert_eq!(upper_bound(&[0xff]), None);
    }
}
