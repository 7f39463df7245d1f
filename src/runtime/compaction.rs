use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::runtime::error::IndexError;
use crate::runtime::store::IndexStore;

pub const DEFAULT_COMPACTION_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_COMPACTION_THRESHOLD: u64 = 1 << 30;

#[derive(Clone, Copy, Debug)]
pub struct CompactionConfig {
    pub interval: Duration,
    /// Compact once the store has grown by this many bytes since the last run.
    pub threshold_bytes: u64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self { interval: DEFAULT_COMPACTION_INTERVAL, threshold_bytes: DEFAULT_COMPACTION_THRESHOLD }
    }
}

/// Periodic background compaction. Stops on request or once the store is
/// closed.
pub struct CompactionTask {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl CompactionTask {
    pub fn spawn(store: IndexStore, cfg: CompactionConfig) -> std::io::Result<Self> {
        let (stop, rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("index-compaction".into())
            .spawn(move || run(store, cfg, rx))?;
        Ok(Self { stop, handle })
    }

    /// Signal the task and wait for it to exit.
    pub fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            warn!("compaction task panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

fn run(store: IndexStore, cfg: CompactionConfig, stop: mpsc::Receiver<()>) {
    let mut next_run = match store.disk_size() {
        Ok(size) => size.saturating_add(cfg.threshold_bytes),
        Err(IndexError::Closed) => return,
        Err(e) => {
            warn!(error = %e, "could not read index size; compacting at next threshold");
            cfg.threshold_bytes
        }
    };

    loop {
        match stop.recv_timeout(cfg.interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                debug!("compaction task stopping");
                return;
            }
        }

        let size = match store.disk_size() {
            Ok(size) => size,
            Err(IndexError::Closed) => return,
            Err(e) => {
                warn!(error = %e, "could not read index size");
                continue;
            }
        };
        if size < next_run {
            continue;
        }

        match store.compact() {
            Ok(()) => {
                info!(size, "compacted index store");
                next_run = next_run.saturating_add(cfg.threshold_bytes);
            }
            Err(IndexError::Closed) => return,
            Err(e) => warn!(error = %e, "compaction failed; retrying next tick"),
        }
    }
}
