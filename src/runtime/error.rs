use thiserror::Error;

use crate::chain::EngineError;

/// Errors raised by the index store and the components writing to it.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("rocksdb: {0}")]
    Rocks(#[from] rocksdb::Error),

    #[error("index store is closed")]
    Closed,

    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("missing record {0}")]
    Missing(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("subscription failed: {0}")]
    Subscribe(#[from] EngineError),
}

impl IndexError {
    pub(crate) fn corrupt(key: &[u8], reason: impl ToString) -> Self {
        Self::Corrupt { key: printable_key(key), reason: reason.to_string() }
    }

    pub(crate) fn missing(key: &[u8]) -> Self {
        Self::Missing(printable_key(key))
    }
}

/// Keys are an ascii tag followed by binary; render the tag and hex the rest.
fn printable_key(key: &[u8]) -> String {
    let tag_len = key.iter().take_while(|b| b.is_ascii_lowercase()).count();
    let (tag, rest) = key.split_at(tag_len);
    format!("{}{}", String::from_utf8_lossy(tag), hex::encode(rest))
}
