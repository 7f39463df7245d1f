pub mod block_metadata;
pub mod compaction;
pub mod error;
pub mod mdb;
pub(crate) mod ownership;
pub mod store;
pub mod utxo;

pub use error::IndexError;
pub use store::{ChainCursor, IndexStore, KvRead, ReadView, WriteTxn};
