// Common utilities for integration tests

mod test_harness;

// Re-export test utilities for convenience in integration tests
#[allow(unused_imports)]
pub use rosetta_index::test_utils::{ChainBuilder, TestConfigBuilder, fixtures};

pub use test_harness::RosettaTestHarness;
