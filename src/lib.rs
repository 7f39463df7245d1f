pub mod chain;
pub mod config;
pub mod core;
pub mod devnet;
pub mod runtime;
pub mod server;
pub mod service;
pub mod types;

// Test utilities available for unit and integration tests
pub mod test_utils;

/// Abort on a broken index invariant. Logged first so the cause survives a
/// `panic = "abort"` build.
#[macro_export]
macro_rules! invariant_violation {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        ::tracing::error!(target: "invariant", "{}", msg);
        panic!("invariant violation: {}", msg)
    }};
}

pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::{EnvFilter, fmt};
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();
}
