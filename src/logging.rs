use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Ensure initialization happens only once
static INIT: Once = Once::new();

/// Initialize the logging system with sensible defaults.
///
/// Log level can be set using the RUST_LOG environment variable.
/// Example: RUST_LOG=debug,admission_gate=trace
pub fn init() {
    INIT.call_once(|| {
        // Default to 'info' level if RUST_LOG is not set
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true) // Useful for debugging concurrency issues
                    .with_line_number(true),
            )
            .init();

        tracing::debug!("Logging initialized");
    });
}

/// Same as [`init`] but emitting one JSON object per line
pub fn init_json() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(false))
            .init();
    });
}

/// Macro for logging the outcome of a counted limit check
#[macro_export]
macro_rules! admission_event {
    ($scope:expr, $key:expr, $allowed:expr, $count:expr, $limit:expr) => {
        tracing::info!(
            scope = %$scope,
            key = %$key,
            allowed = $allowed,
            count = $count,
            limit = $limit,
            "Limit check"
        )
    };
}

/// Macro for logging storage operations with timing
#[macro_export]
macro_rules! storage_op {
    ($operation:expr, $key:expr, $result:expr, $elapsed_ms:expr) => {
        tracing::debug!(
            operation = $operation,
            key = $key,
            success = $result.is_ok(),
            elapsed_ms = $elapsed_ms,
            "Storage operation"
        )
    };
}
