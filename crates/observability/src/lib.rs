//! Tracing and logging setup shared by binaries and tests.

/// Subscriber configuration (filters, output format).
pub mod subscriber;

pub use subscriber::LogFormat;

/// Initialize process-wide logging.
///
/// The filter comes from `RUST_LOG` (default `info`), the format from
/// `SPOOLLEDGER_LOG_FORMAT` (`json` or `compact`, default `json`).
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    subscriber::init(LogFormat::from_env());
}

/// Route logs through the test harness so they only show for failing tests.
pub fn init_for_tests() {
    subscriber::init_for_tests();
}
