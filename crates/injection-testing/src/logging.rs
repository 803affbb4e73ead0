//! Test logging utilities

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initialize logging for tests (call once)
///
/// Installs a `tracing` fmt subscriber writing through the test harness, so
/// output is only shown for failing tests. The filter is read from `RUST_LOG`
/// and defaults to `injection_core=debug`.
///
/// # Examples
///
/// ```
/// use injection_testing::init_test_logging;
///
/// init_test_logging();
/// init_test_logging();
/// ```
pub fn init_test_logging() {
	INIT.call_once(|| {
		let filter = EnvFilter::try_from_default_env()
			.unwrap_or_else(|_| EnvFilter::new("injection_core=debug"));
		let _ = tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_test_writer()
			.try_init();
	});
}
