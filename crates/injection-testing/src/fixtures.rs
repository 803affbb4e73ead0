//! `rstest` fixtures
//!
//! ```rust,ignore
//! use injection_testing::fixtures::*;
//! use rstest::rstest;
//!
//! #[rstest]
//! fn test_with_history(event_history: ObservedModule) {
//! 	assert!(event_history.history.is_empty());
//! }
//! ```

use crate::history::EventHistory;
use crate::logging::init_test_logging;
use injection_core::Module;
use rstest::fixture;
use std::sync::Arc;

/// A module together with the history of its applied events.
pub struct ObservedModule {
	pub module: Module,
	pub history: Arc<EventHistory>,
}

/// A fresh named module; also initialises test logging.
#[fixture]
pub fn module() -> Module {
	init_test_logging();
	Module::named("module")
}

/// A fresh module meant to hold test doubles.
#[fixture]
pub fn test_module() -> Module {
	Module::named("test-module")
}

#[fixture]
pub fn event_history(module: Module) -> ObservedModule {
	let history = EventHistory::attach(&module);
	ObservedModule { module, history }
}
