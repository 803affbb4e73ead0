//! # Injection Testing
//!
//! Helpers for tests of code built on injection modules.
//!
//! - [`use_test_injectables`]: shadow a module with test doubles
//! - [`EventHistory`]: record the events a module applies
//! - [`fixtures`]: `rstest` fixtures
//! - [`logging`]: one-time `tracing` initialisation for tests

pub mod fixtures;
pub mod history;
pub mod logging;
pub mod overrides;

pub use fixtures::*;
pub use history::EventHistory;
pub use logging::init_test_logging;
pub use overrides::{TestInjectables, use_test_injectables, with_test_injectables};
