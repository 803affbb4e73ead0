//! Testing utilities for applications built on modules.
//!
//! # Examples
//!
//! ```rust,no_run
//! use injection::testing::{EventHistory, init_test_logging, use_test_injectables};
//! ```

pub use injection_testing::*;
