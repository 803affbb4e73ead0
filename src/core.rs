//! Registry, modules and binders.
//!
//! # Examples
//!
//! ```rust
//! use injection::core::{Key, Locator, Mode};
//!
//! let locator = Locator::default();
//! assert!(!locator.contains(&Key::alias("missing")));
//! assert_eq!(Mode::default(), Mode::Normal);
//! ```

pub use injection_core::*;
