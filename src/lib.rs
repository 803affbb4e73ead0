//! # Injection
//!
//! Scoped dependency injection for Rust.
//!
//! A [`Module`] maps request keys to bindings, composes other modules with a
//! deterministic priority, refuses structural changes once a singleton below
//! it has been materialized, and notifies listeners of every applied change so
//! that [`Binder`]s stay consistent with the registry.
//!
//! ## Feature Flags
//!
//! - `core` (default) - registry, modules, binders and settings
//! - `testing` - test doubles, event recording and `rstest` fixtures
//! - `full` - everything
//!
//! ## Example
//!
//! ```rust
//! use injection::{Module, Priority};
//! use std::sync::Arc;
//!
//! struct Greeter(&'static str);
//!
//! let library = Module::named("library");
//! library.set_constant(Arc::new(Greeter("hello"))).unwrap();
//!
//! let app = Module::named("app");
//! app.use_module(&library, Priority::Low).unwrap();
//!
//! assert_eq!(app.find::<Greeter>().unwrap().0, "hello");
//! ```

#[cfg(feature = "core")]
pub mod core;
#[cfg(feature = "testing")]
pub mod testing;

// Re-export the types most applications use
#[cfg(feature = "core")]
pub use injection_core::{
	Arguments, Binder, Binding, DiError, DiResult, InjectionSettings, Key, Lifecycle, Mode,
	Module, Parameter, Priority, Signature,
};
