//! # Injection Core
//!
//! A dependency registry composed across scopes.
//!
//! ## Features
//!
//! - **Keyed registry**: [`Locator`] maps normalized [`Key`]s to [`Binding`]s,
//!   with `fallback` < `normal` < `override` conflict resolution
//! - **Composable scopes**: a [`Module`] searches the modules it uses, in
//!   priority order, before its own registry
//! - **Lifecycles**: transient, singleton, constant and placeholder bindings
//! - **Lock semantics**: a module whose singletons have been materialized
//!   refuses mutation until unlocked
//! - **Change propagation**: modules re-emit registry and structure events,
//!   and [`Binder`]s rebuild their dependency map after a change
//!
//! ## Example
//!
//! ```rust
//! use injection_core::{DiError, Key, Mode, Module};
//! use std::sync::Arc;
//!
//! trait Shape: Send + Sync {
//! 	fn name(&self) -> &'static str;
//! }
//!
//! struct Circle;
//! struct Square;
//!
//! impl Shape for Circle {
//! 	fn name(&self) -> &'static str {
//! 		"circle"
//! 	}
//! }
//!
//! impl Shape for Square {
//! 	fn name(&self) -> &'static str {
//! 		"square"
//! 	}
//! }
//!
//! let module = Module::named("shapes");
//! module
//! 	.injectable::<dyn Shape>()
//! 	.provide(|_| Ok(Arc::new(Circle) as Arc<dyn Shape>))
//! 	.unwrap();
//! assert_eq!(module.find::<dyn Shape>().unwrap().name(), "circle");
//!
//! let duplicate = module
//! 	.injectable::<dyn Shape>()
//! 	.provide(|_| Ok(Arc::new(Square) as Arc<dyn Shape>));
//! assert!(matches!(duplicate, Err(DiError::DuplicateBinding { .. })));
//!
//! module
//! 	.injectable::<dyn Shape>()
//! 	.mode(Mode::Override)
//! 	.provide(|_| Ok(Arc::new(Square) as Arc<dyn Shape>))
//! 	.unwrap();
//! assert_eq!(module.find::<dyn Shape>().unwrap().name(), "square");
//! assert!(module.contains(&Key::of::<dyn Shape>()));
//! ```

pub mod binder;
pub mod binding;
pub mod cycle_detection;
pub mod error;
pub mod event;
pub mod key;
pub mod lazy;
pub mod locator;
pub mod module;
pub mod settings;

pub use binder::{Arguments, Binder, BinderState, Parameter, ParameterKind, Signature};
pub use binding::{
	Binding, Factory, Instance, Lifecycle, Provider, downcast_instance, into_instance,
};
pub use cycle_detection::MAX_RESOLUTION_DEPTH;
pub use error::{DiError, DiResult};
pub use event::{
	DependenciesUpdated, Dispatch, Event, EventChannel, EventListener, ModuleAdded,
	ModuleEventProxy, ModulePriorityUpdated, ModuleRemoved, Reaction, Subscription,
};
pub use key::{ConcreteKey, Key, TypeKey};
pub use lazy::Lazy;
pub use locator::{Locator, Mode, Record};
pub use module::{
	Injectable, LazyInstance, Module, ModuleBuilder, Priority, TemporaryUse, WeakModule,
};
pub use settings::InjectionSettings;
