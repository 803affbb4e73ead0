//! Bindings: how an instance is produced, and how long it lives
//!
//! A [`Binding`] pairs a [`Provider`] with the [`Lifecycle`] it implements.
//! Providers are shared behind an `Arc`, so cloning a binding (for instance to
//! store it under several keys) keeps a single singleton cache.

use crate::cycle_detection::begin_resolution;
use crate::error::{DiError, DiResult};
use crate::key::Key;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A produced value.
///
/// The boxed value is always an `Arc<T>` for the requested `T`, which may be
/// unsized (`Arc<dyn Shape>`); use [`downcast_instance`] to get it back.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Wraps a shared value into an [`Instance`].
pub fn into_instance<T>(value: Arc<T>) -> Instance
where
	T: ?Sized + Send + Sync + 'static,
{
	Arc::new(value)
}

/// Recovers the `Arc<T>` stored in `instance`, if it holds one.
///
/// # Examples
///
/// ```
/// use injection_core::{downcast_instance, into_instance};
/// use std::sync::Arc;
///
/// let instance = into_instance(Arc::new(7_u32));
/// assert_eq!(downcast_instance::<u32>(&instance).as_deref(), Some(&7));
/// assert!(downcast_instance::<String>(&instance).is_none());
/// ```
pub fn downcast_instance<T>(instance: &Instance) -> Option<Arc<T>>
where
	T: ?Sized + Send + Sync + 'static,
{
	instance.downcast_ref::<Arc<T>>().cloned()
}

/// A zero-argument instance factory.
pub type Factory = Arc<dyn Fn() -> DiResult<Instance> + Send + Sync>;

/// Lifecycle policy of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
	/// A new instance on every resolution
	Transient,
	/// One instance, created on first resolution and kept until unlocked
	Singleton,
	/// A pre-built instance
	Constant,
	/// Marks a key that must be bound by someone else
	Placeholder,
}

/// Produces instances for a binding.
pub trait Provider: Send + Sync {
	fn get_instance(&self) -> DiResult<Instance>;

	/// Whether this provider holds state that [`Provider::unlock`] would drop.
	fn is_locked(&self) -> bool {
		false
	}

	fn unlock(&self) {}
}

struct TransientProvider {
	factory: Factory,
}

impl Provider for TransientProvider {
	fn get_instance(&self) -> DiResult<Instance> {
		(self.factory)()
	}
}

struct SingletonProvider {
	factory: Factory,
	// Swapped for a fresh cell on unlock
	cache: Mutex<Arc<OnceCell<Instance>>>,
}

impl Provider for SingletonProvider {
	fn get_instance(&self) -> DiResult<Instance> {
		let cell = self.cache.lock().clone();
		cell.get_or_try_init(|| (self.factory)()).cloned()
	}

	fn is_locked(&self) -> bool {
		self.cache.lock().get().is_some()
	}

	fn unlock(&self) {
		*self.cache.lock() = Arc::new(OnceCell::new());
	}
}

struct ConstantProvider {
	instance: Instance,
}

impl Provider for ConstantProvider {
	fn get_instance(&self) -> DiResult<Instance> {
		Ok(self.instance.clone())
	}
}

struct PlaceholderProvider {
	key: Key,
}

impl Provider for PlaceholderProvider {
	fn get_instance(&self) -> DiResult<Instance> {
		Err(DiError::PlaceholderUnresolved(self.key.clone()))
	}
}

/// A named capability producing instances.
#[derive(Clone)]
pub struct Binding {
	provider: Arc<dyn Provider>,
	lifecycle: Lifecycle,
	label: Arc<str>,
}

impl Binding {
	/// Wraps a custom provider.
	pub fn new<P>(provider: P, lifecycle: Lifecycle, label: impl Into<Arc<str>>) -> Self
	where
		P: Provider + 'static,
	{
		Self {
			provider: Arc::new(provider),
			lifecycle,
			label: label.into(),
		}
	}

	pub fn transient<F>(label: impl Into<Arc<str>>, factory: F) -> Self
	where
		F: Fn() -> DiResult<Instance> + Send + Sync + 'static,
	{
		Self::new(
			TransientProvider {
				factory: Arc::new(factory),
			},
			Lifecycle::Transient,
			label,
		)
	}

	pub fn singleton<F>(label: impl Into<Arc<str>>, factory: F) -> Self
	where
		F: Fn() -> DiResult<Instance> + Send + Sync + 'static,
	{
		Self::new(
			SingletonProvider {
				factory: Arc::new(factory),
				cache: Mutex::new(Arc::new(OnceCell::new())),
			},
			Lifecycle::Singleton,
			label,
		)
	}

	pub fn constant(label: impl Into<Arc<str>>, instance: Instance) -> Self {
		Self::new(ConstantProvider { instance }, Lifecycle::Constant, label)
	}

	/// A binding that fails to resolve until a real binding supersedes it.
	pub fn placeholder(key: Key) -> Self {
		let label = key.to_string();
		Self::new(PlaceholderProvider { key }, Lifecycle::Placeholder, label)
	}

	/// Produces an instance according to the lifecycle.
	///
	/// Re-entering the same binding from its own factory, directly or through
	/// other bindings, fails with [`DiError::CircularDependency`].
	pub fn get_instance(&self) -> DiResult<Instance> {
		let _guard = begin_resolution(self.identity(), &self.label)?;
		self.provider.get_instance()
	}

	/// `true` once a singleton has materialized its instance.
	pub fn is_locked(&self) -> bool {
		self.provider.is_locked()
	}

	/// Drops any cached instance.
	pub fn unlock(&self) {
		self.provider.unlock();
	}

	pub fn lifecycle(&self) -> Lifecycle {
		self.lifecycle
	}

	pub fn label(&self) -> &str {
		&self.label
	}

	/// Whether both bindings share the same provider.
	pub fn ptr_eq(&self, other: &Binding) -> bool {
		Arc::ptr_eq(&self.provider, &other.provider)
	}

	pub(crate) fn identity(&self) -> usize {
		Arc::as_ptr(&self.provider) as *const () as usize
	}
}

impl fmt::Debug for Binding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Binding")
			.field("label", &self.label)
			.field("lifecycle", &self.lifecycle)
			.field("locked", &self.is_locked())
			.finish()
	}
}
