//! Composable scopes
//!
//! A [`Module`] owns a [`Locator`] and an ordered list of other modules it
//! uses. Resolution searches the used modules first, in priority order, then
//! the module's own locator.
//!
//! Once a singleton anywhere below a module has been materialized the module
//! is *locked*: registrations and structural changes fail with
//! [`DiError::ScopeLocked`] until [`Module::unlock`] is called.
//!
//! Modules observe the modules they use and their own locator, and re-emit
//! whatever they receive as [`ModuleEventProxy`] events to their own
//! listeners.

use crate::binder::{Binder, Signature};
use crate::binding::{Binding, Instance, downcast_instance, into_instance};
use crate::error::{DiError, DiResult};
use crate::event::{
	Event, EventChannel, EventListener, ModuleAdded, ModuleEventProxy, ModulePriorityUpdated,
	ModuleRemoved, Reaction, Subscription,
};
use crate::key::Key;
use crate::locator::{Locator, Mode};
use crate::settings::InjectionSettings;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::{ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use uuid::Uuid;

// Serialises cycle-checked `use_module` calls across every module graph, so
// that a check and the insert it allows cannot interleave with another one.
static GRAPH_LOCK: Lazy<ReentrantMutex<()>> = Lazy::new(|| ReentrantMutex::new(()));

/// Where a used module is inserted in the search order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
	/// Searched after every module already used
	#[default]
	Low,
	/// Searched before every module already used
	High,
}

impl fmt::Display for Priority {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Priority::Low => f.write_str("low"),
			Priority::High => f.write_str("high"),
		}
	}
}

impl FromStr for Priority {
	type Err = DiError;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value.trim().to_ascii_lowercase().as_str() {
			"low" => Ok(Priority::Low),
			"high" => Ok(Priority::High),
			other => Err(DiError::Settings(format!("unknown priority `{}`", other))),
		}
	}
}

pub(crate) struct ModuleInner {
	this: Weak<ModuleInner>,
	name: String,
	locator: Locator,
	modules: RwLock<Vec<Module>>,
	channel: EventChannel,
	// Serialises structural mutations; re-entrant so listeners may read
	mutation: ReentrantMutex<()>,
	settings: InjectionSettings,
}

impl ModuleInner {
	fn handle(&self) -> DiResult<Module> {
		self.this
			.upgrade()
			.map(|inner| Module { inner })
			.ok_or_else(|| DiError::ModuleDropped(self.name.clone()))
	}

	fn used_modules(&self) -> Vec<Module> {
		self.modules.read().clone()
	}

	fn is_locked(&self) -> bool {
		self.locator.is_locked() || self.used_modules().iter().any(Module::is_locked)
	}

	fn check_locking(&self) -> DiResult<()> {
		if self.is_locked() {
			return Err(DiError::ScopeLocked(self.name.clone()));
		}
		Ok(())
	}

	fn log_event(&self, event: &Event) {
		if self.settings.log_events {
			tracing::debug!(module = %self.name, "{}", event);
		}
	}
}

impl EventListener for ModuleInner {
	fn on_event(&self, event: &Event) -> DiResult<Reaction> {
		let module = self.handle()?;
		let proxy = Event::Proxy(ModuleEventProxy {
			module: module.clone(),
			event: Box::new(event.clone()),
		});

		self.check_locking()?;
		let dispatch = self.channel.begin(&proxy)?;

		Ok(Reaction::after(move || {
			dispatch.end()?;
			module.inner.log_event(&proxy);
			Ok(())
		}))
	}
}

/// A scope composing its own registry with the modules it uses.
///
/// `Module` is a cheap handle; clones refer to the same scope and compare
/// equal.
///
/// # Examples
///
/// ```
/// use injection_core::{Module, Priority};
/// use std::sync::Arc;
///
/// let library = Module::named("library");
/// library.set_constant(Arc::new(String::from("from library"))).unwrap();
///
/// let app = Module::named("app");
/// app.use_module(&library, Priority::Low).unwrap();
///
/// assert_eq!(*app.find::<String>().unwrap(), "from library");
/// ```
#[derive(Clone)]
pub struct Module {
	inner: Arc<ModuleInner>,
}

impl Module {
	pub fn builder() -> ModuleBuilder {
		ModuleBuilder::default()
	}

	/// An anonymous module with default settings.
	pub fn new() -> Self {
		Self::builder().build()
	}

	pub fn named(name: impl Into<String>) -> Self {
		Self::builder().name(name).build()
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	pub fn settings(&self) -> &InjectionSettings {
		&self.inner.settings
	}

	/// This module's own registry.
	pub fn locator(&self) -> &Locator {
		&self.inner.locator
	}

	/// Snapshot of the used modules, in search order.
	pub fn used_modules(&self) -> Vec<Module> {
		self.inner.used_modules()
	}

	pub fn downgrade(&self) -> WeakModule {
		WeakModule {
			inner: Arc::downgrade(&self.inner),
			name: self.inner.name.clone(),
		}
	}

	// Resolution

	/// Finds the binding for `key`: used modules first, then the own locator.
	pub fn lookup(&self, key: &Key) -> DiResult<Binding> {
		for module in self.used_modules() {
			match module.lookup(key) {
				Err(error) if error.is_no_binding() => continue,
				result => return result,
			}
		}
		self.inner.locator.lookup(key)
	}

	pub fn contains(&self, key: &Key) -> bool {
		self.used_modules().iter().any(|module| module.contains(key))
			|| self.inner.locator.contains(key)
	}

	pub fn resolve(&self, key: &Key) -> DiResult<Instance> {
		self.lookup(key)?.get_instance()
	}

	/// Resolves `key` to a `T`; fails if nothing is bound.
	pub fn find_instance<T>(&self, key: &Key) -> DiResult<Arc<T>>
	where
		T: ?Sized + Send + Sync + 'static,
	{
		let instance = self.resolve(key)?;
		downcast(key, &instance)
	}

	/// Resolves `key` to a `T`; `Ok(None)` if nothing is bound.
	pub fn get_instance<T>(&self, key: &Key) -> DiResult<Option<Arc<T>>>
	where
		T: ?Sized + Send + Sync + 'static,
	{
		let binding = match self.lookup(key) {
			Ok(binding) => binding,
			Err(error) if error.is_no_binding() => return Ok(None),
			Err(error) => return Err(error),
		};
		let instance = binding.get_instance()?;
		downcast(key, &instance).map(Some)
	}

	pub fn find<T>(&self) -> DiResult<Arc<T>>
	where
		T: ?Sized + Send + Sync + 'static,
	{
		self.find_instance(&Key::of::<T>())
	}

	pub fn get<T>(&self) -> DiResult<Option<Arc<T>>>
	where
		T: ?Sized + Send + Sync + 'static,
	{
		self.get_instance(&Key::of::<T>())
	}

	/// A handle resolving `key` on access. With `cache`, the first successful
	/// resolution is kept.
	pub fn get_lazy_instance<T>(&self, key: Key, cache: bool) -> LazyInstance<T>
	where
		T: ?Sized + Send + Sync + 'static,
	{
		LazyInstance {
			module: self.clone(),
			key,
			cache: cache.then(OnceCell::new),
		}
	}

	// Registration

	/// Registers `binding` under `keys` in this module's locator.
	pub fn register(&self, keys: &[Key], binding: Binding, mode: Mode) -> DiResult<()> {
		self.inner.check_locking()?;
		self.inner.locator.register(keys, binding, mode)
	}

	/// Starts a registration of a `T` producer.
	///
	/// `T` may be a trait object: register `dyn Shape` and provide
	/// `Arc<dyn Shape>` values to resolve them through the trait.
	pub fn injectable<T>(&self) -> Injectable<'_, T>
	where
		T: ?Sized + Send + Sync + 'static,
	{
		Injectable {
			module: self,
			keys: Vec::new(),
			mode: self.inner.settings.default_mode,
			singleton: false,
			alias: false,
			_marker: PhantomData,
		}
	}

	pub fn singleton<T>(&self) -> Injectable<'_, T>
	where
		T: ?Sized + Send + Sync + 'static,
	{
		self.injectable::<T>().singleton()
	}

	/// Registers a pre-built `T` under its own type.
	pub fn set_constant<T>(&self, value: Arc<T>) -> DiResult<()>
	where
		T: ?Sized + Send + Sync + 'static,
	{
		self.injectable::<T>().constant(value)
	}

	/// Declares that `T` must be bound by someone else. Resolving it fails
	/// until a real binding supersedes the placeholder.
	pub fn should_be_injectable<T>(&self) -> DiResult<()>
	where
		T: ?Sized + 'static,
	{
		let key = Key::of::<T>();
		self.register(
			std::slice::from_ref(&key),
			Binding::placeholder(key.clone()),
			Mode::Fallback,
		)
	}

	/// A binder injecting the dependencies declared by `signature`.
	pub fn inject(&self, signature: Signature) -> Binder {
		Binder::new(self, signature)
	}

	// Structure

	/// Makes this module search `module` at the position given by `priority`.
	pub fn use_module(&self, module: &Module, priority: Priority) -> DiResult<()> {
		let _mutation = self.inner.mutation.lock();

		if module == self {
			return Err(DiError::ScopeSelfUse(self.name().to_string()));
		}

		if self.inner.modules.read().contains(module) {
			return Err(DiError::ScopeAlreadyUsed {
				module: self.name().to_string(),
				used: module.name().to_string(),
			});
		}

		let graph = self
			.inner
			.settings
			.detect_module_cycles
			.then(|| GRAPH_LOCK.lock());

		if graph.is_some() {
			if let Some(path) = module.path_to(self) {
				let path: Vec<&str> = path.iter().map(Module::name).collect();
				return Err(DiError::ScopeCycle {
					module: self.name().to_string(),
					used: module.name().to_string(),
					path: format!("{} -> {}", self.name(), path.join(" -> ")),
				});
			}
		}

		let event = Event::ModuleAdded(ModuleAdded {
			module: self.clone(),
			added: module.clone(),
			priority,
		});
		self.dispatch(&event, || {
			insert(&mut self.inner.modules.write(), module.clone(), priority);
			module.inner.channel.add_listener(&self.inner);
			Ok(())
		})
	}

	/// Stops searching `module`; does nothing if it is not used.
	pub fn stop_using(&self, module: &Module) -> DiResult<()> {
		let _mutation = self.inner.mutation.lock();
		self.inner.check_locking()?;

		if !self.inner.modules.read().contains(module) {
			return Ok(());
		}

		let event = Event::ModuleRemoved(ModuleRemoved {
			module: self.clone(),
			removed: module.clone(),
		});
		self.dispatch(&event, || {
			self.inner.modules.write().retain(|used| used != module);
			module.inner.channel.remove_listener(&self.inner);
			Ok(())
		})
	}

	/// Moves an already used module to the position given by `priority`.
	pub fn change_priority(&self, module: &Module, priority: Priority) -> DiResult<()> {
		let _mutation = self.inner.mutation.lock();
		self.inner.check_locking()?;

		if !self.inner.modules.read().contains(module) {
			return Err(DiError::ScopeNotUsed {
				module: self.name().to_string(),
				used: module.name().to_string(),
			});
		}

		let event = Event::ModulePriorityUpdated(ModulePriorityUpdated {
			module: self.clone(),
			updated: module.clone(),
			priority,
		});
		self.dispatch(&event, || {
			let mut modules = self.inner.modules.write();
			modules.retain(|used| used != module);
			insert(&mut modules, module.clone(), priority);
			Ok(())
		})
	}

	/// Uses `module` until the returned guard is finished or dropped.
	pub fn use_temporarily(&self, module: &Module, priority: Priority) -> DiResult<TemporaryUse> {
		self.use_module(module, priority)?;
		Ok(TemporaryUse {
			module: self.clone(),
			used: module.clone(),
			active: true,
		})
	}

	/// Runs `f` while `module` is used, then stops using it.
	///
	/// Fails with [`DiError::ScopeLocked`] if `f` left this module locked, in
	/// which case `module` is still used. If `f` unwinds, stopping is
	/// attempted while unwinding.
	pub fn with_module<R>(
		&self,
		module: &Module,
		priority: Priority,
		f: impl FnOnce(&Module) -> R,
	) -> DiResult<R> {
		let guard = self.use_temporarily(module, priority)?;
		let value = f(self);
		guard.finish()?;
		Ok(value)
	}

	/// Replaces every used module with `modules`, in order, at the default
	/// priority.
	pub fn init_modules<'a>(&self, modules: impl IntoIterator<Item = &'a Module>) -> DiResult<()> {
		let _mutation = self.inner.mutation.lock();

		for module in self.used_modules() {
			self.stop_using(&module)?;
		}

		let priority = self.inner.settings.default_priority;
		for module in modules {
			self.use_module(module, priority)?;
		}

		Ok(())
	}

	/// `true` if this module's locator, or any used module, is locked.
	pub fn is_locked(&self) -> bool {
		self.inner.is_locked()
	}

	/// Unlocks this module's locator and, recursively, every used module.
	pub fn unlock(&self) {
		let _mutation = self.inner.mutation.lock();
		self.inner.locator.unlock();
		for module in self.used_modules() {
			module.unlock();
		}
	}

	// Listeners

	pub fn add_listener<L>(&self, listener: &Arc<L>)
	where
		L: EventListener + 'static,
	{
		self.inner.channel.add_listener(listener);
	}

	pub fn remove_listener<L>(&self, listener: &Arc<L>) -> bool
	where
		L: EventListener + 'static,
	{
		self.inner.channel.remove_listener(listener)
	}

	/// Adds `listener` for as long as the returned guard lives.
	pub fn subscribe<L>(&self, listener: &Arc<L>) -> Subscription
	where
		L: EventListener + 'static,
	{
		self.inner.channel.subscribe(listener)
	}

	fn dispatch(&self, event: &Event, apply: impl FnOnce() -> DiResult<()>) -> DiResult<()> {
		self.inner.check_locking()?;
		self.inner.channel.dispatch(event, apply)?;
		self.inner.log_event(event);
		Ok(())
	}

	/// Modules from `self` down to `target` through used modules, if any.
	fn path_to(&self, target: &Module) -> Option<Vec<Module>> {
		if self == target {
			return Some(vec![self.clone()]);
		}
		self.used_modules().iter().find_map(|module| {
			module.path_to(target).map(|mut path| {
				path.insert(0, self.clone());
				path
			})
		})
	}
}

fn insert(modules: &mut Vec<Module>, module: Module, priority: Priority) {
	match priority {
		Priority::High => modules.insert(0, module),
		Priority::Low => modules.push(module),
	}
}

fn downcast<T>(key: &Key, instance: &Instance) -> DiResult<Arc<T>>
where
	T: ?Sized + Send + Sync + 'static,
{
	downcast_instance::<T>(instance).ok_or_else(|| DiError::TypeMismatch {
		key: key.clone(),
		expected: std::any::type_name::<T>(),
	})
}

impl Default for Module {
	fn default() -> Self {
		Self::new()
	}
}

impl PartialEq for Module {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Eq for Module {}

impl Hash for Module {
	fn hash<H: Hasher>(&self, state: &mut H) {
		std::ptr::hash(Arc::as_ptr(&self.inner), state);
	}
}

impl fmt::Debug for Module {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Module").field("name", &self.inner.name).finish()
	}
}

impl fmt::Display for Module {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.inner.name)
	}
}

/// Builds a [`Module`].
#[derive(Debug, Default)]
pub struct ModuleBuilder {
	name: Option<String>,
	settings: InjectionSettings,
}

impl ModuleBuilder {
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	pub fn settings(mut self, settings: InjectionSettings) -> Self {
		self.settings = settings;
		self
	}

	pub fn build(self) -> Module {
		let name = self.name.unwrap_or_else(anonymous_name);
		let settings = self.settings;
		let inner = Arc::new_cyclic(|this| ModuleInner {
			this: this.clone(),
			name,
			locator: Locator::new(settings.resolve_generic_origin),
			modules: RwLock::new(Vec::new()),
			channel: EventChannel::new(),
			mutation: ReentrantMutex::new(()),
			settings,
		});
		inner.locator.add_listener(&inner);
		Module { inner }
	}
}

fn anonymous_name() -> String {
	let id = Uuid::new_v4().simple().to_string();
	format!("anonymous@{}", &id[..7])
}

/// A weak handle to a module, as held by the factories registered into it.
#[derive(Clone)]
pub struct WeakModule {
	inner: Weak<ModuleInner>,
	name: String,
}

impl WeakModule {
	pub fn upgrade(&self) -> DiResult<Module> {
		self.inner
			.upgrade()
			.map(|inner| Module { inner })
			.ok_or_else(|| DiError::ModuleDropped(self.name.clone()))
	}
}

impl fmt::Debug for WeakModule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WeakModule").field("name", &self.name).finish()
	}
}

/// Registration builder returned by [`Module::injectable`].
#[must_use = "nothing is registered until `provide` or `constant` is called"]
pub struct Injectable<'a, T: ?Sized> {
	module: &'a Module,
	keys: Vec<Key>,
	mode: Mode,
	singleton: bool,
	alias: bool,
	_marker: PhantomData<fn() -> Arc<T>>,
}

impl<'a, T> Injectable<'a, T>
where
	T: ?Sized + Send + Sync + 'static,
{
	/// Also registers under `key`.
	pub fn on(mut self, key: impl Into<Key>) -> Self {
		self.keys.push(key.into());
		self
	}

	pub fn mode(mut self, mode: Mode) -> Self {
		self.mode = mode;
		self
	}

	/// Produces the instance once and keeps it until the module is unlocked.
	pub fn singleton(mut self) -> Self {
		self.singleton = true;
		self
	}

	/// Registers only under the keys given to [`Injectable::on`], not under `T`.
	pub fn alias(mut self) -> Self {
		self.alias = true;
		self
	}

	/// Registers `factory`. It receives the module it was registered into, so
	/// its own dependencies follow that module's current composition.
	pub fn provide<F>(self, factory: F) -> DiResult<()>
	where
		F: Fn(&Module) -> DiResult<Arc<T>> + Send + Sync + 'static,
	{
		let module = self.module.downgrade();
		let produce = move || -> DiResult<Instance> {
			let module = module.upgrade()?;
			factory(&module).map(into_instance)
		};

		let label = std::any::type_name::<T>();
		let binding = if self.singleton {
			Binding::singleton(label, produce)
		} else {
			Binding::transient(label, produce)
		};
		self.register(binding)
	}

	/// Registers a pre-built instance.
	pub fn constant(self, value: Arc<T>) -> DiResult<()> {
		let binding = Binding::constant(std::any::type_name::<T>(), into_instance(value));
		self.register(binding)
	}

	fn register(self, binding: Binding) -> DiResult<()> {
		let mut keys = Vec::with_capacity(self.keys.len() + 1);
		if !self.alias {
			keys.push(Key::of::<T>());
		}
		keys.extend(self.keys);
		self.module.register(&keys, binding, self.mode)
	}
}

/// A module used until this guard is finished or dropped.
///
/// Dropping the guard can only log a failure to stop; call
/// [`TemporaryUse::finish`] to receive it.
#[must_use = "the module is stopped being used as soon as the guard is dropped"]
pub struct TemporaryUse {
	module: Module,
	used: Module,
	active: bool,
}

impl TemporaryUse {
	/// Stops using the module.
	pub fn finish(mut self) -> DiResult<()> {
		self.active = false;
		self.module.stop_using(&self.used)
	}
}

impl Drop for TemporaryUse {
	fn drop(&mut self) {
		if !self.active {
			return;
		}
		if let Err(error) = self.module.stop_using(&self.used) {
			tracing::warn!(
				module = %self.module,
				used = %self.used,
				%error,
				"failed to stop using a temporarily used module"
			);
		}
	}
}

impl fmt::Debug for TemporaryUse {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TemporaryUse")
			.field("module", &self.module)
			.field("used", &self.used)
			.finish()
	}
}

/// A deferred resolution returned by [`Module::get_lazy_instance`].
pub struct LazyInstance<T: ?Sized> {
	module: Module,
	key: Key,
	cache: Option<OnceCell<Option<Arc<T>>>>,
}

impl<T> LazyInstance<T>
where
	T: ?Sized + Send + Sync + 'static,
{
	/// Resolves the key, or returns the cached instance.
	///
	/// Failures are never cached.
	pub fn get(&self) -> DiResult<Option<Arc<T>>> {
		match &self.cache {
			Some(cell) => cell
				.get_or_try_init(|| self.module.get_instance(&self.key))
				.cloned(),
			None => self.module.get_instance(&self.key),
		}
	}

	pub fn key(&self) -> &Key {
		&self.key
	}

	/// `true` once a cached instance has been resolved.
	pub fn is_set(&self) -> bool {
		self.cache.as_ref().is_some_and(|cell| cell.get().is_some())
	}
}

impl<T: ?Sized> fmt::Debug for LazyInstance<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LazyInstance")
			.field("module", &self.module)
			.field("key", &self.key)
			.field("cached", &self.cache.is_some())
			.finish()
	}
}
