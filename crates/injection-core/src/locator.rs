//! Keyed binding registry
//!
//! A [`Locator`] stores at most one [`Record`] per [`ConcreteKey`]. Whether a
//! new registration may replace an existing record is decided by their
//! [`Mode`]s, atomically with the write.

use crate::binding::Binding;
use crate::error::{DiError, DiResult};
use crate::event::{DependenciesUpdated, Event, EventChannel, EventListener, Subscription};
use crate::key::{ConcreteKey, Key};
use parking_lot::{ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Registration precedence, ordered from lowest to highest.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
	/// Used only if nothing else is bound
	Fallback,
	#[default]
	Normal,
	/// Replaces anything, including a previous override
	Override,
}

impl Mode {
	pub fn rank(self) -> i8 {
		match self {
			Mode::Fallback => -1,
			Mode::Normal => 0,
			Mode::Override => 1,
		}
	}
}

impl fmt::Display for Mode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Mode::Fallback => "fallback",
			Mode::Normal => "normal",
			Mode::Override => "override",
		};
		f.write_str(name)
	}
}

impl FromStr for Mode {
	type Err = DiError;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value.trim().to_ascii_lowercase().as_str() {
			"fallback" => Ok(Mode::Fallback),
			"normal" => Ok(Mode::Normal),
			"override" => Ok(Mode::Override),
			other => Err(DiError::Settings(format!("unknown mode `{}`", other))),
		}
	}
}

/// A binding stored under a key, with the mode it was registered with.
#[derive(Debug, Clone)]
pub struct Record {
	pub binding: Binding,
	pub mode: Mode,
}

/// A keyed store of bindings.
pub struct Locator {
	records: RwLock<HashMap<ConcreteKey, Record>>,
	update_lock: ReentrantMutex<()>,
	channel: EventChannel,
	with_origin: bool,
}

impl Locator {
	/// `with_origin` makes lookups of a generic key also try its origin.
	pub fn new(with_origin: bool) -> Self {
		Self {
			records: RwLock::new(HashMap::new()),
			update_lock: ReentrantMutex::new(()),
			channel: EventChannel::new(),
			with_origin,
		}
	}

	/// Returns the binding of the first concrete key of `key` that has a record.
	pub fn lookup(&self, key: &Key) -> DiResult<Binding> {
		let records = self.records.read();
		key.normalize(self.with_origin)
			.iter()
			.find_map(|concrete| records.get(concrete))
			.map(|record| record.binding.clone())
			.ok_or_else(|| DiError::NoBinding(key.clone()))
	}

	pub fn contains(&self, key: &Key) -> bool {
		let records = self.records.read();
		key.normalize(self.with_origin)
			.iter()
			.any(|concrete| records.contains_key(concrete))
	}

	/// Registers `binding` under every concrete key of `keys`.
	///
	/// For a key that already holds a record, an equal non-override mode is a
	/// conflict and aborts the whole registration, while a lower mode leaves
	/// the existing record in place. When at least one key is accepted, a
	/// single [`DependenciesUpdated`] event listing them is dispatched.
	pub fn register(&self, keys: &[Key], binding: Binding, mode: Mode) -> DiResult<()> {
		let _update = self.update_lock.lock();

		let accepted = {
			let records = self.records.read();
			let mut accepted = Vec::new();
			for key in Key::normalize_all(keys, false) {
				match records.get(&key) {
					None => accepted.push(key),
					Some(record) if record.mode == mode && mode != Mode::Override => {
						return Err(DiError::DuplicateBinding {
							key,
							existing: record.mode,
							new: mode,
						});
					}
					Some(record) if mode.rank() < record.mode.rank() => {}
					Some(_) => accepted.push(key),
				}
			}
			accepted
		};

		if accepted.is_empty() {
			return Ok(());
		}

		let event = Event::DependenciesUpdated(DependenciesUpdated {
			keys: accepted.clone(),
			mode,
		});
		self.channel.dispatch(&event, || {
			let mut records = self.records.write();
			for key in accepted {
				records.insert(
					key,
					Record {
						binding: binding.clone(),
						mode,
					},
				);
			}
			Ok(())
		})
	}

	/// `true` if any stored binding has materialized state.
	pub fn is_locked(&self) -> bool {
		self.records
			.read()
			.values()
			.any(|record| record.binding.is_locked())
	}

	/// Unlocks every distinct binding.
	pub fn unlock(&self) {
		let _update = self.update_lock.lock();
		for binding in self.distinct_bindings() {
			binding.unlock();
		}
	}

	pub fn len(&self) -> usize {
		self.records.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.read().is_empty()
	}

	pub fn add_listener<L>(&self, listener: &Arc<L>)
	where
		L: EventListener + 'static,
	{
		self.channel.add_listener(listener);
	}

	pub fn remove_listener<L>(&self, listener: &Arc<L>) -> bool
	where
		L: EventListener + 'static,
	{
		self.channel.remove_listener(listener)
	}

	pub fn subscribe<L>(&self, listener: &Arc<L>) -> Subscription
	where
		L: EventListener + 'static,
	{
		self.channel.subscribe(listener)
	}

	fn distinct_bindings(&self) -> Vec<Binding> {
		let records = self.records.read();
		let mut bindings: Vec<Binding> = Vec::new();
		for record in records.values() {
			if !bindings.iter().any(|known| known.ptr_eq(&record.binding)) {
				bindings.push(record.binding.clone());
			}
		}
		bindings
	}
}

impl Default for Locator {
	fn default() -> Self {
		Self::new(true)
	}
}

impl fmt::Debug for Locator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Locator")
			.field("records", &self.len())
			.field("with_origin", &self.with_origin)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::binding::{Instance, downcast_instance, into_instance};
	use crate::event::Reaction;
	use parking_lot::Mutex;
	use rstest::{fixture, rstest};

	struct Shape;

	fn constant(value: &'static str) -> Binding {
		Binding::constant(value, into_instance(Arc::new(value)))
	}

	fn resolved(locator: &Locator, key: &Key) -> &'static str {
		let instance: Instance = locator.lookup(key).unwrap().get_instance().unwrap();
		*downcast_instance::<&'static str>(&instance).unwrap()
	}

	#[derive(Default)]
	struct Updates {
		events: Mutex<Vec<(usize, Mode)>>,
	}

	impl EventListener for Updates {
		fn on_event(&self, event: &Event) -> DiResult<Reaction> {
			if let Event::DependenciesUpdated(update) = event {
				self.events.lock().push((update.keys.len(), update.mode));
			}
			Ok(Reaction::none())
		}
	}

	#[fixture]
	fn locator() -> Locator {
		Locator::default()
	}

	#[rstest]
	fn test_lookup_missing_key(locator: Locator) {
		let result = locator.lookup(&Key::of::<Shape>());

		assert!(matches!(result, Err(DiError::NoBinding(_))));
		assert!(!locator.contains(&Key::of::<Shape>()));
	}

	#[rstest]
	fn test_normal_twice_conflicts(locator: Locator) {
		// Arrange
		let key = Key::of::<Shape>();
		locator.register(&[key.clone()], constant("circle"), Mode::Normal).unwrap();

		// Act
		let result = locator.register(&[key.clone()], constant("square"), Mode::Normal);

		// Assert
		match result {
			Err(DiError::DuplicateBinding { existing, new, .. }) => {
				assert_eq!(existing, Mode::Normal);
				assert_eq!(new, Mode::Normal);
			}
			other => panic!("Expected DuplicateBinding, got {:?}", other),
		}
		assert_eq!(resolved(&locator, &key), "circle");
	}

	#[rstest]
	fn test_last_override_wins(locator: Locator) {
		let key = Key::of::<Shape>();
		locator.register(&[key.clone()], constant("circle"), Mode::Normal).unwrap();

		locator.register(&[key.clone()], constant("square"), Mode::Override).unwrap();
		assert_eq!(resolved(&locator, &key), "square");

		locator.register(&[key.clone()], constant("triangle"), Mode::Override).unwrap();
		assert_eq!(resolved(&locator, &key), "triangle");
	}

	#[rstest]
	fn test_lower_mode_is_skipped_silently(locator: Locator) {
		// Arrange
		let key = Key::of::<Shape>();
		let updates = Arc::new(Updates::default());
		locator.add_listener(&updates);
		locator.register(&[key.clone()], constant("circle"), Mode::Override).unwrap();

		// Act
		locator.register(&[key.clone()], constant("square"), Mode::Normal).unwrap();
		locator.register(&[key.clone()], constant("oval"), Mode::Fallback).unwrap();

		// Assert
		assert_eq!(resolved(&locator, &key), "circle");
		assert_eq!(*updates.events.lock(), vec![(1, Mode::Override)]);
	}

	#[rstest]
	fn test_fallback_placeholder_is_superseded(locator: Locator) {
		// Arrange
		let key = Key::of::<Shape>();
		locator
			.register(&[key.clone()], Binding::placeholder(key.clone()), Mode::Fallback)
			.unwrap();
		assert!(matches!(
			locator.lookup(&key).unwrap().get_instance(),
			Err(DiError::PlaceholderUnresolved(_))
		));

		// Act
		locator.register(&[key.clone()], constant("circle"), Mode::Normal).unwrap();

		// Assert
		assert_eq!(resolved(&locator, &key), "circle");
	}

	#[rstest]
	fn test_event_lists_only_accepted_keys(locator: Locator) {
		// Arrange
		let updates = Arc::new(Updates::default());
		let _subscription = locator.subscribe(&updates);
		locator.register(&[Key::alias("a")], constant("a"), Mode::Override).unwrap();

		// Act
		locator
			.register(&[Key::alias("a"), Key::alias("b"), Key::alias("c")], constant("x"), Mode::Normal)
			.unwrap();

		// Assert
		assert_eq!(*updates.events.lock(), vec![(1, Mode::Override), (2, Mode::Normal)]);
		assert_eq!(resolved(&locator, &Key::alias("a")), "a");
		assert_eq!(resolved(&locator, &Key::alias("b")), "x");
	}

	#[rstest]
	fn test_conflict_aborts_whole_registration(locator: Locator) {
		locator.register(&[Key::alias("b")], constant("b"), Mode::Normal).unwrap();

		let result = locator.register(&[Key::alias("a"), Key::alias("b")], constant("x"), Mode::Normal);

		assert!(result.is_err());
		assert!(!locator.contains(&Key::alias("a")));
	}

	#[rstest]
	fn test_union_lookup_returns_first_bound(locator: Locator) {
		locator.register(&[Key::alias("second")], constant("second"), Mode::Normal).unwrap();

		let key = Key::any_of([Key::alias("first"), Key::alias("second")]);

		assert_eq!(resolved(&locator, &key), "second");
	}

	#[rstest]
	#[case(true, true)]
	#[case(false, false)]
	fn test_generic_origin_lookup(#[case] with_origin: bool, #[case] expected: bool) {
		struct Repository<T>(T);
		let locator = Locator::new(with_origin);
		let origin = ConcreteKey::Alias("Repository".into());
		locator.register(&[Key::from(origin.clone())], constant("any"), Mode::Normal).unwrap();

		let found = locator.contains(&Key::generic::<Repository<u8>>(origin));

		assert_eq!(found, expected);
	}

	#[rstest]
	fn test_unlock_resets_shared_singleton(locator: Locator) {
		// Arrange
		let binding = Binding::singleton("shared", || Ok(into_instance(Arc::new(0_u8))));
		locator
			.register(&[Key::alias("a"), Key::alias("b")], binding, Mode::Normal)
			.unwrap();
		locator.lookup(&Key::alias("b")).unwrap().get_instance().unwrap();
		assert!(locator.is_locked());

		// Act
		locator.unlock();

		// Assert
		assert!(!locator.is_locked());
		assert_eq!(locator.len(), 2);
	}

	#[rstest]
	fn test_concurrent_normal_registration_has_one_winner() {
		// Arrange
		let locator = Arc::new(Locator::default());

		// Act
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let locator = locator.clone();
				std::thread::spawn(move || {
					locator
						.register(&[Key::alias("contested")], constant("value"), Mode::Normal)
						.is_ok()
				})
			})
			.collect();
		let winners = handles
			.into_iter()
			.map(|handle| handle.join().unwrap())
			.filter(|won| *won)
			.count();

		// Assert
		assert_eq!(winners, 1);
	}

	#[rstest]
	#[case("fallback", Mode::Fallback)]
	#[case("Normal", Mode::Normal)]
	#[case(" override ", Mode::Override)]
	fn test_mode_from_str(#[case] input: &str, #[case] expected: Mode) {
		assert_eq!(input.parse::<Mode>().unwrap(), expected);
	}

	#[rstest]
	fn test_mode_order() {
		assert!(Mode::Fallback < Mode::Normal);
		assert!(Mode::Normal < Mode::Override);
	}
}
