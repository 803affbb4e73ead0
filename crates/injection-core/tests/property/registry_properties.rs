//! Property-based tests for registry conflict resolution and module priority
//!
//! Invariants:
//! 1. Conflict law - a key resolves to the latest accepted registration
//! 2. Rank law - a registration of lower mode never replaces a higher one
//! 3. Priority law - the most recently used high-priority module wins

use injection_core::{Binding, DiError, Key, Locator, Mode, Module, Priority, downcast_instance, into_instance};
use proptest::prelude::*;
use std::sync::Arc;

fn mode_strategy() -> impl Strategy<Value = Mode> {
	prop_oneof![Just(Mode::Fallback), Just(Mode::Normal), Just(Mode::Override)]
}

fn constant(value: usize) -> Binding {
	Binding::constant("value", into_instance(Arc::new(value)))
}

fn resolve(locator: &Locator, key: &Key) -> usize {
	let instance = locator.lookup(key).unwrap().get_instance().unwrap();
	*downcast_instance::<usize>(&instance).unwrap()
}

proptest! {
	#[test]
	fn prop_registry_matches_conflict_model(modes in prop::collection::vec(mode_strategy(), 1..12)) {
		let locator = Locator::default();
		let key = Key::alias("subject");
		let mut current: Option<(usize, Mode)> = None;

		for (index, mode) in modes.into_iter().enumerate() {
			let result = locator.register(std::slice::from_ref(&key), constant(index), mode);

			match current {
				None => {
					prop_assert!(result.is_ok());
					current = Some((index, mode));
				}
				Some((_, existing)) if existing == mode && mode != Mode::Override => {
					let is_duplicate = matches!(result, Err(DiError::DuplicateBinding { .. }));
					prop_assert!(is_duplicate);
				}
				Some((_, existing)) if mode < existing => {
					prop_assert!(result.is_ok());
				}
				Some(_) => {
					prop_assert!(result.is_ok());
					current = Some((index, mode));
				}
			}

			if let Some((expected, _)) = current {
				prop_assert_eq!(resolve(&locator, &key), expected);
			}
		}
	}

	#[test]
	fn prop_priority_order(priorities in prop::collection::vec(any::<bool>(), 1..8)) {
		let app = Module::named("app");
		let mut expected = None;

		for (index, high) in priorities.iter().enumerate() {
			let used = Module::named(format!("used-{}", index));
			used.set_constant(Arc::new(index)).unwrap();
			let priority = if *high { Priority::High } else { Priority::Low };
			app.use_module(&used, priority).unwrap();

			if *high || expected.is_none() {
				expected = Some(index);
			}
		}

		prop_assert_eq!(Some(*app.find::<usize>().unwrap()), expected);
	}
}
