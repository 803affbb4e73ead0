//! Events emitted and propagated by modules

use injection_core::{DiError, Event, Module, Priority};
use injection_testing::fixtures::{ObservedModule, event_history, module};
use injection_testing::EventHistory;
use rstest::rstest;
use std::sync::Arc;

#[rstest]
fn test_structure_events_are_described(event_history: ObservedModule) {
	// Arrange
	let ObservedModule { module, history } = event_history;
	let library = Module::named("library");
	let other = Module::named("other");

	// Act
	module.use_module(&library, Priority::Low).unwrap();
	module.use_module(&other, Priority::Low).unwrap();
	module.change_priority(&other, Priority::High).unwrap();
	module.stop_using(&library).unwrap();

	// Assert
	assert_eq!(
		history.messages(),
		vec![
			"`module` now uses `library`.",
			"`module` now uses `other`.",
			"In `module`, the priority `high` has been applied to `other`.",
			"`module` no longer uses `library`.",
		]
	);
}

#[rstest]
fn test_stop_using_absent_module_emits_nothing(event_history: ObservedModule) {
	let library = Module::named("library");

	event_history.module.stop_using(&library).unwrap();

	assert!(event_history.history.is_empty());
}

#[rstest]
fn test_own_registration_is_proxied(event_history: ObservedModule) {
	// Arrange
	let ObservedModule { module, history } = event_history;

	// Act
	module.set_constant(Arc::new(42_u32)).unwrap();

	// Assert
	let events = history.events();
	assert_eq!(events.len(), 1);
	match &events[0] {
		Event::Proxy(proxy) => {
			assert_eq!(proxy.module, module);
			assert!(matches!(proxy.origin(), Event::DependenciesUpdated(_)));
			assert_eq!(proxy.history().len(), 1);
		}
		other => panic!("Expected a proxy event, got {:?}", other),
	}
	assert_eq!(
		history.messages()[0],
		"`module` has propagated an event: 1 dependency have been updated: `u32`."
	);
}

#[rstest]
fn test_nested_registration_reaches_outer_listener() {
	// Arrange
	let app = Module::named("app");
	let library = Module::named("library");
	let core = Module::named("core");
	app.use_module(&library, Priority::Low).unwrap();
	library.use_module(&core, Priority::Low).unwrap();
	let history = EventHistory::attach(&app);

	// Act
	core.set_constant(Arc::new(String::from("deep"))).unwrap();

	// Assert
	let events = history.events();
	assert_eq!(events.len(), 1);
	let Event::Proxy(proxy) = &events[0] else {
		panic!("Expected a proxy event");
	};
	assert_eq!(proxy.module, app);
	// registry update, then the core and library proxies
	assert_eq!(proxy.history().len(), 3);
	assert!(matches!(proxy.origin(), Event::DependenciesUpdated(update) if update.keys.len() == 1));
	assert_eq!(*app.find::<String>().unwrap(), "deep");
}

#[rstest]
fn test_stopped_module_no_longer_propagates() {
	// Arrange
	let app = Module::named("app");
	let library = Module::named("library");
	app.use_module(&library, Priority::Low).unwrap();
	app.stop_using(&library).unwrap();
	let history = EventHistory::attach(&app);

	// Act
	library.set_constant(Arc::new(1_u8)).unwrap();

	// Assert
	assert!(history.is_empty());
}

#[rstest]
fn test_vetoed_mutation_is_not_recorded(module: Module) {
	// Arrange
	let outer = Module::named("outer");
	outer.use_module(&module, Priority::Low).unwrap();
	outer
		.singleton::<String>()
		.provide(|_| Ok(Arc::new(String::from("cached"))))
		.unwrap();
	outer.find::<String>().unwrap();
	let history = EventHistory::attach(&module);
	let extra = Module::named("extra");

	// Act
	let result = module.use_module(&extra, Priority::Low);

	// Assert
	assert!(matches!(result, Err(DiError::ScopeLocked(name)) if name == "outer"));
	assert!(history.is_empty());
	assert!(module.used_modules().is_empty());
}

#[rstest]
fn test_subscription_guard(module: Module) {
	// Arrange
	let history = EventHistory::new();
	let subscription = module.subscribe(&history);
	module.set_constant(Arc::new(1_u8)).unwrap();

	// Act
	drop(subscription);
	module.set_constant(Arc::new(1_u16)).unwrap();

	// Assert
	assert_eq!(history.len(), 1);
}

#[rstest]
fn test_remove_listener(module: Module) {
	let history = EventHistory::attach(&module);

	assert!(module.remove_listener(&history));
	module.set_constant(Arc::new(1_u8)).unwrap();

	assert!(history.is_empty());
}
