//! Resolution laws of modules and their registries

use injection_core::{DiError, Key, Mode, Module, Priority};
use injection_testing::fixtures::module;
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

trait Shape: Send + Sync {
	fn name(&self) -> &'static str;
}

struct Circle;
struct Square;
struct Triangle;

impl Shape for Circle {
	fn name(&self) -> &'static str {
		"circle"
	}
}

impl Shape for Square {
	fn name(&self) -> &'static str {
		"square"
	}
}

impl Shape for Triangle {
	fn name(&self) -> &'static str {
		"triangle"
	}
}

fn shape_name(module: &Module) -> &'static str {
	module.find::<dyn Shape>().unwrap().name()
}

#[rstest]
fn test_shape_example(module: Module) {
	// Arrange
	module
		.injectable::<dyn Shape>()
		.provide(|_| Ok(Arc::new(Circle) as Arc<dyn Shape>))
		.unwrap();

	// Act
	let first = module.find::<dyn Shape>().unwrap();
	let second = module.find::<dyn Shape>().unwrap();

	// Assert
	assert_eq!(first.name(), "circle");
	assert!(!Arc::ptr_eq(&first, &second));

	// Act
	let duplicate = module
		.injectable::<dyn Shape>()
		.provide(|_| Ok(Arc::new(Square) as Arc<dyn Shape>));

	// Assert
	match duplicate {
		Err(DiError::DuplicateBinding { key, existing, new }) => {
			assert!(key.to_string().contains("Shape"));
			assert_eq!(existing, Mode::Normal);
			assert_eq!(new, Mode::Normal);
		}
		other => panic!("Expected DuplicateBinding, got {:?}", other),
	}

	// Act
	module
		.injectable::<dyn Shape>()
		.mode(Mode::Override)
		.provide(|_| Ok(Arc::new(Square) as Arc<dyn Shape>))
		.unwrap();

	// Assert
	assert_eq!(shape_name(&module), "square");
}

#[rstest]
fn test_last_override_wins(module: Module) {
	module
		.injectable::<dyn Shape>()
		.constant(Arc::new(Circle))
		.unwrap();

	for shape in [
		Arc::new(Square) as Arc<dyn Shape>,
		Arc::new(Triangle) as Arc<dyn Shape>,
	] {
		module
			.injectable::<dyn Shape>()
			.mode(Mode::Override)
			.constant(shape)
			.unwrap();
	}

	assert_eq!(shape_name(&module), "triangle");
}

#[rstest]
fn test_fallback_placeholder_is_superseded(module: Module) {
	// Arrange
	module.should_be_injectable::<dyn Shape>().unwrap();
	assert!(matches!(
		module.find::<dyn Shape>(),
		Err(DiError::PlaceholderUnresolved(_))
	));

	// Act
	module
		.injectable::<dyn Shape>()
		.constant(Arc::new(Circle))
		.unwrap();

	// Assert
	assert_eq!(shape_name(&module), "circle");
}

#[rstest]
fn test_high_priority_module_shadows_low_priority_module() {
	// Arrange
	let app = Module::named("app");
	let low = Module::named("low");
	let high = Module::named("high");
	low.injectable::<dyn Shape>()
		.constant(Arc::new(Circle))
		.unwrap();
	high.injectable::<dyn Shape>()
		.constant(Arc::new(Square))
		.unwrap();

	// Act
	app.use_module(&low, Priority::Low).unwrap();
	app.use_module(&high, Priority::High).unwrap();

	// Assert
	assert_eq!(shape_name(&app), "square");
}

#[rstest]
fn test_used_modules_take_precedence_over_own_registry() {
	let app = Module::named("app");
	let library = Module::named("library");
	app.injectable::<dyn Shape>()
		.constant(Arc::new(Circle))
		.unwrap();
	library
		.injectable::<dyn Shape>()
		.constant(Arc::new(Triangle))
		.unwrap();

	app.use_module(&library, Priority::Low).unwrap();

	assert_eq!(shape_name(&app), "triangle");
}

#[rstest]
fn test_missing_key_reports_the_key(module: Module) {
	let result = module.find::<dyn Shape>();

	match result {
		Err(DiError::NoBinding(key)) => assert_eq!(key, Key::of::<dyn Shape>()),
		other => panic!("Expected NoBinding, got {:?}", other.map(|_| ())),
	}
}

#[rstest]
fn test_transient_and_singleton_identity(module: Module) {
	// Arrange
	let calls = Arc::new(AtomicUsize::new(0));
	let counter = calls.clone();
	module
		.injectable::<String>()
		.provide(move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
			Ok(Arc::new(String::from("transient")))
		})
		.unwrap();
	module
		.singleton::<dyn Shape>()
		.provide(|_| Ok(Arc::new(Circle) as Arc<dyn Shape>))
		.unwrap();

	// Act
	let first = module.find::<String>().unwrap();
	let second = module.find::<String>().unwrap();
	let shape_a = module.find::<dyn Shape>().unwrap();
	let shape_b = module.find::<dyn Shape>().unwrap();

	// Assert
	assert!(!Arc::ptr_eq(&first, &second));
	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert!(Arc::ptr_eq(&shape_a, &shape_b));
}

#[rstest]
fn test_lock_forbids_mutation_until_unlocked() {
	// Arrange
	let app = Module::named("app");
	let library = Module::named("library");
	let extra = Module::named("extra");
	app.use_module(&library, Priority::Low).unwrap();
	library
		.singleton::<dyn Shape>()
		.provide(|_| Ok(Arc::new(Circle) as Arc<dyn Shape>))
		.unwrap();
	app.find::<dyn Shape>().unwrap();

	// Act
	let use_result = app.use_module(&extra, Priority::Low);
	let register_result = app.set_constant(Arc::new(String::from("late")));
	let priority_result = app.change_priority(&library, Priority::High);

	// Assert
	assert!(app.is_locked());
	assert!(matches!(use_result, Err(DiError::ScopeLocked(name)) if name == "app"));
	assert!(matches!(register_result, Err(DiError::ScopeLocked(_))));
	assert!(matches!(priority_result, Err(DiError::ScopeLocked(_))));

	// Act
	app.unlock();

	// Assert
	assert!(!app.is_locked());
	assert!(!library.is_locked());
	assert!(app.use_module(&extra, Priority::Low).is_ok());
	assert!(app.set_constant(Arc::new(String::from("late"))).is_ok());
	assert!(app.change_priority(&library, Priority::High).is_ok());
}

#[rstest]
fn test_registration_in_used_module_is_vetoed_by_locked_user() {
	// Arrange
	let app = Module::named("app");
	let library = Module::named("library");
	app.use_module(&library, Priority::Low).unwrap();
	app.singleton::<dyn Shape>()
		.provide(|_| Ok(Arc::new(Circle) as Arc<dyn Shape>))
		.unwrap();
	app.find::<dyn Shape>().unwrap();

	// Act
	let result = library.set_constant(Arc::new(String::from("library")));

	// Assert
	assert!(matches!(result, Err(DiError::ScopeLocked(name)) if name == "app"));
	assert!(!library.contains(&Key::of::<String>()));
}

#[rstest]
fn test_temporary_use_is_undone_on_drop(module: Module) {
	// Arrange
	let overrides = Module::named("overrides");
	overrides
		.injectable::<dyn Shape>()
		.constant(Arc::new(Square))
		.unwrap();
	module
		.injectable::<dyn Shape>()
		.constant(Arc::new(Circle))
		.unwrap();

	// Act
	{
		let _guard = module.use_temporarily(&overrides, Priority::High).unwrap();
		assert_eq!(shape_name(&module), "square");
	}

	// Assert
	assert_eq!(shape_name(&module), "circle");
	assert!(module.used_modules().is_empty());
}

#[rstest]
fn test_factory_dependencies_follow_module_composition() {
	// Arrange
	struct Canvas(&'static str);

	let app = Module::named("app");
	let shapes = Module::named("shapes");
	app.injectable::<Canvas>()
		.provide(|module| {
			let shape = module.find::<dyn Shape>()?;
			Ok(Arc::new(Canvas(shape.name())))
		})
		.unwrap();
	shapes
		.injectable::<dyn Shape>()
		.constant(Arc::new(Triangle))
		.unwrap();

	// Act
	let missing = app.find::<Canvas>();
	app.use_module(&shapes, Priority::Low).unwrap();
	let canvas = app.find::<Canvas>().unwrap();

	// Assert
	assert!(matches!(missing, Err(DiError::NoBinding(_))));
	assert_eq!(canvas.0, "triangle");
}

#[rstest]
fn test_mutually_dependent_factories_report_cycle() {
	// Arrange
	struct Left;
	struct Right;

	let module = Module::named("cyclic");
	module
		.injectable::<Left>()
		.provide(|module| {
			module.find::<Right>()?;
			Ok(Arc::new(Left))
		})
		.unwrap();
	module
		.injectable::<Right>()
		.provide(|module| {
			module.find::<Left>()?;
			Ok(Arc::new(Right))
		})
		.unwrap();

	// Act
	let result = module.find::<Left>();

	// Assert
	match result {
		Err(DiError::CircularDependency { path, .. }) => {
			assert_eq!(path.matches(" -> ").count(), 2);
		}
		other => panic!("Expected CircularDependency, got {:?}", other.map(|_| ())),
	}
}
