//! Shadowing a module with test doubles

use injection_core::{DiResult, Module, Priority, TemporaryUse};

/// Keeps a test module in use; restores the original composition on drop.
///
/// Dropping it unlocks the module, so singletons built from test doubles
/// don't survive, then stops using the test module.
#[must_use = "the test module is removed as soon as this guard is dropped"]
pub struct TestInjectables {
	module: Module,
	guard: Option<TemporaryUse>,
}

impl TestInjectables {
	pub fn module(&self) -> &Module {
		&self.module
	}

	/// Unlocks the module and stops using the test module, reporting failure.
	pub fn finish(mut self) -> DiResult<()> {
		self.module.unlock();
		match self.guard.take() {
			Some(guard) => guard.finish(),
			None => Ok(()),
		}
	}
}

impl Drop for TestInjectables {
	fn drop(&mut self) {
		self.module.unlock();
		drop(self.guard.take());
	}
}

/// Makes `module` search `test_module` first until the guard is dropped.
///
/// Both modules are unlocked beforehand.
///
/// # Examples
///
/// ```
/// use injection_core::Module;
/// use injection_testing::use_test_injectables;
/// use std::sync::Arc;
///
/// let module = Module::named("app");
/// module.set_constant(Arc::new(String::from("production"))).unwrap();
///
/// let test_module = Module::named("app-tests");
/// test_module.set_constant(Arc::new(String::from("double"))).unwrap();
///
/// {
/// 	let _guard = use_test_injectables(&module, &test_module).unwrap();
/// 	assert_eq!(*module.find::<String>().unwrap(), "double");
/// }
/// assert_eq!(*module.find::<String>().unwrap(), "production");
/// ```
pub fn use_test_injectables(module: &Module, test_module: &Module) -> DiResult<TestInjectables> {
	module.unlock();
	test_module.unlock();

	let guard = module.use_temporarily(test_module, Priority::High)?;
	Ok(TestInjectables {
		module: module.clone(),
		guard: Some(guard),
	})
}

/// Runs `f` with `test_module` shadowing `module`.
pub fn with_test_injectables<R>(
	module: &Module,
	test_module: &Module,
	f: impl FnOnce(&Module) -> R,
) -> DiResult<R> {
	let guard = use_test_injectables(module, test_module)?;
	let value = f(guard.module());
	guard.finish()?;
	Ok(value)
}
