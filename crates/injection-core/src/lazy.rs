//! One-shot deferred values

use std::fmt;

type Producer<T> = Box<dyn FnOnce() -> T + Send>;

/// A value computed on first access, at most once.
///
/// Concurrent first accesses block until the single winner has produced the
/// value; every caller then observes the same result.
///
/// # Examples
///
/// ```
/// use injection_core::Lazy;
///
/// let lazy = Lazy::new(|| 40 + 2);
/// assert!(!lazy.is_set());
/// assert_eq!(*lazy.force(), 42);
/// assert!(lazy.is_set());
/// ```
pub struct Lazy<T> {
	inner: once_cell::sync::Lazy<T, Producer<T>>,
}

impl<T> Lazy<T> {
	pub fn new<F>(producer: F) -> Self
	where
		F: FnOnce() -> T + Send + 'static,
	{
		let producer: Producer<T> = Box::new(producer);
		Self {
			inner: once_cell::sync::Lazy::new(producer),
		}
	}

	/// Returns the value, computing it if this is the first access.
	///
	/// # Panics
	///
	/// Panics if a previous producer panicked.
	pub fn force(&self) -> &T {
		once_cell::sync::Lazy::force(&self.inner)
	}

	pub fn get(&self) -> Option<&T> {
		once_cell::sync::Lazy::get(&self.inner)
	}

	pub fn is_set(&self) -> bool {
		self.get().is_some()
	}
}

impl<T: fmt::Debug> fmt::Debug for Lazy<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.get() {
			Some(value) => f.debug_tuple("Lazy").field(value).finish(),
			None => f.write_str("Lazy(<unset>)"),
		}
	}
}
