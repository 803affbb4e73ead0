//! Error types for dependency resolution

use crate::key::{ConcreteKey, Key};
use crate::locator::Mode;

/// Errors raised by the registry, scopes and binders.
///
/// Every variant is returned synchronously at the offending call; nothing is
/// retried by the container itself.
#[derive(Debug, thiserror::Error)]
pub enum DiError {
	/// No record matches the requested key
	#[error("No binding found for `{0}`.")]
	NoBinding(Key),

	/// A record already exists for the key under the same, non-override mode
	#[error(
		"A binding already exists for `{key}` (existing mode: `{existing}`, new mode: `{new}`)."
	)]
	DuplicateBinding {
		key: ConcreteKey,
		existing: Mode,
		new: Mode,
	},

	#[error("Module `{0}` can't be used by itself.")]
	ScopeSelfUse(String),

	#[error("`{module}` already uses `{used}`.")]
	ScopeAlreadyUsed { module: String, used: String },

	#[error("`{used}` can't be found in the modules used by `{module}`.")]
	ScopeNotUsed { module: String, used: String },

	/// Using the module would make the scope graph circular
	#[error("`{module}` can't use `{used}`: it would form a cycle ({path}).")]
	ScopeCycle {
		module: String,
		used: String,
		path: String,
	},

	/// Mutation attempted while a singleton below the module is materialized
	#[error("`{0}` is locked.")]
	ScopeLocked(String),

	/// A placeholder was resolved before a real binding superseded it
	#[error("`{0}` should be an injectable.")]
	PlaceholderUnresolved(Key),

	/// A binding was re-entered while it was producing its instance
	#[error(
		"Circular dependency detected: {name}\n  Path: {path}\nThis forms a cycle that cannot be resolved."
	)]
	CircularDependency { name: String, path: String },

	#[error(
		"Maximum resolution depth exceeded: {0}\nThis likely indicates an extremely deep or circular dependency chain."
	)]
	MaxDepthExceeded(usize),

	/// The resolved instance is not of the requested type
	#[error("The instance bound to `{key}` is not a `{expected}`.")]
	TypeMismatch { key: Key, expected: &'static str },

	/// A factory outlived the module it was registered into
	#[error("Module `{0}` has been dropped.")]
	ModuleDropped(String),

	#[error("Missing required argument `{0}`.")]
	MissingArgument(String),

	#[error("Invalid arguments: {0}")]
	InvalidArguments(String),

	#[error("Invalid signature: {0}")]
	InvalidSignature(String),

	/// A user factory failed
	#[error("Factory failed: {0}")]
	Factory(#[source] anyhow::Error),

	#[error("Invalid settings: {0}")]
	Settings(String),
}

impl DiError {
	/// Wraps an arbitrary factory failure.
	///
	/// # Examples
	///
	/// ```
	/// use injection_core::DiError;
	///
	/// let error = DiError::factory(std::io::Error::other("connection refused"));
	/// assert_eq!(error.to_string(), "Factory failed: connection refused");
	/// ```
	pub fn factory<E>(error: E) -> Self
	where
		E: Into<anyhow::Error>,
	{
		DiError::Factory(error.into())
	}

	/// Returns `true` for a plain lookup miss.
	pub fn is_no_binding(&self) -> bool {
		matches!(self, DiError::NoBinding(_))
	}
}

pub type DiResult<T> = Result<T, DiError>;
