//! Call-site dependency binding
//!
//! A [`Binder`] is created for one callable from its [`Signature`]. On every
//! call it merges the explicit [`Arguments`] with instances resolved from the
//! module for the parameters that declare a [`Key`], explicit values winning.
//!
//! The name-to-binding map is built lazily on first use and rebuilt lazily
//! after the module reports a change, so a binding registered after the
//! binder was created is picked up by the next call.

use crate::binding::{Binding, Instance, downcast_instance, into_instance};
use crate::error::{DiError, DiResult};
use crate::event::{Event, EventListener, Reaction, Subscription};
use crate::key::Key;
use crate::lazy::Lazy;
use crate::module::Module;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

/// How an argument may be passed to a parameter.
///
/// Variants are declared in the only order they may appear in a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParameterKind {
	PositionalOnly,
	PositionalOrKeyword,
	/// Collects extra positional arguments
	VarPositional,
	KeywordOnly,
	/// Collects extra keyword arguments
	VarKeyword,
}

impl ParameterKind {
	pub fn is_variadic(self) -> bool {
		matches!(self, ParameterKind::VarPositional | ParameterKind::VarKeyword)
	}

	fn is_positional(self) -> bool {
		matches!(
			self,
			ParameterKind::PositionalOnly | ParameterKind::PositionalOrKeyword
		)
	}
}

/// A declared parameter of an injected callable.
#[derive(Debug, Clone)]
pub struct Parameter {
	name: String,
	kind: ParameterKind,
	key: Option<Key>,
	required: bool,
}

impl Parameter {
	pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
		Self {
			name: name.into(),
			kind,
			key: None,
			required: !kind.is_variadic(),
		}
	}

	pub fn positional_only(name: impl Into<String>) -> Self {
		Self::new(name, ParameterKind::PositionalOnly)
	}

	pub fn positional(name: impl Into<String>) -> Self {
		Self::new(name, ParameterKind::PositionalOrKeyword)
	}

	pub fn var_positional(name: impl Into<String>) -> Self {
		Self::new(name, ParameterKind::VarPositional)
	}

	pub fn keyword_only(name: impl Into<String>) -> Self {
		Self::new(name, ParameterKind::KeywordOnly)
	}

	pub fn var_keyword(name: impl Into<String>) -> Self {
		Self::new(name, ParameterKind::VarKeyword)
	}

	/// Resolves this parameter from the module when it is not passed.
	pub fn inject(mut self, key: impl Into<Key>) -> Self {
		self.key = Some(key.into());
		self
	}

	/// The callable tolerates this parameter being absent.
	pub fn optional(mut self) -> Self {
		self.required = false;
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn kind(&self) -> ParameterKind {
		self.kind
	}

	pub fn key(&self) -> Option<&Key> {
		self.key.as_ref()
	}

	pub fn is_required(&self) -> bool {
		self.required
	}
}

/// The parameter list of an injected callable.
#[derive(Debug, Clone)]
pub struct Signature {
	parameters: Vec<Parameter>,
}

impl Signature {
	/// Validates the parameter list.
	///
	/// Kinds must appear in declaration order of [`ParameterKind`], with at
	/// most one of each variadic kind, unique names, no required positional
	/// parameter after an optional one, and no injected variadic parameter.
	pub fn new(parameters: impl IntoIterator<Item = Parameter>) -> DiResult<Self> {
		let parameters: Vec<Parameter> = parameters.into_iter().collect();
		let mut names = HashSet::new();
		let mut previous: Option<ParameterKind> = None;
		let mut optional_positional = false;

		for parameter in &parameters {
			if !names.insert(parameter.name.as_str()) {
				return Err(DiError::InvalidSignature(format!(
					"duplicate parameter `{}`",
					parameter.name
				)));
			}

			if let Some(previous) = previous {
				let repeated_variadic = parameter.kind.is_variadic() && parameter.kind == previous;
				if parameter.kind < previous || repeated_variadic {
					return Err(DiError::InvalidSignature(format!(
						"parameter `{}` of kind {:?} can't follow a parameter of kind {:?}",
						parameter.name, parameter.kind, previous
					)));
				}
			}

			if parameter.kind.is_variadic() && parameter.key.is_some() {
				return Err(DiError::InvalidSignature(format!(
					"variadic parameter `{}` can't be injected",
					parameter.name
				)));
			}

			if parameter.kind.is_positional() {
				if parameter.required && optional_positional {
					return Err(DiError::InvalidSignature(format!(
						"required parameter `{}` follows an optional parameter",
						parameter.name
					)));
				}
				optional_positional |= !parameter.required;
			}

			previous = Some(parameter.kind);
		}

		Ok(Self { parameters })
	}

	pub fn parameters(&self) -> &[Parameter] {
		&self.parameters
	}

	/// Parameters declaring a key, in declaration order.
	pub fn injected(&self) -> impl Iterator<Item = (&str, &Key)> {
		self.parameters
			.iter()
			.filter_map(|parameter| parameter.key.as_ref().map(|key| (parameter.name(), key)))
	}

	fn find(&self, name: &str) -> Option<&Parameter> {
		self.parameters.iter().find(|parameter| parameter.name == name)
	}

	fn find_kind(&self, kind: ParameterKind) -> Option<&Parameter> {
		self.parameters.iter().find(|parameter| parameter.kind == kind)
	}

	/// Maps `arguments` onto parameter names without requiring every
	/// parameter to be present.
	fn bind_partial(&self, arguments: &Arguments) -> DiResult<BoundArguments> {
		let mut bound = IndexMap::new();
		let mut positional = arguments.args.iter();

		for parameter in &self.parameters {
			match parameter.kind {
				ParameterKind::PositionalOnly | ParameterKind::PositionalOrKeyword => {
					match positional.next() {
						Some(value) => {
							bound.insert(parameter.name.clone(), BoundValue::Single(value.clone()));
						}
						None => break,
					}
				}
				ParameterKind::VarPositional => {
					let rest: Vec<Instance> = positional.by_ref().cloned().collect();
					if !rest.is_empty() {
						bound.insert(parameter.name.clone(), BoundValue::Positional(rest));
					}
					break;
				}
				ParameterKind::KeywordOnly | ParameterKind::VarKeyword => break,
			}
		}

		if positional.next().is_some() {
			return Err(DiError::InvalidArguments(
				"too many positional arguments".to_string(),
			));
		}

		let var_keyword = self.find_kind(ParameterKind::VarKeyword);
		let mut extra = IndexMap::new();

		for (name, value) in &arguments.kwargs {
			match self.find(name) {
				Some(parameter)
					if matches!(
						parameter.kind,
						ParameterKind::PositionalOrKeyword | ParameterKind::KeywordOnly
					) =>
				{
					if bound.contains_key(name) {
						return Err(DiError::InvalidArguments(format!(
							"multiple values for argument `{}`",
							name
						)));
					}
					bound.insert(name.clone(), BoundValue::Single(value.clone()));
				}
				Some(parameter)
					if parameter.kind == ParameterKind::PositionalOnly && var_keyword.is_none() =>
				{
					return Err(DiError::InvalidArguments(format!(
						"`{}` is positional only, but was passed as a keyword",
						name
					)));
				}
				_ if var_keyword.is_some() => {
					extra.insert(name.clone(), value.clone());
				}
				_ => {
					return Err(DiError::InvalidArguments(format!(
						"unexpected keyword argument `{}`",
						name
					)));
				}
			}
		}

		if let Some(parameter) = var_keyword {
			if !extra.is_empty() {
				bound.insert(parameter.name.clone(), BoundValue::Keywords(extra));
			}
		}

		Ok(BoundArguments { values: bound })
	}
}

#[derive(Clone)]
enum BoundValue {
	Single(Instance),
	Positional(Vec<Instance>),
	Keywords(IndexMap<String, Instance>),
}

struct BoundArguments {
	values: IndexMap<String, BoundValue>,
}

impl BoundArguments {
	fn check_required(&self, signature: &Signature) -> DiResult<()> {
		match signature
			.parameters
			.iter()
			.find(|parameter| parameter.required && !self.values.contains_key(&parameter.name))
		{
			Some(parameter) => Err(DiError::MissingArgument(parameter.name.clone())),
			None => Ok(()),
		}
	}

	/// Splits the bound values back into positional and keyword arguments.
	///
	/// Positional placement stops at the first missing positional parameter;
	/// the parameters after it are passed by keyword.
	fn into_arguments(mut self, signature: &Signature) -> Arguments {
		let mut arguments = Arguments::new();
		let mut keywords_started = false;

		for parameter in &signature.parameters {
			if !keywords_started {
				if matches!(
					parameter.kind,
					ParameterKind::KeywordOnly | ParameterKind::VarKeyword
				) {
					keywords_started = true;
				} else if !self.values.contains_key(&parameter.name) {
					keywords_started = true;
					continue;
				}
			}

			let Some(value) = self.values.shift_remove(&parameter.name) else {
				continue;
			};

			match (value, keywords_started) {
				(BoundValue::Single(value), false) => arguments.args.push(value),
				(BoundValue::Positional(values), _) => arguments.args.extend(values),
				(BoundValue::Keywords(values), _) => arguments.kwargs.extend(values),
				(BoundValue::Single(value), true) => {
					arguments.kwargs.insert(parameter.name.clone(), value);
				}
			}
		}

		arguments
	}
}

/// Positional and keyword arguments of a call.
///
/// # Examples
///
/// ```
/// use injection_core::Arguments;
/// use std::sync::Arc;
///
/// let arguments = Arguments::new()
/// 	.with_arg(Arc::new(1_u8))
/// 	.with_kwarg("name", Arc::new(String::from("circle")));
///
/// assert_eq!(arguments.arg::<u8>(0).as_deref(), Some(&1));
/// assert_eq!(arguments.kwarg::<String>("name").as_deref().map(String::as_str), Some("circle"));
/// ```
#[derive(Clone, Default)]
pub struct Arguments {
	args: Vec<Instance>,
	kwargs: IndexMap<String, Instance>,
}

impl Arguments {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_arg<T>(mut self, value: Arc<T>) -> Self
	where
		T: ?Sized + Send + Sync + 'static,
	{
		self.args.push(into_instance(value));
		self
	}

	pub fn with_kwarg<T>(mut self, name: impl Into<String>, value: Arc<T>) -> Self
	where
		T: ?Sized + Send + Sync + 'static,
	{
		self.kwargs.insert(name.into(), into_instance(value));
		self
	}

	pub fn push_arg(&mut self, value: Instance) {
		self.args.push(value);
	}

	pub fn insert_kwarg(&mut self, name: impl Into<String>, value: Instance) {
		self.kwargs.insert(name.into(), value);
	}

	pub fn args(&self) -> &[Instance] {
		&self.args
	}

	pub fn kwargs(&self) -> &IndexMap<String, Instance> {
		&self.kwargs
	}

	pub fn arg<T>(&self, index: usize) -> Option<Arc<T>>
	where
		T: ?Sized + Send + Sync + 'static,
	{
		self.args.get(index).and_then(downcast_instance::<T>)
	}

	pub fn kwarg<T>(&self, name: &str) -> Option<Arc<T>>
	where
		T: ?Sized + Send + Sync + 'static,
	{
		self.kwargs.get(name).and_then(downcast_instance::<T>)
	}

	pub fn into_parts(self) -> (Vec<Instance>, IndexMap<String, Instance>) {
		(self.args, self.kwargs)
	}
}

impl fmt::Debug for Arguments {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Arguments")
			.field("args", &self.args.len())
			.field("kwargs", &self.kwargs.keys().collect::<Vec<_>>())
			.finish()
	}
}

/// Lifecycle of a binder's dependency map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinderState {
	/// Never used
	Unbound,
	/// Built against the current module state
	Bound,
	/// Invalidated by a module change; rebuilt on the next call
	Stale,
}

type Dependencies = IndexMap<String, Binding>;

struct BinderInner {
	this: Weak<BinderInner>,
	signature: Arc<Signature>,
	module: Module,
	dependencies: RwLock<Option<Arc<Lazy<Dependencies>>>>,
	subscription: OnceCell<Subscription>,
}

impl BinderInner {
	fn resolver(&self) -> Lazy<Dependencies> {
		let signature = self.signature.clone();
		let module = self.module.clone();
		Lazy::new(move || resolve_dependencies(&signature, &module))
	}

	fn refresh(&self) {
		*self.dependencies.write() = Some(Arc::new(self.resolver()));
	}
}

impl EventListener for BinderInner {
	fn on_event(&self, _event: &Event) -> DiResult<Reaction> {
		let this = self.this.clone();
		Ok(Reaction::after(move || {
			if let Some(inner) = this.upgrade() {
				inner.refresh();
			}
			Ok(())
		}))
	}
}

fn resolve_dependencies(signature: &Signature, module: &Module) -> Dependencies {
	let mut dependencies = IndexMap::new();
	for (name, key) in signature.injected() {
		match module.lookup(key) {
			Ok(binding) => {
				dependencies.insert(name.to_string(), binding);
			}
			Err(error) => {
				tracing::trace!(
					module = %module,
					parameter = name,
					%error,
					"dependency not injectable here"
				);
			}
		}
	}
	dependencies
}

/// Injects module dependencies into the arguments of one callable.
///
/// Created by [`Module::inject`].
///
/// # Examples
///
/// ```
/// use injection_core::{Arguments, Module, Parameter, Signature};
/// use std::sync::Arc;
///
/// struct Greeting(&'static str);
///
/// let module = Module::new();
/// let binder = module.inject(
/// 	Signature::new([Parameter::positional("greeting").inject(injection_core::Key::of::<Greeting>())])
/// 		.unwrap(),
/// );
/// module.set_constant(Arc::new(Greeting("hello"))).unwrap();
///
/// let text = binder
/// 	.call(Arguments::new(), |arguments| arguments.arg::<Greeting>(0).map(|greeting| greeting.0))
/// 	.unwrap();
/// assert_eq!(text, Some("hello"));
/// ```
#[derive(Clone)]
pub struct Binder {
	inner: Arc<BinderInner>,
}

impl Binder {
	pub fn new(module: &Module, signature: Signature) -> Self {
		Self {
			inner: Arc::new_cyclic(|this| BinderInner {
				this: this.clone(),
				signature: Arc::new(signature),
				module: module.clone(),
				dependencies: RwLock::new(None),
				subscription: OnceCell::new(),
			}),
		}
	}

	pub fn signature(&self) -> &Signature {
		&self.inner.signature
	}

	pub fn module(&self) -> &Module {
		&self.inner.module
	}

	pub fn state(&self) -> BinderState {
		match self.inner.dependencies.read().as_ref() {
			None => BinderState::Unbound,
			Some(dependencies) if dependencies.is_set() => BinderState::Bound,
			Some(_) => BinderState::Stale,
		}
	}

	/// Merges `explicit` with resolved dependencies.
	///
	/// Explicit arguments are returned unchanged when nothing is injectable.
	/// Dependencies passed explicitly are not instantiated.
	pub fn bind(&self, explicit: Arguments) -> DiResult<Arguments> {
		let dependencies = self.dependencies();
		let dependencies = dependencies.force();
		if dependencies.is_empty() {
			return Ok(explicit);
		}

		let signature = &self.inner.signature;
		let mut bound = signature.bind_partial(&explicit)?;
		for (name, binding) in dependencies {
			if !bound.values.contains_key(name) {
				bound
					.values
					.insert(name.clone(), BoundValue::Single(binding.get_instance()?));
			}
		}

		Ok(bound.into_arguments(signature))
	}

	/// Binds `explicit` and calls `f` with the result.
	///
	/// Fails with [`DiError::MissingArgument`] if a required parameter is
	/// neither passed nor injectable.
	pub fn call<R>(&self, explicit: Arguments, f: impl FnOnce(Arguments) -> R) -> DiResult<R> {
		let arguments = self.bind(explicit)?;
		self.inner
			.signature
			.bind_partial(&arguments)?
			.check_required(&self.inner.signature)?;
		Ok(f(arguments))
	}

	fn dependencies(&self) -> Arc<Lazy<Dependencies>> {
		self.inner
			.subscription
			.get_or_init(|| self.inner.module.subscribe(&self.inner));

		if let Some(dependencies) = self.inner.dependencies.read().as_ref() {
			return dependencies.clone();
		}

		self.inner
			.dependencies
			.write()
			.get_or_insert_with(|| Arc::new(self.inner.resolver()))
			.clone()
	}
}

impl fmt::Debug for Binder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Binder")
			.field("module", &self.inner.module)
			.field("signature", &self.inner.signature)
			.field("state", &self.state())
			.finish()
	}
}
