//! Request keys and their normalization
//!
//! A [`Key`] describes what a caller asks for. Compound keys (unions,
//! optionals, annotated keys and generic shapes) are flattened by
//! [`Key::normalize`] into the [`ConcreteKey`]s the registry stores records
//! under.

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a Rust type, with its name kept for diagnostics.
///
/// Equality and hashing only consider the [`TypeId`].
#[derive(Clone, Copy)]
pub struct TypeKey {
	id: TypeId,
	name: &'static str,
}

impl TypeKey {
	/// Returns the key of `T`.
	///
	/// # Examples
	///
	/// ```
	/// use injection_core::TypeKey;
	///
	/// trait Shape {}
	///
	/// assert_eq!(TypeKey::of::<String>(), TypeKey::of::<String>());
	/// assert_ne!(TypeKey::of::<String>(), TypeKey::of::<dyn Shape>());
	/// ```
	pub fn of<T: ?Sized + 'static>() -> Self {
		Self {
			id: TypeId::of::<T>(),
			name: std::any::type_name::<T>(),
		}
	}

	pub fn id(&self) -> TypeId {
		self.id
	}

	pub fn name(&self) -> &'static str {
		self.name
	}
}

impl PartialEq for TypeKey {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl fmt::Debug for TypeKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("TypeKey").field(&self.name).finish()
	}
}

impl fmt::Display for TypeKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

/// A key a record can be stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConcreteKey {
	/// A Rust type
	Type(TypeKey),
	/// A named alias, distinct from every type key
	Alias(Cow<'static, str>),
}

impl fmt::Display for ConcreteKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConcreteKey::Type(key) => key.fmt(f),
			ConcreteKey::Alias(name) => f.write_str(name),
		}
	}
}

impl From<TypeKey> for ConcreteKey {
	fn from(key: TypeKey) -> Self {
		ConcreteKey::Type(key)
	}
}

/// A requested capability.
///
/// Keys are built explicitly instead of being discovered from type
/// signatures:
///
/// ```
/// use injection_core::Key;
///
/// struct Circle;
/// struct Square;
///
/// let key = Key::optional(Key::any_of([Key::of::<Circle>(), Key::of::<Square>()]));
/// assert_eq!(key.normalize(false).len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
	Type(TypeKey),
	Alias(Cow<'static, str>),
	/// A generic shape such as `Repository<User>`, together with the key of
	/// its generic origin (`Repository`).
	Generic {
		shape: TypeKey,
		origin: ConcreteKey,
	},
	/// Any of several equivalent keys, tried in order
	Union(Vec<Key>),
	/// A key that may legitimately be absent
	Optional(Box<Key>),
	/// A key carrying metadata that plays no part in lookup
	Annotated(Box<Key>, Cow<'static, str>),
}

impl Key {
	pub fn of<T: ?Sized + 'static>() -> Self {
		Key::Type(TypeKey::of::<T>())
	}

	pub fn alias(name: impl Into<Cow<'static, str>>) -> Self {
		Key::Alias(name.into())
	}

	/// Generic shape `T` whose origin is `origin`.
	pub fn generic<T: ?Sized + 'static>(origin: impl Into<ConcreteKey>) -> Self {
		Key::Generic {
			shape: TypeKey::of::<T>(),
			origin: origin.into(),
		}
	}

	pub fn any_of(keys: impl IntoIterator<Item = Key>) -> Self {
		Key::Union(keys.into_iter().collect())
	}

	pub fn optional(key: impl Into<Key>) -> Self {
		Key::Optional(Box::new(key.into()))
	}

	pub fn annotated(key: impl Into<Key>, metadata: impl Into<Cow<'static, str>>) -> Self {
		Key::Annotated(Box::new(key.into()), metadata.into())
	}

	/// Flattens this key into the ordered, de-duplicated set of concrete keys
	/// it stands for.
	///
	/// With `with_origin`, a generic shape is followed by its origin so a
	/// record registered for the origin also satisfies the shape.
	///
	/// # Examples
	///
	/// ```
	/// use injection_core::{ConcreteKey, Key, TypeKey};
	///
	/// struct Repository<T>(T);
	/// struct User;
	///
	/// let key = Key::generic::<Repository<User>>(ConcreteKey::from(TypeKey::of::<Repository<()>>()));
	///
	/// assert_eq!(key.normalize(false), vec![ConcreteKey::from(TypeKey::of::<Repository<User>>())]);
	/// assert_eq!(key.normalize(true).len(), 2);
	/// ```
	pub fn normalize(&self, with_origin: bool) -> Vec<ConcreteKey> {
		let mut keys = Vec::new();
		self.collect_into(with_origin, &mut keys);
		keys
	}

	/// Normalizes several keys at once, keeping first-seen order.
	pub fn normalize_all<'a>(
		keys: impl IntoIterator<Item = &'a Key>,
		with_origin: bool,
	) -> Vec<ConcreteKey> {
		let mut concrete = Vec::new();
		for key in keys {
			key.collect_into(with_origin, &mut concrete);
		}
		concrete
	}

	fn collect_into(&self, with_origin: bool, out: &mut Vec<ConcreteKey>) {
		match self {
			Key::Type(key) => push_unique(out, ConcreteKey::Type(*key)),
			Key::Alias(name) => push_unique(out, ConcreteKey::Alias(name.clone())),
			Key::Generic { shape, origin } => {
				push_unique(out, ConcreteKey::Type(*shape));
				if with_origin {
					push_unique(out, origin.clone());
				}
			}
			Key::Union(keys) => {
				for key in keys {
					key.collect_into(with_origin, out);
				}
			}
			Key::Optional(key) | Key::Annotated(key, _) => key.collect_into(with_origin, out),
		}
	}
}

fn push_unique(out: &mut Vec<ConcreteKey>, key: ConcreteKey) {
	if !out.contains(&key) {
		out.push(key);
	}
}

impl From<TypeKey> for Key {
	fn from(key: TypeKey) -> Self {
		Key::Type(key)
	}
}

impl From<ConcreteKey> for Key {
	fn from(key: ConcreteKey) -> Self {
		match key {
			ConcreteKey::Type(key) => Key::Type(key),
			ConcreteKey::Alias(name) => Key::Alias(name),
		}
	}
}

impl From<&'static str> for Key {
	fn from(name: &'static str) -> Self {
		Key::alias(name)
	}
}

impl fmt::Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Key::Type(key) => key.fmt(f),
			Key::Alias(name) => f.write_str(name),
			Key::Generic { shape, .. } => shape.fmt(f),
			Key::Union(keys) => {
				for (index, key) in keys.iter().enumerate() {
					if index > 0 {
						f.write_str(" | ")?;
					}
					key.fmt(f)?;
				}
				Ok(())
			}
			Key::Optional(key) => write!(f, "Option<{}>", key),
			Key::Annotated(key, metadata) => write!(f, "{} [{}]", key, metadata),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	struct A;
	struct B;
	struct Wrapper<T>(T);

	fn origin() -> ConcreteKey {
		ConcreteKey::Alias(Cow::Borrowed("Wrapper"))
	}

	#[rstest]
	fn test_union_flattens_in_order() {
		// Arrange
		let key = Key::any_of([Key::of::<B>(), Key::any_of([Key::of::<A>(), Key::of::<B>()])]);

		// Act
		let keys = key.normalize(false);

		// Assert
		assert_eq!(
			keys,
			vec![
				ConcreteKey::Type(TypeKey::of::<B>()),
				ConcreteKey::Type(TypeKey::of::<A>())
			]
		);
	}

	#[rstest]
	fn test_optional_and_annotated_unwrap_to_inner_key() {
		let key = Key::optional(Key::annotated(Key::of::<A>(), "primary"));

		assert_eq!(key.normalize(true), vec![ConcreteKey::Type(TypeKey::of::<A>())]);
	}

	#[rstest]
	#[case(false, 1)]
	#[case(true, 2)]
	fn test_generic_origin_only_when_requested(#[case] with_origin: bool, #[case] expected: usize) {
		let key = Key::generic::<Wrapper<A>>(origin());

		let keys = key.normalize(with_origin);

		assert_eq!(keys.len(), expected);
		assert_eq!(keys[0], ConcreteKey::Type(TypeKey::of::<Wrapper<A>>()));
	}

	#[rstest]
	fn test_alias_is_distinct_from_type() {
		let alias = Key::alias("A");

		assert_ne!(alias.normalize(false), Key::of::<A>().normalize(false));
	}

	#[rstest]
	fn test_display_union() {
		let key = Key::any_of([Key::alias("left"), Key::alias("right")]);

		assert_eq!(key.to_string(), "left | right");
	}
}
