//! Synchronous change notifications
//!
//! Registries and modules own an [`EventChannel`]. A mutation is dispatched in
//! two phases: every listener is asked to react to the event *before* the
//! mutation is applied (it may veto by returning an error), and the
//! [`Reaction`]s it hands back are completed, in reverse order, once the
//! mutation has been applied. Listener reactions run on the mutating thread
//! before the mutating call returns.
//!
//! Listeners are held weakly; a listener that has been dropped is skipped and
//! pruned.

use crate::error::DiResult;
use crate::key::ConcreteKey;
use crate::locator::Mode;
use crate::module::{Module, Priority};
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

/// A change notification.
#[derive(Debug, Clone)]
pub enum Event {
	DependenciesUpdated(DependenciesUpdated),
	ModuleAdded(ModuleAdded),
	ModuleRemoved(ModuleRemoved),
	ModulePriorityUpdated(ModulePriorityUpdated),
	Proxy(ModuleEventProxy),
}

impl Event {
	/// The module that emitted this event, if a module did.
	pub fn module(&self) -> Option<&Module> {
		match self {
			Event::DependenciesUpdated(_) => None,
			Event::ModuleAdded(event) => Some(&event.module),
			Event::ModuleRemoved(event) => Some(&event.module),
			Event::ModulePriorityUpdated(event) => Some(&event.module),
			Event::Proxy(event) => Some(&event.module),
		}
	}

	/// The event that caused this one: `self` unless this is a proxy.
	pub fn origin(&self) -> &Event {
		match self {
			Event::Proxy(proxy) => proxy.origin(),
			event => event,
		}
	}
}

impl fmt::Display for Event {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Event::DependenciesUpdated(event) => event.fmt(f),
			Event::ModuleAdded(event) => event.fmt(f),
			Event::ModuleRemoved(event) => event.fmt(f),
			Event::ModulePriorityUpdated(event) => event.fmt(f),
			Event::Proxy(event) => event.fmt(f),
		}
	}
}

/// Records were written into a registry.
#[derive(Debug, Clone)]
pub struct DependenciesUpdated {
	pub keys: Vec<ConcreteKey>,
	pub mode: Mode,
}

impl fmt::Display for DependenciesUpdated {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let length = self.keys.len();
		let noun = if length > 1 { "dependencies" } else { "dependency" };
		write!(f, "{} {} have been updated", length, noun)?;
		for (index, key) in self.keys.iter().enumerate() {
			let separator = if index == 0 { ": " } else { ", " };
			write!(f, "{}`{}`", separator, key)?;
		}
		f.write_str(".")
	}
}

#[derive(Debug, Clone)]
pub struct ModuleAdded {
	pub module: Module,
	pub added: Module,
	pub priority: Priority,
}

impl fmt::Display for ModuleAdded {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "`{}` now uses `{}`.", self.module, self.added)
	}
}

#[derive(Debug, Clone)]
pub struct ModuleRemoved {
	pub module: Module,
	pub removed: Module,
}

impl fmt::Display for ModuleRemoved {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "`{}` no longer uses `{}`.", self.module, self.removed)
	}
}

#[derive(Debug, Clone)]
pub struct ModulePriorityUpdated {
	pub module: Module,
	pub updated: Module,
	pub priority: Priority,
}

impl fmt::Display for ModulePriorityUpdated {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"In `{}`, the priority `{}` has been applied to `{}`.",
			self.module, self.priority, self.updated
		)
	}
}

/// An event re-emitted by a module on behalf of its registry or of a module
/// it uses.
#[derive(Debug, Clone)]
pub struct ModuleEventProxy {
	pub module: Module,
	pub event: Box<Event>,
}

impl ModuleEventProxy {
	/// The chain of wrapped events, from the origin outwards.
	pub fn history(&self) -> Vec<&Event> {
		let mut history = match self.event.as_ref() {
			Event::Proxy(inner) => inner.history(),
			_ => Vec::new(),
		};
		history.push(self.event.as_ref());
		history
	}

	/// The first, non-proxy event of the chain.
	pub fn origin(&self) -> &Event {
		match self.event.as_ref() {
			Event::Proxy(inner) => inner.origin(),
			event => event,
		}
	}
}

impl fmt::Display for ModuleEventProxy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"`{}` has propagated an event: {}",
			self.module,
			self.origin()
		)
	}
}

type Completion = Box<dyn FnOnce() -> DiResult<()> + Send>;

/// What a listener does once the mutation it was notified about is applied.
///
/// Dropping a reaction without completing it discards it; this is what
/// happens when the mutation, or another listener, fails.
pub struct Reaction {
	completion: Option<Completion>,
}

impl Reaction {
	/// No follow-up.
	pub fn none() -> Self {
		Self { completion: None }
	}

	/// Runs `completion` after the mutation has been applied.
	pub fn after<F>(completion: F) -> Self
	where
		F: FnOnce() -> DiResult<()> + Send + 'static,
	{
		Self {
			completion: Some(Box::new(completion)),
		}
	}

	fn complete(self) -> DiResult<()> {
		match self.completion {
			Some(completion) => completion(),
			None => Ok(()),
		}
	}
}

impl fmt::Debug for Reaction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Reaction")
			.field("pending", &self.completion.is_some())
			.finish()
	}
}

/// Receives events from the channels it is added to.
pub trait EventListener: Send + Sync {
	/// Called before the mutation described by `event` is applied.
	///
	/// Returning an error aborts the mutation and is propagated to the caller.
	fn on_event(&self, event: &Event) -> DiResult<Reaction>;
}

/// Reactions gathered for one event, waiting for the mutation to be applied.
#[must_use = "dropping a dispatch discards every pending reaction"]
#[derive(Debug)]
pub struct Dispatch {
	reactions: Vec<Reaction>,
}

impl Dispatch {
	/// Completes every pending reaction, last begun first.
	///
	/// All reactions are completed even if one fails; the first failure is
	/// returned.
	pub fn end(self) -> DiResult<()> {
		let mut outcome = Ok(());
		for reaction in self.reactions.into_iter().rev() {
			let result = reaction.complete();
			if outcome.is_ok() {
				outcome = result;
			}
		}
		outcome
	}
}

struct ListenerSlot {
	listener: Weak<dyn EventListener>,
}

impl ListenerSlot {
	fn points_to(&self, address: *const ()) -> bool {
		std::ptr::addr_eq(self.listener.as_ptr(), address)
	}
}

type Slots = Arc<RwLock<Vec<ListenerSlot>>>;

/// A set of weakly held listeners.
#[derive(Default)]
pub struct EventChannel {
	listeners: Slots,
}

impl EventChannel {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a listener. Adding the same listener twice keeps a single entry.
	pub fn add_listener<L>(&self, listener: &Arc<L>)
	where
		L: EventListener + 'static,
	{
		let weak: Weak<L> = Arc::downgrade(listener);
		let weak: Weak<dyn EventListener> = weak;
		let address = Arc::as_ptr(listener) as *const ();
		let mut listeners = self.listeners.write();
		listeners.retain(|slot| !slot.points_to(address) && slot.listener.strong_count() > 0);
		listeners.push(ListenerSlot { listener: weak });
	}

	/// Removes a listener; returns whether it was present.
	pub fn remove_listener<L>(&self, listener: &Arc<L>) -> bool
	where
		L: EventListener + 'static,
	{
		remove_address(&self.listeners, Arc::as_ptr(listener) as *const ())
	}

	/// Adds a listener for as long as the returned guard lives.
	pub fn subscribe<L>(&self, listener: &Arc<L>) -> Subscription
	where
		L: EventListener + 'static,
	{
		self.add_listener(listener);
		Subscription {
			listeners: Arc::downgrade(&self.listeners),
			address: Arc::as_ptr(listener) as *const () as usize,
		}
	}

	pub fn has_listeners(&self) -> bool {
		self.clear_dead_listeners();
		!self.listeners.read().is_empty()
	}

	pub fn listener_count(&self) -> usize {
		self.clear_dead_listeners();
		self.listeners.read().len()
	}

	/// Prunes listeners that have been dropped.
	pub fn clear_dead_listeners(&self) {
		self.listeners
			.write()
			.retain(|slot| slot.listener.strong_count() > 0);
	}

	/// Notifies every live listener of `event` and collects their reactions.
	///
	/// If a listener fails, the reactions already collected are discarded and
	/// the error is returned.
	pub fn begin(&self, event: &Event) -> DiResult<Dispatch> {
		let snapshot: Vec<Arc<dyn EventListener>> = self
			.listeners
			.read()
			.iter()
			.filter_map(|slot| slot.listener.upgrade())
			.collect();

		let mut reactions = Vec::with_capacity(snapshot.len());
		for listener in snapshot {
			reactions.push(listener.on_event(event)?);
		}

		Ok(Dispatch { reactions })
	}

	/// Notifies listeners, applies `mutation`, then completes the reactions.
	///
	/// If `mutation` fails the reactions are discarded and its error is
	/// returned.
	pub fn dispatch<R>(&self, event: &Event, mutation: impl FnOnce() -> DiResult<R>) -> DiResult<R> {
		let dispatch = self.begin(event)?;
		let value = mutation()?;
		dispatch.end()?;
		Ok(value)
	}
}

impl fmt::Debug for EventChannel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventChannel")
			.field("listeners", &self.listeners.read().len())
			.finish()
	}
}

fn remove_address(listeners: &Slots, address: *const ()) -> bool {
	let mut listeners = listeners.write();
	let original_len = listeners.len();
	listeners.retain(|slot| !slot.points_to(address));
	listeners.len() < original_len
}

/// Keeps a listener subscribed; unsubscribes it when dropped.
#[must_use = "the listener is unsubscribed as soon as the subscription is dropped"]
pub struct Subscription {
	listeners: Weak<RwLock<Vec<ListenerSlot>>>,
	address: usize,
}

impl Subscription {
	/// Unsubscribes now.
	pub fn cancel(self) {}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(listeners) = self.listeners.upgrade() {
			remove_address(&listeners, self.address as *const ());
		}
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("active", &(self.listeners.strong_count() > 0))
			.finish()
	}
}
