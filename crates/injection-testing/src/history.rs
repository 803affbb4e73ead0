//! Event recording

use injection_core::{DiResult, Event, EventListener, Module, Reaction};
use parking_lot::Mutex;
use std::sync::Arc;

/// Records every event a module has applied, in order.
///
/// Events are recorded once the mutation they describe has been applied; an
/// event whose mutation was vetoed or failed is not recorded.
#[derive(Default)]
pub struct EventHistory {
	events: Arc<Mutex<Vec<Event>>>,
}

impl EventHistory {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Creates a history listening to `module`.
	///
	/// The module only holds the history weakly; keep the returned `Arc`.
	pub fn attach(module: &Module) -> Arc<Self> {
		let history = Self::new();
		module.add_listener(&history);
		history
	}

	pub fn events(&self) -> Vec<Event> {
		self.events.lock().clone()
	}

	/// The `Display` form of every recorded event.
	pub fn messages(&self) -> Vec<String> {
		self.events.lock().iter().map(ToString::to_string).collect()
	}

	/// The origin of every recorded event, unwrapping proxies.
	pub fn origins(&self) -> Vec<Event> {
		self.events
			.lock()
			.iter()
			.map(|event| event.origin().clone())
			.collect()
	}

	pub fn len(&self) -> usize {
		self.events.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.events.lock().is_empty()
	}

	pub fn clear(&self) {
		self.events.lock().clear();
	}
}

impl EventListener for EventHistory {
	fn on_event(&self, event: &Event) -> DiResult<Reaction> {
		let events = self.events.clone();
		let event = event.clone();
		Ok(Reaction::after(move || {
			events.lock().push(event);
			Ok(())
		}))
	}
}
