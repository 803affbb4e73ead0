//! Thread-local circular resolution detection
//!
//! Factories run synchronously on the resolving thread, so the stack of
//! bindings currently producing an instance is tracked per thread. Entering a
//! binding that is already on the stack is reported as a cycle instead of
//! dead-locking on its own singleton cell.
//!
//! - **O(1) Circular Detection**: `HashSet` lookup keyed by binding identity
//! - **Depth Limiting**: `MAX_RESOLUTION_DEPTH` prevents pathological cases
//! - **RAII**: the stack is popped by [`ResolutionGuard`] on drop

use crate::error::{DiError, DiResult};
use std::cell::RefCell;
use std::collections::HashSet;

/// Maximum resolution depth
pub const MAX_RESOLUTION_DEPTH: usize = 100;

#[derive(Default)]
struct CycleDetectionState {
	/// Bindings currently being resolved
	resolution_set: HashSet<usize>,
	/// Resolution path, for error messages
	resolution_path: Vec<(usize, String)>,
}

thread_local! {
	static CYCLE_STATE: RefCell<CycleDetectionState> = RefCell::new(CycleDetectionState::default());
}

/// Records the start of a resolution.
///
/// `identity` must be unique to the binding for its lifetime; `name` is only
/// used for diagnostics.
pub fn begin_resolution(identity: usize, name: &str) -> DiResult<ResolutionGuard> {
	CYCLE_STATE.with(|state| {
		let mut state = state.borrow_mut();

		let depth = state.resolution_path.len() + 1;
		if depth > MAX_RESOLUTION_DEPTH {
			return Err(DiError::MaxDepthExceeded(depth));
		}

		if state.resolution_set.contains(&identity) {
			return Err(DiError::CircularDependency {
				name: name.to_string(),
				path: build_cycle_path(&state, identity, name),
			});
		}

		state.resolution_set.insert(identity);
		state.resolution_path.push((identity, name.to_string()));
		Ok(ResolutionGuard { identity })
	})
}

/// Current depth of the calling thread's resolution stack.
pub fn resolution_depth() -> usize {
	CYCLE_STATE.with(|state| state.borrow().resolution_path.len())
}

/// Pops its binding from the resolution stack when dropped.
#[derive(Debug)]
pub struct ResolutionGuard {
	identity: usize,
}

impl Drop for ResolutionGuard {
	fn drop(&mut self) {
		let identity = self.identity;
		let _ = CYCLE_STATE.try_with(|state| {
			let mut state = state.borrow_mut();
			state.resolution_set.remove(&identity);
			if let Some(position) = state
				.resolution_path
				.iter()
				.rposition(|(id, _)| *id == identity)
			{
				state.resolution_path.remove(position);
			}
		});
	}
}

fn build_cycle_path(state: &CycleDetectionState, identity: usize, name: &str) -> String {
	match state
		.resolution_path
		.iter()
		.position(|(id, _)| *id == identity)
	{
		Some(start) => {
			let cycle: Vec<&str> = state.resolution_path[start..]
				.iter()
				.map(|(_, name)| name.as_str())
				.collect();
			format!("{} -> {}", cycle.join(" -> "), name)
		}
		None => format!("Unknown cycle involving {}", name),
	}
}
