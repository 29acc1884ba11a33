//! Single-flight coordination of authorization attempts keyed by canonical authorize URL.

// std
use std::sync::{
	OnceLock,
	atomic::{AtomicU64, Ordering},
};
// crates.io
use tokio::{sync::watch, time};
// self
use crate::{_prelude::*, flows::authorization::AuthorizationFlow, url_key::UrlKey};

/// Resolution status broadcast to every waiter of a flow.
#[derive(Clone, Debug)]
pub enum FlowStatus {
	/// Still waiting for the callback.
	Pending,
	/// Token exchanged and stored.
	Done,
	/// Attempt failed; every waiter receives the same error.
	Failed(Error),
}
impl FlowStatus {
	/// Returns `true` when the status is terminal.
	pub fn is_resolved(&self) -> bool {
		!matches!(self, Self::Pending)
	}
}

/// Result of [`FlowState::wait_for_flow`].
#[derive(Clone, Debug)]
pub enum WaitOutcome {
	/// The flow stored a token.
	Done,
	/// The flow failed.
	Failed(Error),
	/// The deadline passed while the flow was still pending.
	TimedOut,
}

/// Coordination record of one authorization attempt.
pub struct FlowState {
	attempt: u64,
	status: watch::Sender<FlowStatus>,
	flow: OnceLock<Arc<AuthorizationFlow>>,
}
impl FlowState {
	fn new(attempt: u64) -> Self {
		Self { attempt, status: watch::Sender::new(FlowStatus::Pending), flow: OnceLock::new() }
	}

	/// Monotonic attempt number assigned by the registry.
	pub fn attempt(&self) -> u64 {
		self.attempt
	}

	/// Current status snapshot.
	pub fn status(&self) -> FlowStatus {
		self.status.borrow().clone()
	}

	/// Returns `true` once the attempt has completed or failed.
	pub fn is_resolved(&self) -> bool {
		self.status.borrow().is_resolved()
	}

	/// Returns `true` when the attempt failed.
	pub fn in_error(&self) -> bool {
		matches!(*self.status.borrow(), FlowStatus::Failed(_))
	}

	/// Stored failure, if any.
	pub fn error(&self) -> Option<Error> {
		match &*self.status.borrow() {
			FlowStatus::Failed(e) => Some(e.clone()),
			_ => None,
		}
	}

	/// Attached authorization flow, once the initiator has built it.
	pub fn flow(&self) -> Option<Arc<AuthorizationFlow>> {
		self.flow.get().cloned()
	}

	/// Attaches the attempt's authorization flow; a second attachment is an inconsistency.
	pub fn set_flow(&self, flow: Arc<AuthorizationFlow>) -> Result<()> {
		self.flow
			.set(flow)
			.map_err(|_| Error::inconsistency("authorization flow attached twice to one attempt"))
	}

	/// Waits until the attempt resolves or `timeout` elapses.
	///
	/// A timeout leaves the attempt untouched.
	pub async fn wait_for_flow(&self, timeout: StdDuration) -> WaitOutcome {
		let mut receiver = self.status.subscribe();
		let waited = time::timeout(timeout, receiver.wait_for(FlowStatus::is_resolved)).await;

		match waited {
			Ok(Ok(status)) => match &*status {
				FlowStatus::Failed(e) => WaitOutcome::Failed(e.clone()),
				_ => WaitOutcome::Done,
			},
			// The sender lives in `self`, so the channel cannot close while borrowed.
			Ok(Err(_)) => WaitOutcome::Failed(Error::inconsistency("flow status channel closed")),
			Err(_) => WaitOutcome::TimedOut,
		}
	}

	/// Publishes `status` unless the attempt already resolved; returns `true` when it did.
	fn resolve(&self, status: FlowStatus) -> bool {
		self.status.send_if_modified(|current| {
			if current.is_resolved() {
				return false;
			}

			*current = status;

			true
		})
	}
}
impl Debug for FlowState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FlowState")
			.field("attempt", &self.attempt)
			.field("status", &*self.status.borrow())
			.field("flow_attached", &self.flow.get().is_some())
			.finish()
	}
}

/// Outcome of [`FlowRegistry::get_or_create`].
#[derive(Clone, Debug)]
pub enum FlowEntry {
	/// The caller created the attempt and must drive it.
	Initiator(Arc<FlowState>),
	/// An attempt was already pending; the caller only waits.
	Waiter(Arc<FlowState>),
}
impl FlowEntry {
	/// Shared state regardless of role.
	pub fn state(&self) -> &Arc<FlowState> {
		match self {
			Self::Initiator(state) | Self::Waiter(state) => state,
		}
	}

	/// Returns `true` for [`FlowEntry::Initiator`].
	pub fn is_initiator(&self) -> bool {
		matches!(self, Self::Initiator(_))
	}
}

/// Map of pending attempts.
///
/// Resolution removes the entry before waking waiters, so a request issued after a wake always
/// starts a fresh attempt.
#[derive(Debug, Default)]
pub struct FlowRegistry {
	flows: Mutex<HashMap<UrlKey, Arc<FlowState>>>,
	attempts: AtomicU64,
}
impl FlowRegistry {
	/// Returns the pending attempt for `key`, creating it (and the initiator role) atomically.
	pub fn get_or_create(&self, key: &UrlKey) -> FlowEntry {
		let mut flows = self.flows.lock();

		if let Some(state) = flows.get(key) {
			return FlowEntry::Waiter(Arc::clone(state));
		}

		let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
		let state = Arc::new(FlowState::new(attempt));

		flows.insert(key.clone(), Arc::clone(&state));

		FlowEntry::Initiator(state)
	}

	/// Pending attempt for `key`, without side effects.
	pub fn get(&self, key: &UrlKey) -> Option<Arc<FlowState>> {
		self.flows.lock().get(key).cloned()
	}

	/// Resolves the pending attempt for `key` as done.
	pub fn mark_done(&self, key: &UrlKey) -> bool {
		self.resolve_pending(key, FlowStatus::Done)
	}

	/// Resolves the pending attempt for `key` with `error`.
	pub fn mark_error(&self, key: &UrlKey, error: Error) -> bool {
		self.resolve_pending(key, FlowStatus::Failed(error))
	}

	/// Resolves `state` specifically, removing it only if it is still the entry for `key`.
	///
	/// Returns `true` when this call resolved the attempt.
	pub fn resolve_attempt(&self, key: &UrlKey, state: &Arc<FlowState>, status: FlowStatus) -> bool {
		{
			let mut flows = self.flows.lock();

			if flows.get(key).is_some_and(|current| Arc::ptr_eq(current, state)) {
				flows.remove(key);
			}
		}

		state.resolve(status)
	}

	/// Number of pending attempts.
	pub fn len(&self) -> usize {
		self.flows.lock().len()
	}

	/// Returns `true` when no attempt is pending.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn resolve_pending(&self, key: &UrlKey, status: FlowStatus) -> bool {
		let removed = self.flows.lock().remove(key);

		removed.is_some_and(|state| state.resolve(status))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::url_key::UrlEqualityMode;

	fn key(client_id: &str) -> UrlKey {
		UrlKey::parse(
			&format!("https://idp.example/authorize?client_id={client_id}&scope=openid"),
			UrlEqualityMode::authorize(),
		)
		.expect("Authorize fixture should parse.")
	}

	#[test]
	fn first_caller_initiates_and_others_wait() {
		let registry = FlowRegistry::default();
		let first = registry.get_or_create(&key("abc"));
		let second = registry.get_or_create(&key("abc"));
		let other = registry.get_or_create(&key("xyz"));

		assert!(first.is_initiator());
		assert!(!second.is_initiator());
		assert!(other.is_initiator());
		assert!(Arc::ptr_eq(first.state(), second.state()));
		assert_eq!(registry.len(), 2);
	}

	#[tokio::test]
	async fn removal_happens_before_waiters_wake() {
		let registry = Arc::new(FlowRegistry::default());
		let state = Arc::clone(registry.get_or_create(&key("abc")).state());
		let waiter = {
			let registry = Arc::clone(&registry);
			let state = Arc::clone(&state);

			tokio::spawn(async move {
				let outcome = state.wait_for_flow(StdDuration::from_secs(5)).await;

				(outcome, registry.get(&key("abc")).is_none())
			})
		};

		tokio::task::yield_now().await;

		assert!(registry.mark_done(&key("abc")));

		let (outcome, removed) = waiter.await.expect("Waiter task should not panic.");

		assert!(matches!(outcome, WaitOutcome::Done));
		assert!(removed);
		assert!(registry.get_or_create(&key("abc")).is_initiator());
	}

	#[tokio::test]
	async fn errors_reach_every_waiter() {
		let registry = FlowRegistry::default();
		let state = Arc::clone(registry.get_or_create(&key("abc")).state());

		assert!(registry.mark_error(&key("abc"), Error::UnknownFlow));
		assert!(state.in_error());
		assert!(matches!(state.error(), Some(Error::UnknownFlow)));
		assert!(matches!(
			state.wait_for_flow(StdDuration::from_millis(10)).await,
			WaitOutcome::Failed(Error::UnknownFlow)
		));
	}

	#[tokio::test]
	async fn wait_times_out_without_resolving() {
		let registry = FlowRegistry::default();
		let state = Arc::clone(registry.get_or_create(&key("abc")).state());

		assert!(matches!(
			state.wait_for_flow(StdDuration::from_millis(20)).await,
			WaitOutcome::TimedOut
		));
		assert!(!state.is_resolved());
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn resolving_a_stale_attempt_leaves_the_new_one_alone() {
		let registry = FlowRegistry::default();
		let stale = Arc::clone(registry.get_or_create(&key("abc")).state());

		assert!(registry.mark_error(&key("abc"), Error::UnknownFlow));

		let fresh = Arc::clone(registry.get_or_create(&key("abc")).state());

		assert_ne!(stale.attempt(), fresh.attempt());
		assert!(!registry.resolve_attempt(&key("abc"), &stale, FlowStatus::Done));
		assert!(!fresh.is_resolved());
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn first_resolution_wins() {
		let registry = FlowRegistry::default();
		let state = Arc::clone(registry.get_or_create(&key("abc")).state());

		assert!(registry.resolve_attempt(&key("abc"), &state, FlowStatus::Done));
		assert!(!registry.resolve_attempt(&key("abc"), &state, FlowStatus::Failed(Error::UnknownFlow)));
		assert!(!state.in_error());
	}
}
