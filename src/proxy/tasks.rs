//! Registry of background flow tasks, drained on shutdown.

// crates.io
use tokio::task::JoinHandle;
// self
use crate::_prelude::*;

/// Tracks the task driving each initiated flow.
#[derive(Clone, Debug, Default)]
pub struct FlowTasks {
	handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}
impl FlowTasks {
	/// Spawns `future` and registers its handle before returning.
	pub fn spawn<F>(&self, future: F)
	where
		F: 'static + Send + Future<Output = ()>,
	{
		let handle = tokio::spawn(future);
		let mut handles = self.handles.lock();

		handles.retain(|h| !h.is_finished());
		handles.push(handle);
	}

	/// Cancels every registered task and waits for each to finish.
	///
	/// Cancelled flows resolve through their drop guards, so pending waiters wake with an error.
	pub async fn shutdown(&self) {
		let handles = std::mem::take(&mut *self.handles.lock());
		let count = handles.len();

		if count == 0 {
			return;
		}

		tracing::info!(count, "Cancelling pending flow tasks.");

		for (i, handle) in handles.into_iter().enumerate() {
			handle.abort();

			match handle.await {
				Err(e) if e.is_panic() => tracing::warn!(task = i, error = %e, "Flow task panicked."),
				_ => {},
			}
		}

		tracing::info!("All flow tasks finished.");
	}

	/// Number of tasks still running.
	pub fn pending_count(&self) -> usize {
		let mut handles = self.handles.lock();

		handles.retain(|h| !h.is_finished());
		handles.len()
	}
}
