//! Observability helpers for proxy operations.
//!
//! - Every orchestrator entry point runs inside a span named `oauth2_local_proxy.flow` with the
//!   `operation` and `stage` (call site) fields.
//! - Enable `metrics` to increment the `oauth2_local_proxy_flow_total` counter for every
//!   attempt/success/failure, labeled by `operation` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProxyOperation {
	/// `POST /token` handling.
	TokenRequest,
	/// Redirect callback handling.
	Callback,
	/// Background work driving one flow attempt.
	FlowTask,
}
impl ProxyOperation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProxyOperation::TokenRequest => "token_request",
			ProxyOperation::Callback => "callback",
			ProxyOperation::FlowTask => "flow_task",
		}
	}
}
impl Display for ProxyOperation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a proxy operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}

	/// Success or failure label for `result`.
	pub fn of<T, E>(result: &Result<T, E>) -> Self {
		if result.is_ok() { Self::Success } else { Self::Failure }
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
