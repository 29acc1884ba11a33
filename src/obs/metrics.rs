// self
use crate::obs::{FlowOutcome, ProxyOperation};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(operation: ProxyOperation, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_local_proxy_flow_total",
			"operation" => operation.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (operation, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_flow_outcome_noop_without_recorder() {
		record_flow_outcome(ProxyOperation::FlowTask, FlowOutcome::Failure);
	}
}
