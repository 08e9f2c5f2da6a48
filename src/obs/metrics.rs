// self
use crate::obs::{CallKind, CallOutcome};

/// Records a call outcome via the global metrics recorder (when enabled).
pub fn record_call_outcome(kind: CallKind, outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"session_broker_call_total",
			"call" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records how many parked callers a settled refresh resumed.
pub fn record_refresh_waiters(count: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::histogram!("session_broker_refresh_waiters").record(count as f64);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = count;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_call_outcome_is_safe_without_recorder() {
		record_call_outcome(CallKind::Replay, CallOutcome::Failure);
		record_refresh_waiters(3);
	}
}
