//! Optional observability helpers for client calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `session_broker.call` with the `call` (kind)
//!   and `stage` (call site) fields. Request spans add `http.method` and `http.path` (query
//!   stripped). Debug/warn events cover queueing, rotation and escalation.
//! - Enable `metrics` to increment the `session_broker_call_total` counter for every
//!   attempt/success/failure, labeled by `call` + `outcome`, and to record the
//!   `session_broker_refresh_waiters` histogram each time a refresh settles.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Client call kinds observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
	/// First attempt of a caller's request.
	Dispatch,
	/// Replay of a request after a successful refresh.
	Replay,
	/// Refresh exchange driven by the coordinator.
	Refresh,
	/// Token issuance.
	Login,
	/// Token verification.
	Verify,
	/// Session check against the cached user or the current-user endpoint.
	CheckAuth,
	/// Session teardown.
	Logout,
}
impl CallKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallKind::Dispatch => "dispatch",
			CallKind::Replay => "replay",
			CallKind::Refresh => "refresh",
			CallKind::Login => "login",
			CallKind::Verify => "verify",
			CallKind::CheckAuth => "check_auth",
			CallKind::Logout => "logout",
		}
	}
}
impl Display for CallKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// Entry to a client operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl CallOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::Attempt => "attempt",
			CallOutcome::Success => "success",
			CallOutcome::Failure => "failure",
		}
	}

	/// Maps a result onto its terminal outcome.
	pub fn of<T, E>(result: &Result<T, E>) -> Self {
		match result {
			Ok(_) => Self::Success,
			Err(_) => Self::Failure,
		}
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
