//! Session-ended escalation: the notice raised when a refresh fails and who hears about it.

// self
use crate::{_prelude::*, store::CredentialStore};

/// User-visible notice plus the route the application should navigate to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionExpired {
	/// Message shown to the user.
	pub message: String,
	/// Unauthenticated entry point to redirect to.
	pub redirect_to: String,
}

/// Receiver of session-ended signals; typically shows a notification and navigates to login.
///
/// Raised only when the refresh exchange fails, never on ordinary request failures.
pub trait SessionListener
where
	Self: Send + Sync,
{
	/// Called once per failed refresh exchange.
	fn on_session_expired(&self, notice: &SessionExpired);
}
impl<F> SessionListener for F
where
	F: Fn(&SessionExpired) + Send + Sync,
{
	fn on_session_expired(&self, notice: &SessionExpired) {
		self(notice)
	}
}

/// Listener that only logs; the default when the application registers nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingListener;
impl SessionListener for LoggingListener {
	fn on_session_expired(&self, notice: &SessionExpired) {
		#[cfg(feature = "tracing")]
		tracing::warn!(redirect_to = %notice.redirect_to, "{}", notice.message);
		#[cfg(not(feature = "tracing"))]
		let _ = notice;
	}
}

/// Ends the session: drops the stored credentials, then tells the listener.
///
/// A store that cannot be cleared does not stop the signal from being raised.
pub(crate) fn escalate(
	credentials: &dyn CredentialStore,
	listener: &dyn SessionListener,
	notice: &SessionExpired,
) {
	if let Err(_err) = credentials.clear() {
		#[cfg(feature = "tracing")]
		tracing::error!(error = %_err, "failed to clear credentials while ending the session");
	}

	listener.on_session_expired(notice);
}
