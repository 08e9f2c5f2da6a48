//! Credential storage contracts and built-in store implementations.

pub mod cookie;
pub mod memory;

pub use cookie::{Cookie, CookieJarStore, CookiePolicy, SameSite};
pub use memory::MemoryCredentialStore;

// self
use crate::{_prelude::*, auth::TokenPair};

/// Marker recording that a login completed in this store.
pub const AUTH_STATUS_MARKER: &str = "auth_status";
/// Value [`AUTH_STATUS_MARKER`] holds while a session is established.
pub const AUTHENTICATED: &str = "authenticated";
/// Marker holding the id of the logged-in user.
pub const USER_ID_MARKER: &str = "user_id";

/// Holder of the single authoritative [`TokenPair`] and the session's status markers.
///
/// Implementations are synchronous: a `set` is visible to every subsequent `get` from any caller
/// without an intervening suspension point.
///
/// Markers are small named strings ([`AUTH_STATUS_MARKER`], [`USER_ID_MARKER`]) written at login.
/// They survive [`clear`](Self::clear) and are only dropped explicitly or by
/// [`clear_all`](Self::clear_all).
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the current pair; `None` means unauthenticated.
	fn get(&self) -> Option<TokenPair>;

	/// Replaces the current pair.
	fn set(&self, pair: TokenPair) -> Result<(), StoreError>;

	/// Removes the current pair. Idempotent.
	fn clear(&self) -> Result<(), StoreError>;

	/// Returns the marker `name`, if set.
	fn marker(&self, name: &str) -> Option<String>;

	/// Sets the marker `name` to `value`.
	fn set_marker(&self, name: &str, value: &str) -> Result<(), StoreError>;

	/// Removes the marker `name`. Idempotent.
	fn remove_marker(&self, name: &str) -> Result<(), StoreError>;

	/// Removes everything the store persists, used for full session teardown.
	fn clear_all(&self) -> Result<(), StoreError> {
		self.clear()?;
		self.remove_marker(AUTH_STATUS_MARKER)?;
		self.remove_marker(USER_ID_MARKER)
	}
}
impl<S> CredentialStore for Arc<S>
where
	S: ?Sized + CredentialStore,
{
	fn get(&self) -> Option<TokenPair> {
		(**self).get()
	}

	fn set(&self, pair: TokenPair) -> Result<(), StoreError> {
		(**self).set(pair)
	}

	fn clear(&self) -> Result<(), StoreError> {
		(**self).clear()
	}

	fn marker(&self, name: &str) -> Option<String> {
		(**self).marker(name)
	}

	fn set_marker(&self, name: &str, value: &str) -> Result<(), StoreError> {
		(**self).set_marker(name, value)
	}

	fn remove_marker(&self, name: &str) -> Result<(), StoreError> {
		(**self).remove_marker(name)
	}

	fn clear_all(&self) -> Result<(), StoreError> {
		(**self).clear_all()
	}
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
