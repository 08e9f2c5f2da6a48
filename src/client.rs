//! Session-aware API client: bearer attachment, 401 recovery, and session lifecycle.

pub mod dispatch;
pub mod lifecycle;
pub mod refresh;

pub use lifecycle::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	cache::SessionCache,
	config::ClientConfig,
	http::HttpTransport,
	session::{LoggingListener, SessionListener},
	store::{AUTH_STATUS_MARKER, AUTHENTICATED, CredentialStore},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestApiClient = ApiClient<ReqwestTransport>;

/// Explicitly constructed session coordinator for one API.
///
/// The client owns the transport, configuration, credential store, session listener, session
/// cache, and refresh coordinator, so independent instances never share refresh state. Clones
/// share all of them and therefore act as one session.
pub struct ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Transport used for every outbound request, including the refresh exchange.
	pub transport: Arc<T>,
	/// Immutable client configuration.
	pub config: Arc<ClientConfig>,
	/// Holder of the authoritative token pair.
	pub credentials: Arc<dyn CredentialStore>,
	/// Receiver of session-ended signals.
	pub listener: Arc<dyn SessionListener>,
	/// Session-scoped value cache, torn down together with the credentials.
	pub cache: Arc<SessionCache>,
	coordinator: Arc<RefreshCoordinator>,
}
impl<T> ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a client around the caller-provided transport.
	pub fn with_transport(
		config: ClientConfig,
		credentials: Arc<dyn CredentialStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self {
			transport: transport.into(),
			config: Arc::new(config),
			cache: Arc::new(SessionCache::new(credentials.clone())),
			credentials,
			listener: Arc::new(LoggingListener),
			coordinator: Default::default(),
		}
	}

	/// Replaces the session listener.
	pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
		self.listener = listener;

		self
	}

	/// Refresh coordinator shared by every clone of this client.
	pub fn coordinator(&self) -> &RefreshCoordinator {
		&self.coordinator
	}

	/// Counters for refresh exchanges.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		self.coordinator.metrics()
	}

	/// Returns `true` while a token pair is stored.
	pub fn has_credentials(&self) -> bool {
		self.credentials.get().is_some()
	}

	/// Returns `true` for an established session.
	///
	/// That takes a stored token pair, a live cached user, and the store's
	/// [`AUTH_STATUS_MARKER`] set to [`AUTHENTICATED`].
	pub fn is_authenticated(&self) -> bool {
		self.has_credentials()
			&& self.credentials.marker(AUTH_STATUS_MARKER).as_deref() == Some(AUTHENTICATED)
			&& matches!(self.cache.get::<serde_json::Value>(USER_CACHE_KEY), Ok(Some(_)))
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestTransport> {
	/// Creates a client that provisions its own cookie-aware reqwest transport.
	pub fn new(config: ClientConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
		Ok(Self::with_transport(config, credentials, ReqwestTransport::new()?))
	}
}
impl<T> Clone for ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			config: self.config.clone(),
			credentials: self.credentials.clone(),
			listener: self.listener.clone(),
			cache: self.cache.clone(),
			coordinator: self.coordinator.clone(),
		}
	}
}
impl<T> Debug for ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("has_credentials", &self.has_credentials())
			.field("refreshing", &self.coordinator.is_refreshing())
			.finish()
	}
}
