//! Client configuration: API location, auth endpoints, rotation header, and cookie policy.

pub mod builder;

pub use builder::*;

// crates.io
use http::HeaderName;
// self
use crate::{_prelude::*, error::ConfigError, session::SessionExpired, store::CookiePolicy};

/// Deployment environment; decides how credential cookies are scoped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
	/// Local development: lax, non-secure cookies.
	#[default]
	Development,
	/// Production: strict, secure cookies.
	Production,
}
impl Environment {
	/// Cookie policy matching this environment.
	pub fn cookie_policy(self) -> CookiePolicy {
		match self {
			Self::Development => CookiePolicy::development(),
			Self::Production => CookiePolicy::production(),
		}
	}
}

/// Paths of the session endpoints.
///
/// The three token endpoints are exempt from automatic `Authorization` attachment. The
/// current-user endpoint is an ordinary API route and carries the bearer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEndpoints {
	/// Token-issuance (login) endpoint.
	pub issue: String,
	/// Token-refresh endpoint.
	pub refresh: String,
	/// Token-verification endpoint.
	pub verify: String,
	/// Current-user endpoint used to restore the session's user.
	pub me: String,
}
impl AuthEndpoints {
	/// Returns `true` if `path` (ignoring any query string) is one of the token endpoints.
	pub fn contains(&self, path: &str) -> bool {
		let path = path.split(['?', '#']).next().unwrap_or(path);

		[&self.issue, &self.refresh, &self.verify].into_iter().any(|endpoint| endpoint == path)
	}
}
impl Default for AuthEndpoints {
	fn default() -> Self {
		Self {
			issue: "/api/auth/token/".into(),
			refresh: "/api/auth/token/refresh/".into(),
			verify: "/api/auth/token/verify/".into(),
			me: "/users/auth/me/".into(),
		}
	}
}

/// Immutable configuration shared by every request an [`ApiClient`](crate::client::ApiClient)
/// sends.
#[derive(Clone, Debug)]
pub struct ClientConfig {
	/// Base URL that request paths are appended to.
	pub base_url: Url,
	/// Token endpoints.
	pub endpoints: AuthEndpoints,
	/// Response header carrying a server-rotated access token.
	pub rotated_token_header: HeaderName,
	/// Unauthenticated entry point the application is sent to when the session ends.
	pub login_route: String,
	/// User-visible message raised when the session ends.
	pub session_expired_message: String,
	/// Deployment environment.
	pub environment: Environment,
	/// Attributes for persisted credential cookies.
	pub cookie_policy: CookiePolicy,
}
impl ClientConfig {
	/// Header name servers use to push a rotated access token.
	pub const DEFAULT_ROTATED_TOKEN_HEADER: &str = "new-access-token";
	/// Default unauthenticated landing route.
	pub const DEFAULT_LOGIN_ROUTE: &str = "/login";
	/// Default session-expired notification text.
	pub const DEFAULT_SESSION_EXPIRED_MESSAGE: &str =
		"Your session has expired. Please log in again.";

	/// Returns a builder seeded with defaults for `base_url`.
	pub fn builder(base_url: Url) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url)
	}

	/// Default configuration for `base_url`.
	pub fn new(base_url: Url) -> Self {
		let environment = Environment::default();

		Self {
			base_url,
			endpoints: AuthEndpoints::default(),
			rotated_token_header: HeaderName::from_static(Self::DEFAULT_ROTATED_TOKEN_HEADER),
			login_route: Self::DEFAULT_LOGIN_ROUTE.into(),
			session_expired_message: Self::DEFAULT_SESSION_EXPIRED_MESSAGE.into(),
			environment,
			cookie_policy: environment.cookie_policy(),
		}
	}

	/// Returns `true` if requests to `path` must never carry an `Authorization` header.
	pub fn is_unauthenticated(&self, path: &str) -> bool {
		self.endpoints.contains(path)
	}

	/// Returns `true` if a request for `path`, resolved to `url`, hits a token endpoint.
	///
	/// Both the path as given and the resolved URL's path are checked, so absolute URLs naming a
	/// token endpoint are recognized too.
	pub fn targets_token_endpoint(&self, path: &str, url: &Url) -> bool {
		self.is_unauthenticated(path) || self.is_unauthenticated(url.path())
	}

	/// Joins the base URL and `path`; absolute URLs pass through untouched.
	pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
		if let Ok(absolute) = Url::parse(path) {
			return Ok(absolute);
		}

		let raw = format!(
			"{}/{}",
			self.base_url.as_str().trim_end_matches('/'),
			path.trim_start_matches('/')
		);

		Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { url: raw, source })
	}

	/// Notice raised when the refresh exchange fails.
	pub fn session_expired(&self) -> SessionExpired {
		SessionExpired {
			message: self.session_expired_message.clone(),
			redirect_to: self.login_route.clone(),
		}
	}
}
