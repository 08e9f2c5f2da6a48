//! Validating builder for [`ClientConfig`](super::ClientConfig).

// crates.io
use http::HeaderName;
// self
use crate::{
	_prelude::*,
	config::{AuthEndpoints, ClientConfig, Environment},
	store::CookiePolicy,
};

/// Errors raised while constructing or validating a [`ClientConfig`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ConfigBuilderError {
	/// Base URL must use HTTP or HTTPS.
	#[error("Base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Base URL that failed validation.
		url: String,
	},
	/// Endpoint paths must be absolute.
	#[error("The {endpoint} endpoint must start with `/`: {path}.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Supplied path.
		path: String,
	},
	/// Rotated-token header is not a legal header name.
	#[error("`{name}` is not a valid header name.")]
	InvalidHeaderName {
		/// Supplied header name.
		name: String,
	},
	/// Login route must be an absolute path.
	#[error("Login route must start with `/`: {route}.")]
	InvalidLoginRoute {
		/// Supplied route.
		route: String,
	},
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	/// Base URL requests are resolved against.
	pub base_url: Url,
	/// Token endpoint paths.
	pub endpoints: AuthEndpoints,
	/// Rotated-token header name, validated on build.
	pub rotated_token_header: String,
	/// Unauthenticated landing route.
	pub login_route: String,
	/// Session-expired notification text.
	pub session_expired_message: String,
	/// Deployment environment.
	pub environment: Environment,
	/// Explicit cookie policy; derived from the environment when unset.
	pub cookie_policy: Option<CookiePolicy>,
}
impl ClientConfigBuilder {
	/// Creates a builder seeded with defaults.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			endpoints: AuthEndpoints::default(),
			rotated_token_header: ClientConfig::DEFAULT_ROTATED_TOKEN_HEADER.into(),
			login_route: ClientConfig::DEFAULT_LOGIN_ROUTE.into(),
			session_expired_message: ClientConfig::DEFAULT_SESSION_EXPIRED_MESSAGE.into(),
			environment: Environment::default(),
			cookie_policy: None,
		}
	}

	/// Sets the token-issuance endpoint path.
	pub fn issue_endpoint(mut self, path: impl Into<String>) -> Self {
		self.endpoints.issue = path.into();

		self
	}

	/// Sets the token-refresh endpoint path.
	pub fn refresh_endpoint(mut self, path: impl Into<String>) -> Self {
		self.endpoints.refresh = path.into();

		self
	}

	/// Sets the token-verification endpoint path.
	pub fn verify_endpoint(mut self, path: impl Into<String>) -> Self {
		self.endpoints.verify = path.into();

		self
	}

	/// Sets the current-user endpoint path.
	pub fn me_endpoint(mut self, path: impl Into<String>) -> Self {
		self.endpoints.me = path.into();

		self
	}

	/// Sets the response header that carries rotated access tokens.
	pub fn rotated_token_header(mut self, name: impl Into<String>) -> Self {
		self.rotated_token_header = name.into();

		self
	}

	/// Sets the route the application is sent to when the session ends.
	pub fn login_route(mut self, route: impl Into<String>) -> Self {
		self.login_route = route.into();

		self
	}

	/// Sets the user-visible session-expired message.
	pub fn session_expired_message(mut self, message: impl Into<String>) -> Self {
		self.session_expired_message = message.into();

		self
	}

	/// Sets the deployment environment.
	pub fn environment(mut self, environment: Environment) -> Self {
		self.environment = environment;

		self
	}

	/// Overrides the cookie policy the environment would otherwise pick.
	pub fn cookie_policy(mut self, policy: CookiePolicy) -> Self {
		self.cookie_policy = Some(policy);

		self
	}

	/// Validates inputs and produces the configuration.
	pub fn build(self) -> Result<ClientConfig, ConfigBuilderError> {
		if !matches!(self.base_url.scheme(), "http" | "https") {
			return Err(ConfigBuilderError::UnsupportedScheme { url: self.base_url.to_string() });
		}

		for (endpoint, path) in [
			("issue", &self.endpoints.issue),
			("refresh", &self.endpoints.refresh),
			("verify", &self.endpoints.verify),
			("me", &self.endpoints.me),
		] {
			if !path.starts_with('/') {
				return Err(ConfigBuilderError::InvalidEndpoint { endpoint, path: path.clone() });
			}
		}

		if !self.login_route.starts_with('/') {
			return Err(ConfigBuilderError::InvalidLoginRoute { route: self.login_route });
		}

		let rotated_token_header =
			HeaderName::from_bytes(self.rotated_token_header.to_ascii_lowercase().as_bytes())
				.map_err(|_| ConfigBuilderError::InvalidHeaderName {
					name: self.rotated_token_header.clone(),
				})?;
		let cookie_policy = self.cookie_policy.unwrap_or_else(|| self.environment.cookie_policy());

		Ok(ClientConfig {
			base_url: self.base_url,
			endpoints: self.endpoints,
			rotated_token_header,
			login_route: self.login_route,
			session_expired_message: self.session_expired_message,
			environment: self.environment,
			cookie_policy,
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::SameSite;

	fn base() -> Url {
		Url::parse("https://api.example.com").expect("Base URL fixture should parse.")
	}

	#[test]
	fn production_builds_strict_secure_policy() {
		let config = ClientConfig::builder(base())
			.environment(Environment::Production)
			.rotated_token_header("New-Access-Token")
			.build()
			.expect("Production config should build.");

		assert_eq!(config.cookie_policy.same_site, SameSite::Strict);
		assert!(config.cookie_policy.secure);
		assert_eq!(config.rotated_token_header.as_str(), "new-access-token");
	}

	#[test]
	fn relative_endpoint_is_rejected() {
		let err = ClientConfig::builder(base())
			.refresh_endpoint("api/auth/token/refresh/")
			.build()
			.expect_err("Endpoint without leading slash should be rejected.");

		assert_eq!(err, ConfigBuilderError::InvalidEndpoint {
			endpoint: "refresh",
			path: "api/auth/token/refresh/".into(),
		});
	}

	#[test]
	fn me_endpoint_is_validated_like_token_endpoints() {
		let config = ClientConfig::builder(base())
			.me_endpoint("/api/users/me/")
			.build()
			.expect("Absolute me endpoint should build.");

		assert_eq!(config.endpoints.me, "/api/users/me/");

		let err = ClientConfig::builder(base())
			.me_endpoint("users/me/")
			.build()
			.expect_err("Relative me endpoint should be rejected.");

		assert_eq!(err, ConfigBuilderError::InvalidEndpoint { endpoint: "me", path: "users/me/".into() });
	}

	#[test]
	fn invalid_header_and_scheme_are_rejected() {
		let err = ClientConfig::builder(base())
			.rotated_token_header("bad header")
			.build()
			.expect_err("Header with whitespace should be rejected.");

		assert!(matches!(err, ConfigBuilderError::InvalidHeaderName { .. }));

		let ftp = Url::parse("ftp://files.example.com").expect("FTP URL fixture should parse.");
		let err = ClientConfig::builder(ftp).build().expect_err("FTP base should be rejected.");

		assert!(matches!(err, ConfigBuilderError::UnsupportedScheme { .. }));
	}
}
