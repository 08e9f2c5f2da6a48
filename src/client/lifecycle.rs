//! Session lifecycle: login against the token-issuance endpoint, session checks, verification,
//! and logout.

// crates.io
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
	cache::SessionCache,
	client::ApiClient,
	error::{ConfigError, TransientError},
	http::{ApiRequest, HttpTransport},
	obs::{self, CallKind, CallOutcome, CallSpan},
	store::{AUTH_STATUS_MARKER, AUTHENTICATED, USER_ID_MARKER},
};

/// Cache key the login payload's `user` object is stored under.
pub const USER_CACHE_KEY: &str = "user";

/// Decoded token-issuance response.
#[derive(Clone, Debug)]
pub struct LoginResponse {
	/// Issued token pair, already persisted to the credential store.
	pub pair: TokenPair,
	/// `user` object returned alongside the tokens, if any.
	pub user: Option<Value>,
	/// Remaining top-level fields.
	pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawLogin {
	#[serde(default)]
	access: Option<TokenSecret>,
	#[serde(default)]
	refresh: Option<TokenSecret>,
	#[serde(default)]
	user: Option<Value>,
	#[serde(flatten)]
	extra: Map<String, Value>,
}
impl RawLogin {
	fn into_response(self) -> Result<LoginResponse, ConfigError> {
		let access = present(self.access).ok_or(ConfigError::IncompleteLogin { field: "access" })?;
		let refresh =
			present(self.refresh).ok_or(ConfigError::IncompleteLogin { field: "refresh" })?;

		Ok(LoginResponse {
			pair: TokenPair::new(access, refresh),
			user: self.user.filter(|user| !user.is_null()),
			extra: self.extra,
		})
	}
}

impl<T> ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Exchanges `credentials` at the token-issuance endpoint and starts a session.
	///
	/// The response must carry both tokens. The pair is persisted before this returns and the
	/// `user` object, when present, is cached under [`USER_CACHE_KEY`] for
	/// [`SessionCache::DEFAULT_TTL`]. The store's [`AUTH_STATUS_MARKER`] is set to
	/// [`AUTHENTICATED`], and [`USER_ID_MARKER`] follows the user's `id`.
	pub async fn login<C>(&self, credentials: &C) -> Result<LoginResponse>
	where
		C: ?Sized + Serialize,
	{
		const KIND: CallKind = CallKind::Login;

		let span = CallSpan::new(KIND, "login");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async {
				let request = ApiRequest::post(self.config.endpoints.issue.as_str()).json(credentials)?;
				let raw: RawLogin = self.send(request).await?.json()?;
				let login = raw.into_response()?;

				self.credentials.set(login.pair.clone())?;
				self.credentials.set_marker(AUTH_STATUS_MARKER, AUTHENTICATED)?;

				match login.user.as_ref().and_then(user_id) {
					Some(id) => self.credentials.set_marker(USER_ID_MARKER, &id)?,
					None => self.credentials.remove_marker(USER_ID_MARKER)?,
				}

				if let Some(user) = &login.user {
					self.cache.set(USER_CACHE_KEY, user, SessionCache::DEFAULT_TTL)?;
				}

				#[cfg(feature = "tracing")]
				tracing::debug!(has_user = login.user.is_some(), "session started");

				Ok(login)
			})
			.await;

		obs::record_call_outcome(KIND, CallOutcome::of(&result));

		result
	}

	/// Restores the session's user, preferring the cached copy.
	///
	/// Without a cached user a stored access token is required and the current-user endpoint is
	/// asked, with the usual refresh recovery. Its `user` field (or the whole body when there is
	/// none) is cached for [`SessionCache::DEFAULT_TTL`]. Any failure ends the local session
	/// before the error is returned: the pair, the status markers and the cached user are dropped.
	pub async fn check_auth<U>(&self) -> Result<U>
	where
		U: DeserializeOwned,
	{
		const KIND: CallKind = CallKind::CheckAuth;

		let span = CallSpan::new(KIND, "check_auth");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span.instrument(self.restore_user()).await;

		if result.is_err() {
			self.end_local_session();
		}

		obs::record_call_outcome(KIND, CallOutcome::of(&result));

		result
	}

	/// Asks the verification endpoint whether the stored access token is still valid.
	///
	/// Returns `false` without a network call when no token is stored, and `false` when the
	/// endpoint answers 400 or 401. Other failures propagate.
	pub async fn verify(&self) -> Result<bool> {
		const KIND: CallKind = CallKind::Verify;

		let span = CallSpan::new(KIND, "verify");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async {
				let Some(pair) = self.credentials.get() else {
					return Ok(false);
				};
				let request = ApiRequest::post(self.config.endpoints.verify.as_str())
					.json(&serde_json::json!({ "token": pair.access.expose() }))?;

				match self.send(request).await {
					Ok(_) => Ok(true),
					Err(e) if matches!(e.status(), Some(400 | 401)) => Ok(false),
					Err(e) => Err(e),
				}
			})
			.await;

		obs::record_call_outcome(KIND, CallOutcome::of(&result));

		result
	}

	/// Ends the session locally: empties the session cache and every stored credential.
	pub fn logout(&self) -> Result<()> {
		const KIND: CallKind = CallKind::Logout;

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = self.cache.clear_all();

		#[cfg(feature = "tracing")]
		tracing::debug!(ok = result.is_ok(), "session ended by logout");

		obs::record_call_outcome(KIND, CallOutcome::of(&result));

		result
	}

	async fn restore_user<U>(&self) -> Result<U>
	where
		U: DeserializeOwned,
	{
		if let Some(user) = self.cache.get(USER_CACHE_KEY)? {
			return Ok(user);
		}
		if self.credentials.get().is_none() {
			return Err(Error::NotAuthenticated);
		}

		let response = self.send(ApiRequest::get(self.config.endpoints.me.as_str())).await?;
		let user = match response.json::<Value>()? {
			Value::Object(mut fields) if fields.contains_key("user") =>
				fields.remove("user").unwrap_or_default(),
			body => body,
		};
		let decoded = serde_path_to_error::deserialize(&user).map_err(|source| {
			TransientError::ResponseParse { source, status: Some(response.status.as_u16()) }
		})?;

		self.cache.set(USER_CACHE_KEY, &user, SessionCache::DEFAULT_TTL)?;

		#[cfg(feature = "tracing")]
		tracing::debug!("session user restored from the current-user endpoint");

		Ok(decoded)
	}

	fn end_local_session(&self) {
		self.cache.remove(USER_CACHE_KEY);

		let cleared = self
			.credentials
			.clear()
			.and_then(|()| self.credentials.remove_marker(AUTH_STATUS_MARKER))
			.and_then(|()| self.credentials.remove_marker(USER_ID_MARKER));

		if let Err(_err) = cleared {
			#[cfg(feature = "tracing")]
			tracing::warn!(error = %_err, "failed to clear credentials after a failed session check");
		}
	}

	/// User object cached by the last [`login`](Self::login), while it has not expired.
	pub fn cached_user<U>(&self) -> Result<Option<U>>
	where
		U: DeserializeOwned,
	{
		Ok(self.cache.get(USER_CACHE_KEY)?)
	}
}

fn present(token: Option<TokenSecret>) -> Option<TokenSecret> {
	token.filter(|token| !token.expose().is_empty())
}

fn user_id(user: &Value) -> Option<String> {
	match user.get("id")? {
		Value::String(id) if !id.is_empty() => Some(id.clone()),
		Value::Number(id) => Some(id.to_string()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn decode(body: Value) -> Result<LoginResponse, ConfigError> {
		serde_json::from_value::<RawLogin>(body)
			.expect("Login fixture should decode.")
			.into_response()
	}

	#[test]
	fn login_requires_both_tokens() {
		let err = decode(serde_json::json!({ "access": "a" }))
			.expect_err("Missing refresh token should be rejected.");

		assert!(matches!(err, ConfigError::IncompleteLogin { field: "refresh" }));

		let err = decode(serde_json::json!({ "access": "", "refresh": "r" }))
			.expect_err("Empty access token should be rejected.");

		assert!(matches!(err, ConfigError::IncompleteLogin { field: "access" }));
	}

	#[test]
	fn login_keeps_user_and_extra_fields() {
		let login = decode(serde_json::json!({
			"access": "a",
			"refresh": "r",
			"user": { "id": 3, "email": "dj@example.com" },
			"message": "Welcome back",
		}))
		.expect("Complete login should decode.");

		assert_eq!(login.pair, TokenPair::new("a", "r"));
		assert_eq!(login.user, Some(serde_json::json!({ "id": 3, "email": "dj@example.com" })));
		assert_eq!(login.extra.get("message"), Some(&Value::from("Welcome back")));
		assert!(!login.extra.contains_key("access"));
	}

	#[test]
	fn user_id_accepts_numbers_and_strings() {
		assert_eq!(user_id(&serde_json::json!({ "id": 7 })).as_deref(), Some("7"));
		assert_eq!(user_id(&serde_json::json!({ "id": "u-7" })).as_deref(), Some("u-7"));
		assert_eq!(user_id(&serde_json::json!({ "id": "" })), None);
		assert_eq!(user_id(&serde_json::json!({ "email": "dj@example.com" })), None);
	}

	#[test]
	fn null_user_is_treated_as_absent() {
		let login = decode(serde_json::json!({ "access": "a", "refresh": "r", "user": null }))
			.expect("Complete login should decode.");

		assert!(login.user.is_none());
	}
}
