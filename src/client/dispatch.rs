//! Request dispatch: bearer attachment, rotated-token capture, and one-shot 401 recovery.
//!
//! Every call goes through [`ApiClient::send`]. The stored access token is attached unless the
//! request targets a token endpoint, every response is checked for a server-rotated token, and a
//! 401 on a request that has not been replayed yet hands off to the refresh coordinator before
//! the request is sent once more. A second 401 is final.

// crates.io
use http::{HeaderValue, Method, header::ACCEPT};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
	client::ApiClient,
	http::{ApiRequest, ApiResponse, HttpTransport},
	obs::{self, CallKind, CallOutcome, CallSpan},
};

impl<T> ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Sends `request`, recovering once from an expired access token.
	///
	/// 2xx responses are returned as-is. A 401 triggers (or joins) a refresh and a single replay
	/// with the new token; if the replay is rejected again the call fails with
	/// [`Error::RetryExhausted`]. Any other non-success status is surfaced as
	/// [`TransientError::Status`](crate::error::TransientError::Status) without a retry.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: CallKind = CallKind::Dispatch;

		let span = CallSpan::request(KIND, "send", &request.method, &request.path);

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span.instrument(self.send_with_recovery(request)).await;

		obs::record_call_outcome(KIND, CallOutcome::of(&result));

		result
	}

	/// Sends `request` and decodes a JSON body.
	pub async fn send_json<R>(&self, request: ApiRequest) -> Result<R>
	where
		R: DeserializeOwned,
	{
		let request = request.header(ACCEPT, HeaderValue::from_static("application/json"));
		let response = self.send(request).await?;

		Ok(response.json()?)
	}

	/// `GET path`.
	pub async fn get(&self, path: &str) -> Result<ApiResponse> {
		self.send(ApiRequest::get(path)).await
	}

	/// `POST path` with a JSON body.
	pub async fn post<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send_body(Method::POST, path, body).await
	}

	/// `PUT path` with a JSON body.
	pub async fn put<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send_body(Method::PUT, path, body).await
	}

	/// `PATCH path` with a JSON body.
	pub async fn patch<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send_body(Method::PATCH, path, body).await
	}

	/// `DELETE path`.
	pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
		self.send(ApiRequest::delete(path)).await
	}

	async fn send_body<B>(&self, method: Method, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		let request = ApiRequest::new(method, path).json(body)?;

		self.send(request).await
	}

	async fn send_with_recovery(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		let mut refreshed = None;

		loop {
			let response = match &refreshed {
				None => self.dispatch(&request, None).await?,
				Some(token) => self.replay(&request, token).await?,
			};

			if !response.is_unauthorized() {
				return settle(response);
			}
			// Token endpoints answer 401 for bad credentials; a refresh cannot fix that.
			if self.targets_token_endpoint(&request) {
				return Err(response.into_error().into());
			}
			if !request.mark_retried() {
				#[cfg(feature = "tracing")]
				tracing::warn!(
					method = %request.method,
					path = %request.path,
					"replayed request rejected again; giving up"
				);

				return Err(retry_exhausted(&request));
			}

			#[cfg(feature = "tracing")]
			tracing::debug!(method = %request.method, path = %request.path, "access token rejected; refreshing");

			refreshed = Some(self.refresh_access_token().await?);
		}
	}

	async fn replay(&self, request: &ApiRequest, token: &TokenSecret) -> Result<ApiResponse> {
		const KIND: CallKind = CallKind::Replay;

		let span = CallSpan::request(KIND, "replay", &request.method, &request.path);

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span.instrument(self.dispatch(request, Some(token))).await;
		let outcome = match &result {
			Ok(response) if response.is_success() => CallOutcome::Success,
			_ => CallOutcome::Failure,
		};

		obs::record_call_outcome(KIND, outcome);

		result
	}

	/// One network round trip: resolve, attach the bearer, execute, observe rotation.
	///
	/// `fallback` is only used when the credential store holds no access token.
	async fn dispatch(
		&self,
		request: &ApiRequest,
		fallback: Option<&TokenSecret>,
	) -> Result<ApiResponse> {
		let url = self.config.resolve(&request.path)?;
		let bearer = if self.config.targets_token_endpoint(&request.path, &url) {
			None
		} else {
			self.credentials.get().map(|pair| pair.access).or_else(|| fallback.cloned())
		};
		let outbound = request.to_outbound(url, bearer.as_ref())?;
		let response = self.transport.execute(outbound).await?;

		self.observe_rotation(&response);

		Ok(response)
	}

	fn targets_token_endpoint(&self, request: &ApiRequest) -> bool {
		match self.config.resolve(&request.path) {
			Ok(url) => self.config.targets_token_endpoint(&request.path, &url),
			Err(_) => self.config.is_unauthenticated(&request.path),
		}
	}

	/// Persists a server-rotated access token carried by `response`, keeping the refresh token.
	pub(super) fn observe_rotation(&self, response: &ApiResponse) {
		let Some(token) = response.rotated_token(&self.config.rotated_token_header) else {
			return;
		};
		let pair = match self.credentials.get() {
			Some(current) => current.with_access(token),
			None => TokenPair::access_only(token),
		};

		match self.credentials.set(pair) {
			Ok(()) => {
				#[cfg(feature = "tracing")]
				tracing::debug!("stored server-rotated access token");
			},
			Err(_err) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(error = %_err, "failed to store server-rotated access token");
			},
		}
	}
}

fn settle(response: ApiResponse) -> Result<ApiResponse> {
	if response.is_success() {
		return Ok(response);
	}

	Err(response.into_error().into())
}

fn retry_exhausted(request: &ApiRequest) -> Error {
	Error::RetryExhausted { method: request.method.to_string(), path: request.path.clone() }
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::VecDeque;
	// crates.io
	use http::{HeaderMap, HeaderName, StatusCode, header::AUTHORIZATION};
	// self
	use super::*;
	use crate::{
		config::ClientConfig,
		error::TransientError,
		http::{OutboundRequest, TransportFuture},
		session::SessionExpired,
		store::{CredentialStore, MemoryCredentialStore, StoreError},
	};

	type Notices = Arc<Mutex<Vec<SessionExpired>>>;

	#[derive(Default)]
	struct ScriptedTransport {
		responses: Mutex<VecDeque<ApiResponse>>,
		seen: Mutex<Vec<OutboundRequest>>,
	}
	impl ScriptedTransport {
		fn new(responses: impl IntoIterator<Item = ApiResponse>) -> Self {
			Self { responses: Mutex::new(responses.into_iter().collect()), seen: Default::default() }
		}

		fn seen(&self) -> Vec<(String, Option<String>)> {
			self.seen
				.lock()
				.iter()
				.map(|request| {
					let auth = request
						.headers
						.get(AUTHORIZATION)
						.and_then(|value| value.to_str().ok())
						.map(str::to_owned);

					(request.url.path().to_owned(), auth)
				})
				.collect()
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn execute(&self, request: OutboundRequest) -> TransportFuture<'_> {
			self.seen.lock().push(request);

			let response = self.responses.lock().pop_front().expect("Script ran out of responses.");

			Box::pin(async move { Ok(response) })
		}
	}

	fn reply(status: u16, body: &str) -> ApiResponse {
		ApiResponse::new(
			StatusCode::from_u16(status).expect("Status fixture should be valid."),
			HeaderMap::new(),
			body.as_bytes(),
		)
	}

	/// Memory store that also remembers every access token written to it.
	#[derive(Default)]
	struct JournalStore {
		inner: MemoryCredentialStore,
		writes: Mutex<Vec<String>>,
	}
	impl JournalStore {
		fn seeded(pair: TokenPair) -> Self {
			Self { inner: MemoryCredentialStore::with_pair(pair), writes: Default::default() }
		}

		fn writes(&self) -> Vec<String> {
			self.writes.lock().clone()
		}
	}
	impl CredentialStore for JournalStore {
		fn get(&self) -> Option<TokenPair> {
			self.inner.get()
		}

		fn set(&self, pair: TokenPair) -> Result<(), StoreError> {
			self.writes.lock().push(pair.access.expose().to_owned());
			self.inner.set(pair)
		}

		fn clear(&self) -> Result<(), StoreError> {
			self.inner.clear()
		}

		fn marker(&self, name: &str) -> Option<String> {
			self.inner.marker(name)
		}

		fn set_marker(&self, name: &str, value: &str) -> Result<(), StoreError> {
			self.inner.set_marker(name, value)
		}

		fn remove_marker(&self, name: &str) -> Result<(), StoreError> {
			self.inner.remove_marker(name)
		}
	}

	fn client<S>(
		store: &Arc<S>,
		responses: impl IntoIterator<Item = ApiResponse>,
	) -> (ApiClient<ScriptedTransport>, Arc<ScriptedTransport>, Notices)
	where
		S: 'static + CredentialStore,
	{
		let config = ClientConfig::new(
			Url::parse("https://api.example.com").expect("Base URL fixture should parse."),
		);
		let transport = Arc::new(ScriptedTransport::new(responses));
		let notices = Arc::new(Mutex::new(Vec::new()));
		let sink = notices.clone();
		let client = ApiClient::<ScriptedTransport>::with_transport(config, store.clone(), transport.clone())
			.with_listener(Arc::new(move |notice: &SessionExpired| sink.lock().push(notice.clone())));

		(client, transport, notices)
	}

	#[tokio::test]
	async fn attaches_stored_token_except_on_token_endpoints() {
		let store = Arc::new(MemoryCredentialStore::with_pair(TokenPair::new("t1", "r1")));
		let (client, transport, _) = client(&store, [reply(200, "{}"), reply(200, "{}")]);

		client.get("/api/events/").await.expect("Authenticated GET should succeed.");
		client
			.post("/api/auth/token/verify/", &serde_json::json!({ "token": "t1" }))
			.await
			.expect("Verify call should succeed.");

		assert_eq!(
			transport.seen(),
			[
				("/api/events/".to_owned(), Some("Bearer t1".to_owned())),
				("/api/auth/token/verify/".to_owned(), None),
			]
		);
	}

	#[tokio::test]
	async fn rotated_header_is_persisted_on_any_status() {
		let store = Arc::new(MemoryCredentialStore::with_pair(TokenPair::new("t1", "r1")));
		let mut rotated = reply(404, "missing");

		rotated.headers.insert(
			HeaderName::from_static("new-access-token"),
			HeaderValue::from_static("t9"),
		);

		let (client, _, _) = client(&store, [rotated]);
		let err = client.get("/api/events/42/").await.expect_err("404 should propagate.");

		assert_eq!(err.status(), Some(404));

		let pair = store.get().expect("Rotated pair should be stored.");

		assert_eq!(pair.access.expose(), "t9");
		assert_eq!(pair.refresh.as_ref().map(TokenSecret::expose), Some("r1"));
	}

	#[tokio::test]
	async fn rotated_header_on_refresh_response_is_observed() {
		let store = Arc::new(JournalStore::seeded(TokenPair::new("t1", "r1")));
		let mut refreshed = reply(200, r#"{"access":"t2"}"#);

		refreshed.headers.insert(
			HeaderName::from_static("new-access-token"),
			HeaderValue::from_static("t9"),
		);

		let (client, transport, _) = client(&store, [reply(401, ""), refreshed, reply(200, "{}")]);

		client.get("/api/events/").await.expect("Replay should succeed.");

		assert_eq!(store.writes(), ["t9", "t2"]);
		assert_eq!(transport.seen()[2].1.as_deref(), Some("Bearer t2"));
	}

	#[tokio::test]
	async fn expired_token_is_refreshed_and_replayed_once() {
		let store = Arc::new(MemoryCredentialStore::with_pair(TokenPair::new("t1", "r1")));
		let (client, transport, notices) = client(
			&store,
			[reply(401, ""), reply(200, r#"{"access":"t2"}"#), reply(200, r#"{"ok":true}"#)],
		);
		let body: serde_json::Value = client
			.send_json(ApiRequest::get("/api/events/"))
			.await
			.expect("Replay should succeed.");

		assert_eq!(body, serde_json::json!({ "ok": true }));
		assert_eq!(
			transport.seen(),
			[
				("/api/events/".to_owned(), Some("Bearer t1".to_owned())),
				("/api/auth/token/refresh/".to_owned(), None),
				("/api/events/".to_owned(), Some("Bearer t2".to_owned())),
			]
		);
		assert_eq!(store.get().map(|pair| pair.access), Some(TokenSecret::new("t2")));
		assert!(notices.lock().is_empty());
	}

	#[tokio::test]
	async fn second_rejection_is_final() {
		let store = Arc::new(MemoryCredentialStore::with_pair(TokenPair::new("t1", "r1")));
		let (client, transport, notices) =
			client(&store, [reply(401, ""), reply(200, r#"{"access":"t2"}"#), reply(401, "")]);
		let err = client.get("/api/events/").await.expect_err("Second 401 should be final.");

		assert!(matches!(err, Error::RetryExhausted { ref path, .. } if path == "/api/events/"));
		assert_eq!(transport.seen().len(), 3);
		assert_eq!(client.refresh_metrics().attempts(), 1);
		assert!(notices.lock().is_empty());
	}

	#[tokio::test]
	async fn non_auth_failures_propagate_verbatim() {
		let store = Arc::new(MemoryCredentialStore::with_pair(TokenPair::new("t1", "r1")));
		let (client, transport, _) = client(&store, [reply(503, "maintenance")]);
		let err = client.get("/api/surveys/").await.expect_err("503 should propagate.");

		match err {
			Error::Transient(TransientError::Status { status, body, .. }) => {
				assert_eq!(status, 503);
				assert_eq!(body, "maintenance");
			},
			other => panic!("Unexpected error: {other:?}"),
		}

		assert_eq!(transport.seen().len(), 1);
	}

	#[tokio::test]
	async fn login_rejection_does_not_refresh() {
		let store = Arc::new(MemoryCredentialStore::default());
		let (client, transport, notices) = client(&store, [reply(401, "bad credentials")]);
		let err = client
			.post("/api/auth/token/", &serde_json::json!({ "username": "u", "password": "p" }))
			.await
			.expect_err("Bad credentials should propagate.");

		assert_eq!(err.status(), Some(401));
		assert!(!err.is_auth_expired());
		assert_eq!(transport.seen().len(), 1);
		assert!(notices.lock().is_empty());
	}

	#[tokio::test]
	async fn absolute_token_endpoint_rejection_does_not_refresh() {
		let store = Arc::new(MemoryCredentialStore::with_pair(TokenPair::new("t1", "r1")));
		let (client, transport, notices) = client(&store, [reply(401, "bad credentials")]);
		let err = client
			.post(
				"https://api.example.com/api/auth/token/",
				&serde_json::json!({ "username": "u", "password": "p" }),
			)
			.await
			.expect_err("Bad credentials should propagate.");

		assert_eq!(err.status(), Some(401));
		assert_eq!(transport.seen(), [("/api/auth/token/".to_owned(), None)]);
		assert_eq!(client.refresh_metrics().attempts(), 0);
		assert!(store.get().is_some());
		assert!(notices.lock().is_empty());
	}

	#[tokio::test]
	async fn failed_refresh_clears_credentials_and_escalates() {
		let store = Arc::new(MemoryCredentialStore::with_pair(TokenPair::new("t1", "r1")));
		let (client, _, notices) = client(&store, [reply(401, ""), reply(401, "expired")]);
		let err = client.get("/api/events/").await.expect_err("Failed refresh should propagate.");

		assert!(err.is_auth_expired());
		assert!(store.get().is_none());
		assert_eq!(notices.lock().len(), 1);
		assert_eq!(notices.lock()[0].redirect_to, "/login");
	}
}
