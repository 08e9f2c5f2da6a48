//! Request/response descriptors and the transport seam the dispatcher sends through.
//!
//! [`HttpTransport`] is the client's only dependency on an HTTP stack. The dispatcher hands it a
//! fully resolved [`OutboundRequest`] (absolute URL, final headers) and gets back an
//! [`ApiResponse`] for every status code; only failures that never produced a response are
//! errors at this layer.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use http::{
	HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
	header::{CONTENT_TYPE, RETRY_AFTER},
};
use serde::de::DeserializeOwned;
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, TransientError, TransportError},
};

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks able to execute a resolved request.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by every clone
/// of a client, and the futures they return must be `Send`.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and returns the response whatever its status.
	fn execute(&self, request: OutboundRequest) -> TransportFuture<'_>;
}

/// Fully resolved request handed to a transport.
#[derive(Clone, Debug)]
pub struct OutboundRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Final header set, including any attached `Authorization`.
	pub headers: HeaderMap,
	/// Raw body bytes.
	pub body: Option<Vec<u8>>,
}

/// Caller-facing request descriptor: method, API path, headers, and body.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the configured base URL (or an absolute URL).
	pub path: String,
	/// Caller-supplied headers.
	pub headers: HeaderMap,
	/// Raw body bytes.
	pub body: Option<Vec<u8>>,
	retried: bool,
}
impl ApiRequest {
	/// Creates a request without headers or body.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), headers: HeaderMap::new(), body: None, retried: false }
	}

	/// `GET path`.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// `POST path`.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// `PUT path`.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// `PATCH path`.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// `DELETE path`.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Adds or replaces a header.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Sets a raw body.
	pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Serializes `value` as the JSON body and sets `Content-Type: application/json`.
	pub fn json<T>(mut self, value: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let body =
			serde_json::to_vec(value).map_err(|source| ConfigError::RequestBody { source })?;

		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		self.body = Some(body);

		Ok(self)
	}

	/// Sets the one-shot retry marker; returns `false` if it was already set.
	///
	/// Only the dispatcher's recovery loop touches the marker, so a request handed to
	/// [`ApiClient::send`](crate::client::ApiClient::send) always starts unmarked.
	pub(crate) fn mark_retried(&mut self) -> bool {
		!std::mem::replace(&mut self.retried, true)
	}

	/// Resolves against `url`, attaching `bearer` when given.
	pub(crate) fn to_outbound(
		&self,
		url: Url,
		bearer: Option<&TokenSecret>,
	) -> Result<OutboundRequest, ConfigError> {
		let mut headers = self.headers.clone();

		if let Some(token) = bearer {
			let value = HeaderValue::from_str(&token.bearer())
				.map_err(|_| ConfigError::InvalidHeader { name: "authorization".into() })?;

			headers.insert(http::header::AUTHORIZATION, value);
		}

		Ok(OutboundRequest { method: self.method.clone(), url, headers, body: self.body.clone() })
	}
}

/// Response returned by a transport.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Builds a response from parts.
	pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers, body: body.into() }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Returns `true` for 401 responses.
	pub fn is_unauthorized(&self) -> bool {
		self.status == StatusCode::UNAUTHORIZED
	}

	/// Body decoded lossily as UTF-8.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the JSON body, reporting the failing path on mismatch.
	pub fn json<T>(&self) -> Result<T, TransientError>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de).map_err(|source| {
			TransientError::ResponseParse { source, status: Some(self.status.as_u16()) }
		})
	}

	/// Value of a header when present and valid UTF-8.
	pub fn header_str(&self, name: &HeaderName) -> Option<&str> {
		self.headers.get(name)?.to_str().ok()
	}

	/// Server-pushed access token carried in `header`, if any.
	pub fn rotated_token(&self, header: &HeaderName) -> Option<TokenSecret> {
		self.header_str(header)
			.map(str::trim)
			.filter(|value| !value.is_empty())
			.map(TokenSecret::from)
	}

	/// `Retry-After` hint as a relative duration.
	pub fn retry_after(&self) -> Option<Duration> {
		parse_retry_after(&self.headers)
	}

	/// Converts a non-success response into the error surfaced to callers.
	pub fn into_error(self) -> TransientError {
		let retry_after = self.retry_after();

		TransientError::Status { status: self.status.as_u16(), body: self.text(), retry_after }
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Clients built by [`ReqwestTransport::new`] keep a cookie store, so HTTP-only refresh cookies
/// set by the server ride along on the refresh exchange automatically.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with a cookie store enabled.
	pub fn new() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().cookie_store(true).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn execute(&self, request: OutboundRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let OutboundRequest { method, url, headers, body } = request;
			let mut builder = self.0.request(method, url).headers(headers);

			if let Some(body) = body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn response_with(name: &'static str, value: &'static str) -> ApiResponse {
		let mut headers = HeaderMap::new();

		headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));

		ApiResponse::new(StatusCode::OK, headers, Vec::new())
	}

	#[test]
	fn retry_marker_is_one_shot() {
		let mut request = ApiRequest::get("/api/events/");

		assert!(request.mark_retried());
		assert!(!request.mark_retried());
		assert!(!request.clone().mark_retried());
	}

	#[test]
	fn outbound_request_carries_bearer_and_json() {
		let request = ApiRequest::post("/api/surveys/")
			.json(&serde_json::json!({ "title": "Feedback" }))
			.expect("JSON body should serialize.");
		let url = Url::parse("https://api.example.com/api/surveys/").expect("URL should parse.");
		let outbound = request
			.to_outbound(url, Some(&TokenSecret::new("t1")))
			.expect("Outbound request should build.");

		assert_eq!(outbound.headers.get(http::header::AUTHORIZATION).unwrap(), "Bearer t1");
		assert_eq!(outbound.headers.get(CONTENT_TYPE).unwrap(), "application/json");
		assert_eq!(outbound.body.as_deref(), Some(&b"{\"title\":\"Feedback\"}"[..]));
	}

	#[test]
	fn rotated_token_ignores_blank_values() {
		let header = HeaderName::from_static("new-access-token");

		let rotated = response_with("new-access-token", "rotated").rotated_token(&header);

		assert_eq!(rotated.as_ref().map(TokenSecret::expose), Some("rotated"));
		assert!(response_with("new-access-token", " ").rotated_token(&header).is_none());
		assert!(response_with("x-other", "rotated").rotated_token(&header).is_none());
	}

	#[test]
	fn retry_after_parses_delta_seconds() {
		let response = response_with("retry-after", "120");

		assert_eq!(response.retry_after(), Some(Duration::seconds(120)));
	}

	#[test]
	fn json_errors_report_the_failing_path() {
		let response = ApiResponse::new(StatusCode::OK, HeaderMap::new(), &b"{\"access\":5}"[..]);

		#[derive(Debug, Deserialize)]
		struct Body {
			#[allow(dead_code)]
			access: String,
		}

		let err = response.json::<Body>().expect_err("Number should not decode as string.");

		match err {
			TransientError::ResponseParse { source, status } => {
				assert_eq!(source.path().to_string(), "access");
				assert_eq!(status, Some(200));
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}
}
