//! Client-level error types shared by the dispatcher, refresh coordinator, stores, and cache.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Session cache failure.
	#[error(transparent)]
	Cache(#[from] crate::cache::CacheError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Non-authentication failure reported by the server; surfaced verbatim and never retried.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The refresh exchange failed; credentials were cleared and the session ended.
	#[error("Session refresh failed: {0}")]
	RefreshFailed(#[from] RefreshError),
	/// A session check ran without any stored credentials.
	#[error("No access token is stored for this session.")]
	NotAuthenticated,
	/// A replayed request was rejected again after a successful refresh.
	#[error("{method} {path} was rejected after its single refresh retry.")]
	RetryExhausted {
		/// HTTP method of the original call.
		method: String,
		/// Request path of the original call.
		path: String,
	},
}
impl Error {
	/// Returns `true` when the caller has to re-authenticate.
	///
	/// An [`Abandoned`](RefreshError::Abandoned) refresh never reached a verdict, so it does not
	/// count.
	pub fn is_auth_expired(&self) -> bool {
		match self {
			Self::RefreshFailed(RefreshError::Abandoned) => false,
			Self::RefreshFailed(_) | Self::NotAuthenticated | Self::RetryExhausted { .. } => true,
			_ => false,
		}
	}

	/// HTTP status associated with the failure, when one exists.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Transient(TransientError::Status { status, .. }) => Some(*status),
			Self::Transient(TransientError::ResponseParse { status, .. }) => *status,
			Self::RefreshFailed(RefreshError::Rejected { status }) => Some(*status),
			Self::RetryExhausted { .. } => Some(401),
			_ => None,
		}
	}
}

/// Configuration and request-construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Configuration builder rejected its inputs.
	#[error(transparent)]
	Builder(#[from] crate::config::ConfigBuilderError),
	/// Base URL and request path do not form a valid URL.
	#[error("Request URL `{url}` is invalid.")]
	InvalidUrl {
		/// URL that failed to parse.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A header name or value cannot be encoded.
	#[error("Header `{name}` cannot be encoded.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody {
		/// Underlying serialization failure.
		#[source]
		source: serde_json::Error,
	},
	/// Token-issuance endpoint omitted one half of the token pair.
	#[error("Login response is missing the `{field}` token.")]
	IncompleteLogin {
		/// Missing field name.
		field: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Request failures that are not authentication expiry.
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Server answered with a non-success status other than 401.
	#[error("Server responded with status {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Response body, lossily decoded as UTF-8.
		body: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Response body was not the JSON shape the caller asked for.
	#[error("Response body could not be decoded.")]
	ResponseParse {
		/// Structured parsing failure with the offending JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Why a refresh exchange failed.
///
/// Cloneable so one failure can be delivered to every caller parked behind the refresh.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshError {
	/// The refresh endpoint answered with a non-success status.
	#[error("refresh endpoint rejected the exchange with status {status}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
	},
	/// The refresh exchange never produced a response.
	#[error("refresh exchange failed in transit: {message}.")]
	Transport {
		/// Rendered transport failure.
		message: String,
	},
	/// The refresh endpoint answered 2xx without a usable access token.
	#[error("refresh endpoint returned an unusable body: {message}.")]
	MalformedResponse {
		/// Rendered decoding failure.
		message: String,
	},
	/// The rotated credentials could not be persisted.
	#[error("rotated credentials could not be stored: {message}.")]
	Storage {
		/// Rendered storage failure.
		message: String,
	},
	/// The caller driving the exchange went away before it settled.
	#[error("refresh was abandoned before it settled.")]
	Abandoned,
}
