//! The authoritative access/refresh credential pair.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Access credential plus the refresh credential used to renew it.
///
/// The refresh half is optional: some deployments keep it in an HTTP-only cookie that only the
/// transport ever sees, in which case the refresh exchange relies on the cookie jar instead.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
	/// Short-lived credential attached to authenticated requests.
	pub access: TokenSecret,
	/// Longer-lived credential used solely to obtain a new access token.
	pub refresh: Option<TokenSecret>,
}
impl TokenPair {
	/// Builds a pair from both halves.
	pub fn new(access: impl Into<TokenSecret>, refresh: impl Into<TokenSecret>) -> Self {
		Self { access: access.into(), refresh: Some(refresh.into()) }
	}

	/// Builds a pair whose refresh credential is held by the transport.
	pub fn access_only(access: impl Into<TokenSecret>) -> Self {
		Self { access: access.into(), refresh: None }
	}

	/// Returns a copy carrying a rotated access token and the same refresh token.
	pub fn with_access(&self, access: impl Into<TokenSecret>) -> Self {
		Self { access: access.into(), refresh: self.refresh.clone() }
	}
}
impl Debug for TokenPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenPair")
			.field("access", &"<redacted>")
			.field("refresh", &self.refresh.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}
