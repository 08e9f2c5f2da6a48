//! Session-aware API client: bearer attachment, single-flight token refresh with request replay,
//! and a TTL session cache, all owned by one explicitly constructed client.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod session;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		client::ApiClient,
		config::ClientConfig,
		http::ReqwestTransport,
		session::{SessionExpired, SessionListener},
		store::{CredentialStore, MemoryCredentialStore},
	};

	/// Client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = ApiClient<ReqwestTransport>;

	/// Builds a cookie-aware reqwest transport that accepts the self-signed certificates produced
	/// by `httpmock` during tests.
	pub fn test_reqwest_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.cookie_store(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client)
	}

	/// Session listener that remembers every notice it receives.
	#[derive(Debug, Default)]
	pub struct RecordingListener {
		notices: Mutex<Vec<SessionExpired>>,
	}
	impl RecordingListener {
		/// Notices received so far, oldest first.
		pub fn notices(&self) -> Vec<SessionExpired> {
			self.notices.lock().clone()
		}

		/// Number of notices received so far.
		pub fn count(&self) -> usize {
			self.notices.lock().len()
		}
	}
	impl SessionListener for RecordingListener {
		fn on_session_expired(&self, notice: &SessionExpired) {
			self.notices.lock().push(notice.clone());
		}
	}

	/// Constructs an [`ApiClient`] against `base_url`, backed by an in-memory credential store, a
	/// recording listener, and the reqwest transport used across integration tests.
	pub fn build_reqwest_test_client(
		base_url: &str,
	) -> (ReqwestTestClient, Arc<MemoryCredentialStore>, Arc<RecordingListener>) {
		let config = ClientConfig::new(Url::parse(base_url).expect("Mock server URL should parse."));
		let store_backend = Arc::new(MemoryCredentialStore::default());
		let store: Arc<dyn CredentialStore> = store_backend.clone();
		let listener = Arc::new(RecordingListener::default());
		let client = ApiClient::with_transport(config, store, test_reqwest_transport())
			.with_listener(listener.clone());

		(client, store_backend, listener)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use ::http as http_types;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
