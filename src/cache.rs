//! TTL-expiring key/value cache for session-scoped client values.
//!
//! Entries carry an absolute expiry and are only checked when read; there is no background
//! sweep. Values are stored as JSON so the cache stays agnostic to payload shape.

// crates.io
use serde::de::DeserializeOwned;
use serde_json::Value;
use time::PrimitiveDateTime;
// self
use crate::{_prelude::*, store::CredentialStore};

/// Errors produced by [`SessionCache`].
#[derive(Debug, ThisError)]
pub enum CacheError {
	/// A value could not be converted to or from its cached JSON form.
	#[error("Cached value for `{key}` could not be (de)serialized.")]
	Serialization {
		/// Cache key involved.
		key: String,
		/// Underlying serde failure.
		#[source]
		source: serde_json::Error,
	},
}

/// A cached value plus the instant after which it is no longer served.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
	/// JSON form of the cached value.
	pub value: Value,
	/// Absolute expiry instant.
	pub expiry: OffsetDateTime,
}
impl CacheEntry {
	/// Returns `true` once `instant` is strictly past the expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant > self.expiry
	}
}

/// In-memory session cache tied to the credential store it tears down with.
pub struct SessionCache {
	entries: RwLock<HashMap<String, CacheEntry>>,
	credentials: Arc<dyn CredentialStore>,
}
impl SessionCache {
	/// TTL used by callers that do not pick one.
	pub const DEFAULT_TTL: Duration = Duration::minutes(60);

	/// Creates an empty cache whose [`clear_all`](Self::clear_all) also clears `credentials`.
	pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
		Self { entries: Default::default(), credentials }
	}

	/// Stores `value` under `key` for `ttl`, replacing any existing entry.
	pub fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
	where
		T: ?Sized + Serialize,
	{
		self.set_at(key, value, ttl, OffsetDateTime::now_utc())
	}

	/// Same as [`set`](Self::set) with an explicit notion of "now".
	pub fn set_at<T>(
		&self,
		key: &str,
		value: &T,
		ttl: Duration,
		now: OffsetDateTime,
	) -> Result<(), CacheError>
	where
		T: ?Sized + Serialize,
	{
		let value = serde_json::to_value(value)
			.map_err(|source| CacheError::Serialization { key: key.to_owned(), source })?;

		// Saturate at the latest representable instant.
		let expiry = now.checked_add(ttl).unwrap_or(PrimitiveDateTime::MAX.assume_utc());

		self.entries.write().insert(key.to_owned(), CacheEntry { value, expiry });

		Ok(())
	}

	/// Returns the value under `key`, or `None` when it is missing or expired.
	///
	/// Reading never extends the entry's lifetime.
	pub fn get<T>(&self, key: &str) -> Result<Option<T>, CacheError>
	where
		T: DeserializeOwned,
	{
		self.get_at(key, OffsetDateTime::now_utc())
	}

	/// Same as [`get`](Self::get) with an explicit notion of "now".
	pub fn get_at<T>(&self, key: &str, now: OffsetDateTime) -> Result<Option<T>, CacheError>
	where
		T: DeserializeOwned,
	{
		let Some(value) = self.live_value(key, now) else {
			return Ok(None);
		};

		serde_json::from_value(value)
			.map(Some)
			.map_err(|source| CacheError::Serialization { key: key.to_owned(), source })
	}

	/// Drops the entry under `key`, if any.
	pub fn remove(&self, key: &str) {
		self.entries.write().remove(key);
	}

	/// Number of entries currently held, including expired ones not yet read.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when no entries are held.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	/// Full session teardown: empties the cache and clears everything the credential store holds.
	pub fn clear_all(&self) -> Result<()> {
		self.entries.write().clear();
		self.credentials.clear_all()?;

		Ok(())
	}

	fn live_value(&self, key: &str, now: OffsetDateTime) -> Option<Value> {
		{
			let guard = self.entries.read();
			let entry = guard.get(key)?;

			if !entry.is_expired_at(now) {
				return Some(entry.value.clone());
			}
		}

		let mut guard = self.entries.write();

		// Re-check under the write lock; a concurrent `set` may have replaced the entry.
		if guard.get(key).is_some_and(|entry| entry.is_expired_at(now)) {
			guard.remove(key);
		}

		None
	}
}
impl Debug for SessionCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionCache").field("entries", &self.len()).finish()
	}
}
