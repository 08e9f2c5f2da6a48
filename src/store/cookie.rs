//! Cookie-jar backed [`CredentialStore`] that survives restarts but not indefinitely.
//!
//! Every cookie carries the attributes of the [`CookiePolicy`] it was written under (path,
//! same-site mode, secure flag) and an absolute expiry. Jars opened with a snapshot path write
//! the whole jar to disk after each mutation; expired cookies are dropped when the snapshot is
//! loaded and lazily whenever they are read.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use time::PrimitiveDateTime;
// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
	store::{CredentialStore, StoreError},
};

/// Cookie carrying the access token.
pub const ACCESS_COOKIE: &str = "accessToken";
/// Cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";

type CookieMap = BTreeMap<String, Cookie>;

/// Same-site mode recorded on each cookie.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
	/// Sent only on same-site requests.
	Strict,
	/// Sent on same-site requests and top-level navigations.
	#[default]
	Lax,
	/// Sent on every request; requires `secure`.
	None,
}

/// Attributes applied to every cookie the jar writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookiePolicy {
	/// Path scope of the cookie.
	pub path: String,
	/// Same-site mode.
	pub same_site: SameSite,
	/// Whether the cookie is restricted to HTTPS.
	pub secure: bool,
	/// How long a written cookie stays valid.
	pub lifetime: Duration,
}
impl CookiePolicy {
	/// Expiry horizon applied when no explicit lifetime is configured.
	pub const DEFAULT_LIFETIME: Duration = Duration::days(7);

	/// Lax, non-secure cookies for local development.
	pub fn development() -> Self {
		Self {
			path: "/".into(),
			same_site: SameSite::Lax,
			secure: false,
			lifetime: Self::DEFAULT_LIFETIME,
		}
	}

	/// Strict, secure cookies for production deployments.
	pub fn production() -> Self {
		Self {
			path: "/".into(),
			same_site: SameSite::Strict,
			secure: true,
			lifetime: Self::DEFAULT_LIFETIME,
		}
	}

	/// Overrides the expiry horizon.
	pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
		self.lifetime = lifetime;

		self
	}

	fn issue(&self, value: String, now: OffsetDateTime) -> Cookie {
		Cookie {
			value,
			path: self.path.clone(),
			same_site: self.same_site,
			secure: self.secure,
			expires_at: now
				.checked_add(self.lifetime)
				.unwrap_or(PrimitiveDateTime::MAX.assume_utc()),
		}
	}
}
impl Default for CookiePolicy {
	fn default() -> Self {
		Self::development()
	}
}

/// A single stored cookie.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
	/// Cookie value.
	pub value: String,
	/// Path scope.
	pub path: String,
	/// Same-site mode.
	pub same_site: SameSite,
	/// HTTPS-only flag.
	pub secure: bool,
	/// Absolute expiry instant.
	pub expires_at: OffsetDateTime,
}
impl Cookie {
	/// Returns `true` once `instant` reaches the expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}
}
impl Debug for Cookie {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Cookie")
			.field("value", &"<redacted>")
			.field("path", &self.path)
			.field("same_site", &self.same_site)
			.field("secure", &self.secure)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Named cookies with policy-driven attributes, optionally mirrored to a JSON snapshot.
#[derive(Clone, Debug)]
pub struct CookieJarStore {
	snapshot: Option<PathBuf>,
	policy: CookiePolicy,
	inner: Arc<RwLock<CookieMap>>,
}
impl CookieJarStore {
	/// Opens (or creates) a jar persisted at `path`, eagerly loading unexpired cookies.
	pub fn open(path: impl Into<PathBuf>, policy: CookiePolicy) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let mut cookies = Self::load_snapshot(&path)?;
		let now = OffsetDateTime::now_utc();

		cookies.retain(|_, cookie| !cookie.is_expired_at(now));

		Ok(Self { snapshot: Some(path), policy, inner: Arc::new(RwLock::new(cookies)) })
	}

	/// Creates a jar that lives only as long as the process.
	pub fn ephemeral(policy: CookiePolicy) -> Self {
		Self { snapshot: None, policy, inner: Default::default() }
	}

	/// Policy applied to newly written cookies.
	pub fn policy(&self) -> &CookiePolicy {
		&self.policy
	}

	/// Writes `name` with the jar's policy, replacing any previous value.
	pub fn set_cookie(&self, name: &str, value: impl Into<String>) -> Result<(), StoreError> {
		self.set_cookie_at(name, value, OffsetDateTime::now_utc())
	}

	/// Writes `name` as if the current instant were `now`.
	pub fn set_cookie_at(
		&self,
		name: &str,
		value: impl Into<String>,
		now: OffsetDateTime,
	) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		guard.insert(name.to_owned(), self.policy.issue(value.into(), now));

		self.persist_locked(&guard)
	}

	/// Returns the full cookie for `name` if it has not expired.
	pub fn cookie(&self, name: &str) -> Option<Cookie> {
		self.cookie_at(name, OffsetDateTime::now_utc())
	}

	/// Returns the full cookie for `name` if it has not expired at `now`.
	pub fn cookie_at(&self, name: &str, now: OffsetDateTime) -> Option<Cookie> {
		{
			let guard = self.inner.read();

			match guard.get(name) {
				Some(cookie) if !cookie.is_expired_at(now) => return Some(cookie.clone()),
				Some(_) => {},
				None => return None,
			}
		}

		// Expired: evict from memory. The snapshot is rewritten on the next mutation and
		// expired entries are filtered on load anyway.
		self.inner.write().remove(name);

		None
	}

	/// Returns the value of `name` if it has not expired.
	pub fn get_cookie(&self, name: &str) -> Option<String> {
		self.cookie(name).map(|cookie| cookie.value)
	}

	/// Deletes `name`. Idempotent.
	pub fn remove_cookie(&self, name: &str) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		if guard.remove(name).is_some() {
			self.persist_locked(&guard)?;
		}

		Ok(())
	}

	/// Names of every cookie currently held, expired or not.
	pub fn cookie_names(&self) -> Vec<String> {
		self.inner.read().keys().cloned().collect()
	}

	fn load_snapshot(path: &Path) -> Result<CookieMap, StoreError> {
		if !path.exists() {
			return Ok(CookieMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(CookieMap::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create cookie directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &CookieMap) -> Result<(), StoreError> {
		let Some(path) = self.snapshot.as_ref() else {
			return Ok(());
		};
		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize cookie jar: {e}"),
			})?;
		let mut tmp_path = path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", path.display()),
		})
	}
}
impl CredentialStore for CookieJarStore {
	fn get(&self) -> Option<TokenPair> {
		let access = self.get_cookie(ACCESS_COOKIE)?;
		let refresh = self.get_cookie(REFRESH_COOKIE).map(TokenSecret::new);

		Some(TokenPair { access: TokenSecret::new(access), refresh })
	}

	fn set(&self, pair: TokenPair) -> Result<(), StoreError> {
		let now = OffsetDateTime::now_utc();
		let mut guard = self.inner.write();

		guard.insert(ACCESS_COOKIE.into(), self.policy.issue(pair.access.expose().into(), now));

		match pair.refresh {
			Some(refresh) => {
				guard.insert(REFRESH_COOKIE.into(), self.policy.issue(refresh.expose().into(), now));
			},
			None => {
				guard.remove(REFRESH_COOKIE);
			},
		}

		self.persist_locked(&guard)
	}

	fn clear(&self) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let removed_access = guard.remove(ACCESS_COOKIE).is_some();
		let removed_refresh = guard.remove(REFRESH_COOKIE).is_some();

		if removed_access || removed_refresh {
			self.persist_locked(&guard)?;
		}

		Ok(())
	}

	fn marker(&self, name: &str) -> Option<String> {
		self.get_cookie(name)
	}

	fn set_marker(&self, name: &str, value: &str) -> Result<(), StoreError> {
		if name == ACCESS_COOKIE || name == REFRESH_COOKIE {
			return Err(StoreError::Backend {
				message: format!("Marker `{name}` would overwrite a token cookie"),
			});
		}

		self.set_cookie(name, value)
	}

	fn remove_marker(&self, name: &str) -> Result<(), StoreError> {
		self.remove_cookie(name)
	}

	fn clear_all(&self) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		guard.clear();

		self.persist_locked(&guard)
	}
}
