//! Thread-safe in-memory [`CredentialStore`] for tests and sessions that never persist.

// self
use crate::{
	_prelude::*,
	auth::TokenPair,
	store::{CredentialStore, StoreError},
};

#[derive(Debug, Default)]
struct MemoryState {
	pair: Option<TokenPair>,
	markers: BTreeMap<String, String>,
}

/// Keeps the token pair and session markers in-process behind a read/write lock.
#[derive(Clone, Debug, Default)]
pub struct MemoryCredentialStore(Arc<RwLock<MemoryState>>);
impl MemoryCredentialStore {
	/// Creates a store that already holds `pair`.
	pub fn with_pair(pair: TokenPair) -> Self {
		Self(Arc::new(RwLock::new(MemoryState { pair: Some(pair), markers: BTreeMap::new() })))
	}
}
impl CredentialStore for MemoryCredentialStore {
	fn get(&self) -> Option<TokenPair> {
		self.0.read().pair.clone()
	}

	fn set(&self, pair: TokenPair) -> Result<(), StoreError> {
		self.0.write().pair = Some(pair);

		Ok(())
	}

	fn clear(&self) -> Result<(), StoreError> {
		self.0.write().pair.take();

		Ok(())
	}

	fn marker(&self, name: &str) -> Option<String> {
		self.0.read().markers.get(name).cloned()
	}

	fn set_marker(&self, name: &str, value: &str) -> Result<(), StoreError> {
		self.0.write().markers.insert(name.to_owned(), value.to_owned());

		Ok(())
	}

	fn remove_marker(&self, name: &str) -> Result<(), StoreError> {
		self.0.write().markers.remove(name);

		Ok(())
	}

	fn clear_all(&self) -> Result<(), StoreError> {
		*self.0.write() = MemoryState::default();

		Ok(())
	}
}
