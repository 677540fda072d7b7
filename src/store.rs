//! Credential persistence contracts and built-in store implementations.
//!
//! The store is a durable key/value adapter for the token pair and cached user record. Its
//! failure semantics are deliberately soft: corrupt or missing entries resolve to absent fields
//! on read, and write failures are reported but never propagated past the session state machine
//! (stale UI state is preferred over a crashed session).

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, token::TokenPair, user::UserRecord};

/// Boxed future returned by [`CredentialStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable storage contract for session credentials.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Reads the cached credentials; corrupt or missing entries resolve to absent fields rather
	/// than errors.
	fn load(&self) -> StoreFuture<'_, CachedCredentials>;

	/// Overwrites the token pair and user record atomically from the caller's perspective.
	fn save<'a>(&'a self, tokens: &'a TokenPair, user: &'a UserRecord) -> StoreFuture<'a, ()>;

	/// Removes all entries; idempotent.
	fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Snapshot produced by [`CredentialStore::load`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCredentials {
	/// Cached token pair, if a usable one was stored.
	#[serde(default)]
	pub tokens: Option<TokenPair>,
	/// Cached user record, if one was stored.
	#[serde(default)]
	pub user: Option<UserRecord>,
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failure surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
