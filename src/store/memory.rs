//! Thread-safe in-memory [`CredentialStore`] for tests and demos.

// self
use crate::{
	_prelude::*,
	store::{CachedCredentials, CredentialStore, StoreFuture},
	token::TokenPair,
	user::UserRecord,
};

type Slot = Arc<RwLock<CachedCredentials>>;

/// Keeps credentials in-process; the single lock write makes `save` atomic for readers.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Slot);
impl CredentialStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, CachedCredentials> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.read().clone()) })
	}

	fn save<'a>(&'a self, tokens: &'a TokenPair, user: &'a UserRecord) -> StoreFuture<'a, ()> {
		let slot = self.0.clone();
		let snapshot =
			CachedCredentials { tokens: Some(tokens.clone()), user: Some(user.clone()) };

		Box::pin(async move {
			*slot.write() = snapshot;

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			*slot.write() = CachedCredentials::default();

			Ok(())
		})
	}
}
