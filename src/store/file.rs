//! JSON-file-backed [`CredentialStore`] for desktop-style deployments.

// std
use std::{
	fs::{self, File},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{CachedCredentials, CredentialStore, StoreError, StoreFuture},
	token::TokenPair,
	user::UserRecord,
};

/// Persists credentials to a single JSON snapshot, replaced atomically on each save.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<CachedCredentials>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	///
	/// A corrupt snapshot is treated as empty rather than an error.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path);

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> CachedCredentials {
		let bytes = match fs::read(path) {
			Ok(bytes) if !bytes.is_empty() => bytes,
			Ok(_) => return CachedCredentials::default(),
			Err(e) => {
				if e.kind() != ErrorKind::NotFound {
					tracing::warn!(
						path = %path.display(),
						error = %e,
						"credential snapshot unreadable; treating as empty"
					);
				}

				return CachedCredentials::default();
			},
		};

		serde_json::from_slice(&bytes).unwrap_or_else(|e| {
			tracing::warn!(
				path = %path.display(),
				error = %e,
				"credential snapshot corrupt; treating as empty"
			);

			CachedCredentials::default()
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &CachedCredentials) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize credential snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

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

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl CredentialStore for FileStore {
	fn load(&self) -> StoreFuture<'_, CachedCredentials> {
		Box::pin(async move { Ok(self.inner.read().clone()) })
	}

	fn save<'a>(&'a self, tokens: &'a TokenPair, user: &'a UserRecord) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let snapshot =
				CachedCredentials { tokens: Some(tokens.clone()), user: Some(user.clone()) };
			let mut guard = self.inner.write();

			*guard = snapshot;
			self.persist_locked(&guard)
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			*self.inner.write() = CachedCredentials::default();

			match fs::remove_file(&self.path) {
				Ok(()) => Ok(()),
				Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
				Err(e) => Err(StoreError::Backend {
					message: format!("Failed to remove {}: {e}", self.path.display()),
				}),
			}
		})
	}
}
