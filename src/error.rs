//! Crate-level error types shared across the session, coordinator, and store layers.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical session error exposed by public APIs.
///
/// Only the session state machine surfaces these to consumers; the credential store and the
/// refresh coordinator report failure through return values and events instead.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Server endpoint failure (login, refresh, or current-user fetch).
	#[error(transparent)]
	Api(#[from] crate::api::ApiError),
	/// Refresh coordinator failure.
	#[error(transparent)]
	Refresh(#[from] crate::refresh::RefreshError),
	/// Token grant could not be turned into a usable token pair.
	#[error(transparent)]
	Token(#[from] crate::token::TokenPairError),

	/// An operation requiring an authenticated session ran without one.
	#[error("No authenticated session is active.")]
	NotAuthenticated,
}
